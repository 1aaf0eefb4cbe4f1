pub mod fetch_params;
pub mod work_item;
