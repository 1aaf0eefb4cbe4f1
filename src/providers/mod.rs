pub mod jira;
pub mod linear;

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::Error;
use crate::model::fetch_params::FetchParams;
use crate::model::work_item::WorkItem;

/// One page of normalized items from a remote source.
pub struct Page {
    pub items: Vec<WorkItem>,
    /// Opaque continuation token. `None` means the source reported no
    /// further pages.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable display identifier, also the merge key into the data store.
    /// Unique across all registered providers.
    fn name(&self) -> &str;

    /// True iff every credential `authenticate` needs is present.
    /// Pure; never performs network I/O.
    fn is_configured(&self) -> bool;

    /// Minimal "who am I" call validating stored credentials. Records the
    /// authenticated identity so fetches can default the user filter to it.
    /// Expected auth failures are logged to stderr and reported as `false`,
    /// never raised.
    async fn authenticate(&mut self) -> bool;

    /// Fetch one page of items matching `params`. `cursor` is the
    /// continuation token from the previous page, `None` for the first.
    ///
    /// Items must fall inside `[start_date, end_date]` by `updated_at` and
    /// match `user_filter` (or the authenticated identity when unset),
    /// filtered server-side where the remote API allows it.
    async fn fetch_page(&self, params: &FetchParams, cursor: Option<&str>) -> Result<Page>;

    /// Interactive credential setup. On success the updated `config` holds
    /// working credentials and `is_configured()` is true.
    async fn setup(&mut self, config: &mut AppConfig) -> Result<()>;

    /// Remove stored credentials from `config`; afterwards a provider built
    /// from that config reports `is_configured() == false`.
    fn disconnect(&self, config: &mut AppConfig) -> Result<()>;
}

/// Lazy pull-based sequence of a provider's items.
///
/// Holds at most one page in memory; pulling an item triggers a remote page
/// fetch only once the current page is spent.
pub struct ItemStream<'a> {
    provider: &'a dyn Provider,
    params: &'a FetchParams,
    buffer: VecDeque<WorkItem>,
    cursor: Option<String>,
    exhausted: bool,
}

impl<'a> ItemStream<'a> {
    pub fn new(provider: &'a dyn Provider, params: &'a FetchParams) -> Self {
        Self {
            provider,
            params,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Pull the next item. After a page fetch fails the stream yields that
    /// error once and terminates; items already yielded are not retracted.
    pub async fn next(&mut self) -> Option<Result<WorkItem>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            match self
                .provider
                .fetch_page(self.params, self.cursor.as_deref())
                .await
            {
                Ok(page) => {
                    self.exhausted = page.next_cursor.is_none();
                    self.cursor = page.next_cursor;
                    self.buffer = page.items.into();
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// All registered providers, in registration order. This list is the single
/// place a new provider gets added.
pub fn all_providers(config: &AppConfig) -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(jira::JiraProvider::new(config.jira.clone())),
        Box::new(linear::LinearProvider::new(config.linear.clone())),
    ]
}

/// Resolve a provider by name, case-insensitively.
pub fn get_provider(name: &str, config: &AppConfig) -> Result<Box<dyn Provider>, Error> {
    all_providers(config)
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
}

#[cfg(test)]
pub mod tests;
