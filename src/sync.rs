use crate::model::fetch_params::FetchParams;
use crate::providers::Provider;
use crate::store::DataStore;

/// Result of syncing one provider. Every authenticated provider produces
/// exactly one outcome; failures are captured here, never thrown. `count`
/// is the number of items persisted this run, including items saved before
/// a mid-stream fetch failure.
#[derive(Debug)]
pub struct SyncOutcome {
    pub provider_name: String,
    pub success: bool,
    pub count: usize,
    pub error: Option<String>,
}

/// Keep the providers that are configured and then authenticate, in
/// registration order. `authenticate` is never attempted on an
/// unconfigured provider.
pub async fn authenticated_providers(
    providers: Vec<Box<dyn Provider>>,
) -> Vec<Box<dyn Provider>> {
    let mut authenticated = Vec::new();
    for mut provider in providers {
        if !provider.is_configured() {
            continue;
        }
        if provider.authenticate().await {
            authenticated.push(provider);
        }
    }
    authenticated
}

/// Sync every authenticated provider into the store, one at a time.
///
/// Each provider runs in isolation: a fetch or persistence failure becomes
/// a failed outcome for that provider and the loop moves on to the next.
pub async fn sync_all(
    providers: &[Box<dyn Provider>],
    params: &FetchParams,
    store: &DataStore,
) -> Vec<SyncOutcome> {
    let mut outcomes = Vec::with_capacity(providers.len());
    for provider in providers {
        let name = provider.name().to_string();
        match store.save_provider_data(provider.as_ref(), params).await {
            Ok(merge) => outcomes.push(SyncOutcome {
                provider_name: name,
                success: merge.error.is_none(),
                count: merge.count,
                error: merge.error.map(|e| format!("{e:#}")),
            }),
            Err(e) => outcomes.push(SyncOutcome {
                provider_name: name,
                success: false,
                count: 0,
                error: Some(format!("{e:#}")),
            }),
        }
    }
    outcomes
}
