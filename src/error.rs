use std::path::PathBuf;

/// Typed failures the sync core must distinguish. Adapter-internal network
/// errors stay `anyhow::Error` and are stringified into sync outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("timed out waiting for the data store lock")]
    LockTimeout,

    #[error("data store file {path} is corrupt: {source}")]
    CorruptStore {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
