use serde::{Deserialize, Serialize};

/// Normalized unit of work shared by every provider.
///
/// `(provider, id)` uniquely identifies an item. Timestamps are the
/// provider's own RFC 3339 strings, passed through uninterpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub created_at: String,
    pub updated_at: String,
    pub provider: String,
    /// Provider-specific fields preserved for downstream consumers.
    /// Never interpreted by the core, only carried through.
    #[serde(default)]
    pub raw_data: serde_json::Value,
}
