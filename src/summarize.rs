//! Report generation in two stages: a cheap model summarizes each work item
//! in a few sentences, then a more capable model turns the aggregated
//! summaries into one markdown report.
//!
//! Per-item summaries are cached in `whatdidido-summary.json`; an item whose
//! `updated_at` has not changed since its last summary is not sent to the
//! model again.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{data_dir, OpenAiConfig};
use crate::model::work_item::WorkItem;
use crate::services::openai::{
    OpenAiClient, DEFAULT_SUMMARY_MODEL, DEFAULT_WORK_ITEM_MODEL,
};
use crate::store::atomic_write;

const WORK_ITEM_SUMMARY_PROMPT: &str = "\
You are an expert at summarizing technical work items into concise, clear summaries.
Given the following work item, generate a concise summary in 3-4 sentences, focusing on the key aspects and outcomes.
DO NOT include any personal opinions or extraneous information. DO NOT INVENT ANY DETAILS OUTSIDE OF THE PROVIDED DATA.

Work Item Data:
{work_item_data}

Provide only the summary text, no additional formatting or preamble.
";

const OVERALL_SUMMARY_PROMPT: &str = "\
You are an expert at synthesizing multiple technical work item summaries into a coherent overall summary.
Given the following aggregated summaries of work items, generate a clear and well-structured overall summary in markdown format that captures the main themes and outcomes.

The summary should:
- Start with a high-level overview of the work completed
- Group related work items into logical categories
- Highlight key achievements and outcomes
- Be formatted in markdown with appropriate headers and bullet points

Work Item Summaries:
{summaries}

Provide the complete markdown summary, ready to be saved to a file.
";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemSummary {
    pub work_item_id: String,
    pub title: String,
    pub summary: String,
    pub provider: String,
    pub created_at: String,
    pub updated_at: String,
    /// When this summary was generated (RFC 3339).
    pub summarized_at: String,
}

/// A cached summary is reusable iff it belongs to the same `(provider, id)`
/// and the item has not been updated since it was generated.
pub fn reusable<'a>(
    cache: &'a HashMap<(String, String), WorkItemSummary>,
    item: &WorkItem,
) -> Option<&'a WorkItemSummary> {
    cache
        .get(&(item.provider.clone(), item.id.clone()))
        .filter(|s| s.updated_at == item.updated_at)
}

fn cache_by_identity(summaries: Vec<WorkItemSummary>) -> HashMap<(String, String), WorkItemSummary> {
    summaries
        .into_iter()
        .map(|s| ((s.provider.clone(), s.work_item_id.clone()), s))
        .collect()
}

pub struct Summarizer {
    client: OpenAiClient,
    work_item_model: String,
    summary_model: String,
    summary_path: PathBuf,
    markdown_path: PathBuf,
}

impl Summarizer {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: OpenAiClient::from_config(config),
            work_item_model: config
                .work_item_model
                .clone()
                .unwrap_or_else(|| DEFAULT_WORK_ITEM_MODEL.to_string()),
            summary_model: config
                .summary_model
                .clone()
                .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
            summary_path: data_dir().join("whatdidido-summary.json"),
            markdown_path: data_dir().join("whatdidido.md"),
        }
    }

    pub fn markdown_path(&self) -> &PathBuf {
        &self.markdown_path
    }

    fn read_summary_cache(&self) -> Result<Vec<WorkItemSummary>> {
        if !self.summary_path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.summary_path)?;
        serde_json::from_str(&contents).with_context(|| {
            format!("Summary file {} is corrupt", self.summary_path.display())
        })
    }

    fn write_summary_cache(&self, summaries: &[WorkItemSummary]) -> Result<()> {
        if let Some(parent) = self.summary_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(summaries)?;
        atomic_write(&self.summary_path, json.as_bytes())?;
        Ok(())
    }

    /// Summarize each work item, serving unchanged items from the cache.
    pub async fn summarize_work_items(
        &self,
        items: &[WorkItem],
    ) -> Result<Vec<WorkItemSummary>> {
        let cache = cache_by_identity(self.read_summary_cache()?);
        let mut results = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            if let Some(cached) = reusable(&cache, item) {
                results.push(cached.clone());
                continue;
            }
            println!(
                "Summarizing [{}/{}] {} {}...",
                i + 1,
                items.len(),
                item.provider,
                item.id
            );
            let data = serde_json::to_string_pretty(item)?;
            let prompt = WORK_ITEM_SUMMARY_PROMPT.replace("{work_item_data}", &data);
            let summary = self
                .client
                .chat(&self.work_item_model, &prompt)
                .await
                .with_context(|| format!("Failed to summarize {} {}", item.provider, item.id))?;
            results.push(WorkItemSummary {
                work_item_id: item.id.clone(),
                title: item.title.clone(),
                summary,
                provider: item.provider.clone(),
                created_at: item.created_at.clone(),
                updated_at: item.updated_at.clone(),
                summarized_at: chrono::Utc::now().to_rfc3339(),
            });
        }

        self.write_summary_cache(&results)?;
        Ok(results)
    }

    /// Aggregate the per-item summaries into one markdown report and write
    /// it to `whatdidido.md`.
    pub async fn generate_overall_summary(
        &self,
        summaries: &[WorkItemSummary],
    ) -> Result<()> {
        let aggregated = summaries
            .iter()
            .map(|s| format!("- [{}] {} — {}", s.provider, s.title, s.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = OVERALL_SUMMARY_PROMPT.replace("{summaries}", &aggregated);
        let markdown = self
            .client
            .chat(&self.summary_model, &prompt)
            .await
            .context("Failed to generate the overall summary")?;

        if let Some(parent) = self.markdown_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(&self.markdown_path, markdown.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(provider: &str, id: &str, updated_at: &str) -> WorkItemSummary {
        WorkItemSummary {
            work_item_id: id.into(),
            title: "t".into(),
            summary: "s".into(),
            provider: provider.into(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: updated_at.into(),
            summarized_at: "2025-01-02T00:00:00Z".into(),
        }
    }

    fn item(provider: &str, id: &str, updated_at: &str) -> WorkItem {
        WorkItem {
            id: id.into(),
            title: "t".into(),
            description: None,
            url: String::new(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: updated_at.into(),
            provider: provider.into(),
            raw_data: serde_json::json!({}),
        }
    }

    #[test]
    fn unchanged_item_is_served_from_cache() {
        let cache = cache_by_identity(vec![summary("Jira", "A-1", "2025-01-05T00:00:00Z")]);
        let hit = reusable(&cache, &item("Jira", "A-1", "2025-01-05T00:00:00Z"));
        assert!(hit.is_some());
    }

    #[test]
    fn updated_item_is_resummarized() {
        let cache = cache_by_identity(vec![summary("Jira", "A-1", "2025-01-05T00:00:00Z")]);
        let hit = reusable(&cache, &item("Jira", "A-1", "2025-01-09T00:00:00Z"));
        assert!(hit.is_none());
    }

    #[test]
    fn cache_is_keyed_by_provider_and_id() {
        let cache = cache_by_identity(vec![summary("Jira", "A-1", "2025-01-05T00:00:00Z")]);
        // Same id from a different provider is a different item.
        let hit = reusable(&cache, &item("Linear", "A-1", "2025-01-05T00:00:00Z"));
        assert!(hit.is_none());
    }
}
