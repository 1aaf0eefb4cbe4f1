use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{get_provider, ItemStream, Page, Provider};
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::fetch_params::FetchParams;
use crate::model::work_item::WorkItem;

/// One scripted remote page: either a batch of items or a fetch failure.
pub enum ScriptedPage {
    Items(Vec<WorkItem>),
    Fail(String),
}

/// A provider that serves pre-scripted pages and records how often it was
/// asked to authenticate.
pub struct MockProvider {
    provider_name: String,
    configured: bool,
    auth_result: bool,
    auth_calls: Arc<AtomicUsize>,
    pub page_fetches: AtomicUsize,
    pages: Mutex<Vec<ScriptedPage>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            provider_name: name.to_string(),
            configured: true,
            auth_result: true,
            auth_calls: Arc::new(AtomicUsize::new(0)),
            page_fetches: AtomicUsize::new(0),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(self, pages: Vec<ScriptedPage>) -> Self {
        *self.pages.lock().unwrap() = pages;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.auth_result = false;
        self
    }

    /// Shared handle to the authenticate-call counter, usable after the
    /// provider has been boxed away.
    pub fn auth_counter(&self) -> Arc<AtomicUsize> {
        self.auth_calls.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn authenticate(&mut self) -> bool {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_result
    }

    async fn fetch_page(&self, _params: &FetchParams, _cursor: Option<&str>) -> Result<Page> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            return Ok(Page {
                items: vec![],
                next_cursor: None,
            });
        }
        match pages.remove(0) {
            ScriptedPage::Items(items) => Ok(Page {
                items,
                next_cursor: if pages.is_empty() {
                    None
                } else {
                    Some("next".into())
                },
            }),
            ScriptedPage::Fail(msg) => bail!(msg),
        }
    }

    async fn setup(&mut self, _config: &mut AppConfig) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self, _config: &mut AppConfig) -> Result<()> {
        Ok(())
    }
}

pub fn work_item(id: &str) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        title: format!("Test item {id}"),
        description: None,
        url: format!("https://example.com/{id}"),
        created_at: "2025-01-15T10:00:00Z".into(),
        updated_at: "2025-01-20T15:30:00Z".into(),
        provider: "Mock".into(),
        raw_data: serde_json::json!({}),
    }
}

fn params() -> FetchParams {
    FetchParams::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn stream_yields_across_pages_in_order() {
    let provider = MockProvider::new("Mock").with_pages(vec![
        ScriptedPage::Items(vec![work_item("A-1"), work_item("A-2")]),
        ScriptedPage::Items(vec![work_item("A-3")]),
    ]);
    let params = params();

    let mut stream = ItemStream::new(&provider, &params);
    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap().id);
    }
    assert_eq!(ids, ["A-1", "A-2", "A-3"]);
}

#[tokio::test]
async fn stream_fetches_one_page_at_a_time() {
    let provider = MockProvider::new("Mock").with_pages(vec![
        ScriptedPage::Items(vec![work_item("A-1"), work_item("A-2")]),
        ScriptedPage::Items(vec![work_item("A-3")]),
    ]);
    let params = params();

    let mut stream = ItemStream::new(&provider, &params);
    stream.next().await.unwrap().unwrap();
    stream.next().await.unwrap().unwrap();
    // Both items came from the first page; the second page is untouched
    // until the buffer is spent.
    assert_eq!(provider.page_fetches.load(Ordering::SeqCst), 1);

    stream.next().await.unwrap().unwrap();
    assert_eq!(provider.page_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_surfaces_page_error_once_then_ends() {
    let provider = MockProvider::new("Mock").with_pages(vec![
        ScriptedPage::Items(vec![work_item("A-1")]),
        ScriptedPage::Fail("boom".into()),
        ScriptedPage::Items(vec![work_item("A-9")]),
    ]);
    let params = params();

    let mut stream = ItemStream::new(&provider, &params);
    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap();
    assert!(err.is_err());
    // Terminated: the remaining scripted page is never requested.
    assert!(stream.next().await.is_none());
    assert_eq!(provider.page_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_skips_empty_intermediate_pages() {
    let provider = MockProvider::new("Mock").with_pages(vec![
        ScriptedPage::Items(vec![]),
        ScriptedPage::Items(vec![work_item("A-1")]),
    ]);
    let params = params();

    let mut stream = ItemStream::new(&provider, &params);
    assert_eq!(stream.next().await.unwrap().unwrap().id, "A-1");
    assert!(stream.next().await.is_none());
}

#[test]
fn work_item_preserves_raw_data_through_serialization() {
    let mut item = work_item("A-1");
    item.raw_data = serde_json::json!({
        "status": "In Progress",
        "labels": ["bug", "urgent"],
    });

    let json = serde_json::to_string(&item).unwrap();
    let back: WorkItem = serde_json::from_str(&json).unwrap();
    assert_eq!(back.raw_data["status"], "In Progress");
    assert_eq!(back.raw_data["labels"][1], "urgent");
}

#[test]
fn work_item_description_is_omitted_when_absent() {
    let item = work_item("A-1");
    let json = serde_json::to_string(&item).unwrap();
    assert!(!json.contains("description"));

    // Older documents without raw_data still deserialize.
    let legacy = r#"{"id":"A-1","title":"t","url":"u","created_at":"c","updated_at":"u","provider":"Jira"}"#;
    let back: WorkItem = serde_json::from_str(legacy).unwrap();
    assert!(back.raw_data.is_null());
}

#[test]
fn registry_resolves_names_case_insensitively() {
    let config = AppConfig::default();
    assert_eq!(get_provider("jira", &config).unwrap().name(), "Jira");
    assert_eq!(get_provider("LINEAR", &config).unwrap().name(), "Linear");
}

#[test]
fn registry_rejects_unknown_provider() {
    let config = AppConfig::default();
    let Err(err) = get_provider("asana", &config) else {
        panic!("lookup of an unregistered provider must fail");
    };
    assert!(matches!(err, Error::ProviderNotFound(ref name) if name == "asana"));
}

#[test]
fn providers_without_credentials_report_unconfigured() {
    let config = AppConfig::default();
    for provider in super::all_providers(&config) {
        assert!(!provider.is_configured(), "{} misreported", provider.name());
    }
}
