use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Page, Provider};
use crate::config::{AppConfig, LinearConfig};
use crate::model::fetch_params::FetchParams;
use crate::model::work_item::WorkItem;
use crate::util;

const GRAPHQL_URL: &str = "https://api.linear.app/graphql";
const PAGE_SIZE: usize = 50;

const VIEWER_QUERY: &str = r#"query { viewer { id name email } }"#;

const ISSUE_FIELDS: &str = r#"
    id identifier title description url createdAt updatedAt archivedAt
    state { name type }
    priority priorityLabel estimate
    assignee { id name email displayName }
    creator { id name email displayName }
    project { name }
    team { name key }
    labels { nodes { name color } }
    comments { nodes { body createdAt user { displayName } } }
"#;

pub struct LinearProvider {
    config: Option<LinearConfig>,
    /// Viewer id recorded by `authenticate`; the server-side filter target
    /// when no user filter is given.
    viewer_id: Option<String>,
    client: reqwest::Client,
}

impl LinearProvider {
    pub fn new(config: Option<LinearConfig>) -> Self {
        Self {
            config,
            viewer_id: None,
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .as_ref()
            .map(|c| c.api_key.as_str())
            .filter(|k| !k.is_empty())
            .context("Linear is not configured")
    }

    async fn graphql(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let body = json!({ "query": query, "variables": variables });
        let resp = self
            .client
            .post(GRAPHQL_URL)
            .header("Authorization", self.api_key()?)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Linear API request failed")?
            .error_for_status()
            .context("Linear API returned an error")?;

        let result: serde_json::Value =
            resp.json().await.context("Failed to parse Linear response")?;
        if let Some(errors) = result.get("errors") {
            bail!("Linear GraphQL errors: {errors}");
        }
        Ok(result)
    }
}

#[derive(Deserialize)]
struct IssuesData {
    issues: IssueConnection,
}

#[derive(Deserialize)]
struct IssueConnection {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Vec<IssueNode>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct IssueNode {
    identifier: String,
    title: String,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    #[serde(rename = "updatedAt")]
    updated_at: Option<String>,
    assignee: Option<UserNode>,
    creator: Option<UserNode>,
    /// Everything else the query selected, carried into `raw_data` as-is.
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Clone)]
struct UserNode {
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

fn user_json(user: &Option<UserNode>) -> serde_json::Value {
    match user {
        Some(u) => json!({
            "id": u.id,
            "name": u.name,
            "email": u.email,
            "display_name": u.display_name,
        }),
        None => serde_json::Value::Null,
    }
}

fn issue_to_work_item(issue: IssueNode) -> WorkItem {
    let mut raw_data = issue.extra;
    raw_data.insert("assignee".into(), user_json(&issue.assignee));
    raw_data.insert("creator".into(), user_json(&issue.creator));

    WorkItem {
        id: issue.identifier,
        title: issue.title,
        description: issue.description.filter(|d| !d.is_empty()),
        url: issue.url.unwrap_or_default(),
        created_at: issue.created_at.unwrap_or_default(),
        updated_at: issue.updated_at.unwrap_or_default(),
        provider: "Linear".into(),
        raw_data: serde_json::Value::Object(raw_data),
    }
}

/// Does the issue belong to the filtered user (by assignee or creator email)?
fn matches_user(issue: &IssueNode, email: &str) -> bool {
    let hit = |u: &Option<UserNode>| {
        u.as_ref()
            .and_then(|u| u.email.as_deref())
            .is_some_and(|e| e.eq_ignore_ascii_case(email))
    };
    hit(&issue.assignee) || hit(&issue.creator)
}

#[async_trait]
impl Provider for LinearProvider {
    fn name(&self) -> &str {
        "Linear"
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn authenticate(&mut self) -> bool {
        if self.api_key().is_err() {
            return false;
        }
        match self.graphql(VIEWER_QUERY, json!({})).await {
            Ok(result) => {
                let viewer = &result["data"]["viewer"];
                let Some(id) = viewer["id"].as_str() else {
                    eprintln!("Linear viewer query returned no id");
                    return false;
                };
                eprintln!(
                    "Connected to Linear as: {} ({})",
                    viewer["name"].as_str().unwrap_or("unknown"),
                    viewer["email"].as_str().unwrap_or("unknown"),
                );
                self.viewer_id = Some(id.to_string());
                true
            }
            Err(e) => {
                eprintln!("Failed to authenticate with Linear: {e}");
                false
            }
        }
    }

    async fn fetch_page(&self, params: &FetchParams, cursor: Option<&str>) -> Result<Page> {
        // With an explicit user filter we match on email client-side; the
        // Linear filter API keys users by id, not address. Without one we
        // filter server-side on the authenticated viewer.
        let (user_clause, viewer_decl) = if params.user_filter.is_some() {
            ("", "")
        } else {
            (
                "or: [ { assignee: { id: { eq: $viewerId } } }, { creator: { id: { eq: $viewerId } } } ]",
                ", $viewerId: ID!",
            )
        };
        let query = format!(
            r#"query($after: String, $startDate: DateTimeOrDuration!, $endDate: DateTimeOrDuration!{viewer_decl}) {{
                issues(
                    first: {PAGE_SIZE}
                    after: $after
                    filter: {{
                        updatedAt: {{ gte: $startDate, lte: $endDate }}
                        {user_clause}
                    }}
                    orderBy: updatedAt
                ) {{
                    pageInfo {{ hasNextPage endCursor }}
                    nodes {{ {ISSUE_FIELDS} }}
                }}
            }}"#
        );

        let mut variables = json!({
            "after": cursor,
            "startDate": format!("{}T00:00:00Z", params.start_date),
            "endDate": format!("{}T23:59:59.999Z", params.end_date),
        });
        if params.user_filter.is_none() {
            let viewer_id = self
                .viewer_id
                .as_ref()
                .context("Linear provider is not authenticated")?;
            variables["viewerId"] = json!(viewer_id);
        }

        let result = self.graphql(&query, variables).await?;
        let data: IssuesData = serde_json::from_value(result["data"].clone())
            .context("Unexpected Linear issues payload")?;

        let next_cursor = if data.issues.page_info.has_next_page {
            data.issues.page_info.end_cursor
        } else {
            None
        };

        let items = data
            .issues
            .nodes
            .into_iter()
            .filter(|issue| match &params.user_filter {
                Some(email) => matches_user(issue, email),
                None => true,
            })
            .map(issue_to_work_item)
            // The server-side bound is authoritative only to the day; keep
            // the inclusive range check local.
            .filter(|item| params.contains(&item.updated_at))
            .collect();

        Ok(Page { items, next_cursor })
    }

    async fn setup(&mut self, config: &mut AppConfig) -> Result<()> {
        if self.is_configured()
            && !util::confirm("Linear is already configured. Reconfigure?", false)?
        {
            return Ok(());
        }
        let api_key =
            util::prompt("Linear API key (get it from https://linear.app/settings/api)")?;

        let linear = LinearConfig { api_key };
        config.linear = Some(linear.clone());
        self.config = Some(linear);

        if self.authenticate().await {
            println!("Linear has been successfully configured.");
        }
        Ok(())
    }

    fn disconnect(&self, config: &mut AppConfig) -> Result<()> {
        config.linear = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(assignee: Option<&str>, creator: Option<&str>) -> IssueNode {
        let user = |email: Option<&str>| {
            email.map(|e| UserNode {
                id: Some("u1".into()),
                name: None,
                email: Some(e.into()),
                display_name: None,
            })
        };
        IssueNode {
            identifier: "ENG-1".into(),
            title: "Fix the thing".into(),
            description: Some("details".into()),
            url: Some("https://linear.app/i/ENG-1".into()),
            created_at: Some("2025-01-10T00:00:00Z".into()),
            updated_at: Some("2025-01-12T00:00:00Z".into()),
            assignee: user(assignee),
            creator: user(creator),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn user_match_checks_assignee_and_creator_emails() {
        assert!(matches_user(
            &node(Some("alice@example.com"), None),
            "alice@example.com"
        ));
        assert!(matches_user(
            &node(None, Some("Alice@Example.com")),
            "alice@example.com"
        ));
        assert!(!matches_user(
            &node(Some("bob@example.com"), Some("carol@example.com")),
            "alice@example.com"
        ));
        assert!(!matches_user(&node(None, None), "alice@example.com"));
    }

    #[test]
    fn issue_conversion_keeps_extra_fields_in_raw_data() {
        let mut issue = node(Some("alice@example.com"), None);
        issue
            .extra
            .insert("state".into(), serde_json::json!({"name": "In Progress"}));
        issue.extra.insert("priorityLabel".into(), "High".into());

        let item = issue_to_work_item(issue);
        assert_eq!(item.id, "ENG-1");
        assert_eq!(item.provider, "Linear");
        assert_eq!(item.raw_data["state"]["name"], "In Progress");
        assert_eq!(item.raw_data["priorityLabel"], "High");
        assert_eq!(item.raw_data["assignee"]["email"], "alice@example.com");
    }

    #[test]
    fn missing_api_key_means_unconfigured() {
        assert!(!LinearProvider::new(None).is_configured());
        assert!(!LinearProvider::new(Some(LinearConfig {
            api_key: String::new()
        }))
        .is_configured());
        assert!(LinearProvider::new(Some(LinearConfig {
            api_key: "lin_api_123".into()
        }))
        .is_configured());
    }
}
