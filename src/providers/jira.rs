use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::{Page, Provider};
use crate::config::{AppConfig, JiraConfig};
use crate::model::fetch_params::FetchParams;
use crate::model::work_item::WorkItem;
use crate::util;

const PAGE_SIZE: usize = 50;

pub struct JiraProvider {
    config: Option<JiraConfig>,
    /// Account id recorded by `authenticate`, used when no user filter is
    /// given.
    account_id: Option<String>,
    client: reqwest::Client,
}

impl JiraProvider {
    pub fn new(config: Option<JiraConfig>) -> Self {
        Self {
            config,
            account_id: None,
            client: reqwest::Client::new(),
        }
    }

    fn auth_header(config: &JiraConfig) -> String {
        let creds = format!("{}:{}", config.username, config.api_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        format!("Basic {encoded}")
    }

    fn configured(&self) -> Result<&JiraConfig> {
        self.config
            .as_ref()
            .filter(|c| !c.url.is_empty() && !c.username.is_empty() && !c.api_token.is_empty())
            .context("Jira is not configured")
    }

    fn build_jql(&self, params: &FetchParams) -> String {
        let user_clause = match &params.user_filter {
            Some(user) => {
                let quoted = user.replace('"', "\\\"");
                format!("(assignee = \"{quoted}\" OR reporter = \"{quoted}\")")
            }
            // Unset filter means the authenticated identity.
            None => match &self.account_id {
                Some(id) => format!("(assignee = \"{id}\" OR reporter = \"{id}\")"),
                None => "(assignee = currentUser() OR reporter = currentUser())".to_string(),
            },
        };
        // Exclusive bound on the day after the end date keeps the final
        // day fully inside the window, whole seconds included.
        let day_after_end = params.end_date + chrono::Duration::days(1);
        format!(
            "updated >= \"{}\" AND updated < \"{day_after_end}\" AND {} ORDER BY updated ASC",
            params.start_date, user_clause
        )
    }
}

#[derive(Deserialize)]
struct Myself {
    #[serde(rename = "accountId")]
    account_id: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "startAt")]
    start_at: usize,
    total: usize,
    issues: Vec<JiraIssue>,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<String>,
    created: Option<String>,
    updated: Option<String>,
    status: Option<NamedField>,
    priority: Option<NamedField>,
    #[serde(default)]
    labels: Vec<String>,
    project: Option<ProjectField>,
    assignee: Option<UserField>,
    reporter: Option<UserField>,
}

#[derive(Deserialize)]
struct NamedField {
    name: String,
}

#[derive(Deserialize)]
struct ProjectField {
    key: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct UserField {
    #[serde(rename = "accountId")]
    account_id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

fn user_json(user: &Option<UserField>) -> serde_json::Value {
    match user {
        Some(u) => json!({
            "account_id": u.account_id,
            "display_name": u.display_name,
            "email": u.email_address,
        }),
        None => serde_json::Value::Null,
    }
}

/// Jira reports timestamps like `2025-01-20T15:30:00.000+0000`, which is not
/// valid RFC 3339 (no colon in the offset). Normalize on ingest so the rest
/// of the system only ever sees RFC 3339.
fn normalize_timestamp(raw: Option<String>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match chrono::DateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.3f%z") {
        Ok(dt) => dt.to_rfc3339(),
        Err(_) => raw,
    }
}

impl JiraProvider {
    fn issue_to_work_item(&self, base_url: &str, issue: JiraIssue) -> WorkItem {
        let raw_data = json!({
            "status": issue.fields.status.as_ref().map(|s| s.name.clone()),
            "priority": issue.fields.priority.as_ref().map(|p| p.name.clone()),
            "labels": issue.fields.labels,
            "project": issue.fields.project.as_ref().map(|p| json!({
                "key": p.key,
                "name": p.name,
            })),
            "assignee": user_json(&issue.fields.assignee),
            "reporter": user_json(&issue.fields.reporter),
        });

        WorkItem {
            id: issue.key.clone(),
            title: issue.fields.summary.unwrap_or_default(),
            description: issue.fields.description.filter(|d| !d.is_empty()),
            url: format!("{base_url}/browse/{}", issue.key),
            created_at: normalize_timestamp(issue.fields.created),
            updated_at: normalize_timestamp(issue.fields.updated),
            provider: "Jira".into(),
            raw_data,
        }
    }
}

#[async_trait]
impl Provider for JiraProvider {
    fn name(&self) -> &str {
        "Jira"
    }

    fn is_configured(&self) -> bool {
        self.configured().is_ok()
    }

    async fn authenticate(&mut self) -> bool {
        let config = match self.configured() {
            Ok(c) => c,
            Err(_) => return false,
        };
        let url = format!("{}/rest/api/2/myself", config.url);
        let result = self
            .client
            .get(&url)
            .header("Authorization", Self::auth_header(config))
            .header("Accept", "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Failed to authenticate with Jira: {e}");
                return false;
            }
        };
        match resp.json::<Myself>().await {
            Ok(me) => {
                let who = me
                    .display_name
                    .or(me.email_address)
                    .unwrap_or_else(|| me.account_id.clone());
                eprintln!("Connected to Jira as: {who}");
                self.account_id = Some(me.account_id);
                true
            }
            Err(e) => {
                eprintln!("Failed to parse Jira identity response: {e}");
                false
            }
        }
    }

    async fn fetch_page(&self, params: &FetchParams, cursor: Option<&str>) -> Result<Page> {
        let config = self.configured()?;
        let start_at: usize = match cursor {
            Some(c) => c.parse().context("Invalid Jira pagination cursor")?,
            None => 0,
        };
        let jql = self.build_jql(params);
        let url = format!(
            "{}/rest/api/2/search?jql={}&startAt={start_at}&maxResults={PAGE_SIZE}\
             &fields=summary,description,status,priority,labels,project,assignee,reporter,created,updated",
            config.url,
            urlencoding::encode(&jql)
        );

        let resp = self
            .client
            .get(&url)
            .header("Authorization", Self::auth_header(config))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Jira API request failed")?
            .error_for_status()
            .context("Jira API returned an error")?;

        let search: SearchResponse = resp.json().await.context("Failed to parse Jira response")?;

        let fetched = search.issues.len();
        let next_cursor = if search.start_at + fetched < search.total && fetched > 0 {
            Some((search.start_at + fetched).to_string())
        } else {
            None
        };

        let base_url = config.url.clone();
        let items = search
            .issues
            .into_iter()
            .map(|issue| self.issue_to_work_item(&base_url, issue))
            // JQL bounds are day-granular; the inclusive range check on
            // updated_at is authoritative.
            .filter(|item| params.contains(&item.updated_at))
            .collect();

        Ok(Page { items, next_cursor })
    }

    async fn setup(&mut self, config: &mut AppConfig) -> Result<()> {
        if self.is_configured()
            && !util::confirm("Jira is already configured. Reconfigure?", false)?
        {
            return Ok(());
        }
        let url = util::prompt("Jira URL (e.g. https://your-domain.atlassian.net)")?;
        let username = util::prompt("Jira username (email)")?;
        let api_token = util::prompt("Jira API token")?;

        let jira = JiraConfig {
            url: url.trim_end_matches('/').to_string(),
            username,
            api_token,
        };
        config.jira = Some(jira.clone());
        self.config = Some(jira);

        if self.authenticate().await {
            println!("Jira has been successfully configured.");
        }
        Ok(())
    }

    fn disconnect(&self, config: &mut AppConfig) -> Result<()> {
        config.jira = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn provider() -> JiraProvider {
        JiraProvider::new(Some(JiraConfig {
            url: "https://example.atlassian.net".into(),
            username: "me@example.com".into(),
            api_token: "token".into(),
        }))
    }

    fn params(user: Option<&str>) -> FetchParams {
        FetchParams::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            user.map(|u| u.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn jira_timestamps_are_normalized_to_rfc3339() {
        let normalized = normalize_timestamp(Some("2025-01-20T15:30:00.000+0000".into()));
        assert_eq!(normalized, "2025-01-20T15:30:00+00:00");
        // Already-valid input passes through unchanged.
        assert_eq!(
            normalize_timestamp(Some("not a timestamp".into())),
            "not a timestamp"
        );
        assert_eq!(normalize_timestamp(None), "");
    }

    #[test]
    fn jql_filters_on_explicit_user() {
        let jql = provider().build_jql(&params(Some("alice@example.com")));
        assert!(jql.contains("assignee = \"alice@example.com\""));
        assert!(jql.contains("reporter = \"alice@example.com\""));
        assert!(jql.contains("updated >= \"2025-01-01\""));
        // The end date is inclusive through 23:59:59, expressed as an
        // exclusive bound on the next day.
        assert!(jql.contains("updated < \"2025-02-01\""));
    }

    #[test]
    fn jql_end_bound_rolls_over_month_and_year() {
        let p = provider();
        let december = FetchParams::new(
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            None,
        )
        .unwrap();
        assert!(p.build_jql(&december).contains("updated < \"2025-01-01\""));
    }

    #[test]
    fn jql_defaults_to_current_user_before_authentication() {
        let jql = provider().build_jql(&params(None));
        assert!(jql.contains("currentUser()"));
    }

    #[test]
    fn jql_uses_authenticated_account_when_known() {
        let mut p = provider();
        p.account_id = Some("acct-123".into());
        let jql = p.build_jql(&params(None));
        assert!(jql.contains("assignee = \"acct-123\""));
        assert!(!jql.contains("currentUser()"));
    }

    #[test]
    fn missing_credentials_mean_unconfigured() {
        assert!(!JiraProvider::new(None).is_configured());
        let empty_token = JiraProvider::new(Some(JiraConfig {
            url: "https://example.atlassian.net".into(),
            username: "me@example.com".into(),
            api_token: String::new(),
        }));
        assert!(!empty_token.is_configured());
        assert!(provider().is_configured());
    }
}
