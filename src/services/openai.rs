//! OpenAI-compatible chat client used for report generation, plus the
//! service-integration lifecycle for its credentials. Any endpoint speaking
//! the chat-completions protocol works via the configurable base URL.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::config::{AppConfig, OpenAiConfig};
use crate::util;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_WORK_ITEM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o";

pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

impl OpenAiClient {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// One-shot chat completion: send a single user prompt, return the
    /// model's text.
    pub async fn chat(&self, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": [ { "role": "user", "content": prompt } ],
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI API request failed")?
            .error_for_status()
            .context("OpenAI API returned an error")?;

        let chat: ChatResponse = resp.json().await.context("Failed to parse OpenAI response")?;
        match chat.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => bail!("OpenAI response contained no choices"),
        }
    }

    /// Cheap authenticated call to confirm the key works.
    pub async fn validate(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => true,
            Err(e) => {
                eprintln!("OpenAI validation failed: {e}");
                false
            }
        }
    }
}

pub fn is_configured(config: &AppConfig) -> bool {
    config
        .openai
        .as_ref()
        .is_some_and(|c| !c.api_key.is_empty())
}

pub async fn setup(config: &mut AppConfig) -> Result<()> {
    println!("OpenAI is used for AI-powered summarization of your work activities.");
    let api_key = util::prompt("OpenAI API key")?;

    let base_url = if util::confirm("Use a custom OpenAI base URL? (e.g. Azure OpenAI)", false)? {
        Some(util::prompt("Custom base URL")?)
    } else {
        None
    };

    let (work_item_model, summary_model) = if util::confirm(
        &format!(
            "Configure custom models? (default: {DEFAULT_WORK_ITEM_MODEL} for items, {DEFAULT_SUMMARY_MODEL} for the overall summary)"
        ),
        false,
    )? {
        (
            Some(util::prompt("Model for work item summaries")?),
            Some(util::prompt("Model for the overall summary")?),
        )
    } else {
        (None, None)
    };

    let openai = OpenAiConfig {
        api_key,
        base_url,
        work_item_model,
        summary_model,
    };

    if util::confirm("Validate the OpenAI configuration now?", true)? {
        if OpenAiClient::from_config(&openai).validate().await {
            println!("OpenAI connection validated successfully.");
        }
    }

    config.openai = Some(openai);
    println!("OpenAI configuration saved.");
    Ok(())
}

pub fn disconnect(config: &mut AppConfig) {
    config.openai = None;
}
