//! Anthropic Messages API agent.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Agent, AgentError, DEFAULT_SYSTEM_PROMPT};
use crate::core::task::Task;
use crate::io::config::AnthropicAgentConfig;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAgent {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl AnthropicAgent {
    pub fn new(config: &AnthropicAgentConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build anthropic http client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    fn request<'a>(&'a self, context: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &self.system_prompt,
            messages: vec![Message {
                role: "user",
                content: context,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn first_text(self) -> Result<String, AgentError> {
        let text = self
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| AgentError::Malformed("no text block in response".to_string()))?;
        if text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Agent for AnthropicAgent {
    #[instrument(skip_all, fields(task_id = task.id(), model = %self.model))]
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request(context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response.json().await?;
        debug!(blocks = parsed.content.len(), "anthropic response");
        parsed.first_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_system_prompt_and_single_user_message() {
        let agent = AnthropicAgent::new(&AnthropicAgentConfig::default(), "k".to_string())
            .expect("agent");
        let body = serde_json::to_value(agent.request("Task: x")).expect("json");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Task: x");
    }

    #[test]
    fn picks_first_text_block() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"done"}]}"#,
        )
        .expect("parse");
        assert_eq!(parsed.first_text().expect("text"), "done");
    }

    #[test]
    fn missing_or_blank_text_is_an_error() {
        let parsed: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).expect("parse");
        assert!(matches!(parsed.first_text(), Err(AgentError::Malformed(_))));

        let parsed: MessagesResponse =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"  "}]}"#).expect("parse");
        assert!(matches!(parsed.first_text(), Err(AgentError::EmptyResponse)));
    }
}
