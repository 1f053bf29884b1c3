//! YandexGPT completion API agent.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Agent, AgentError};
use crate::core::task::Task;
use crate::io::config::YandexAgentConfig;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an executor agent. Complete tasks concretely and briefly.";

pub struct YandexAgent {
    client: Client,
    api_url: String,
    api_key: String,
    model_uri: String,
    max_tokens: u32,
    temperature: f64,
    system_prompt: String,
}

impl YandexAgent {
    pub fn new(config: &YandexAgentConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build yandex http client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model_uri: format!("gpt://{}/{}", config.folder_id, config.model),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    fn request<'a>(&'a self, context: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model_uri: &self.model_uri,
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            messages: vec![
                Message {
                    role: "system",
                    text: &self.system_prompt,
                },
                Message {
                    role: "user",
                    text: context,
                },
            ],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: &'a str,
    completion_options: CompletionOptions,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

impl CompletionResponse {
    fn first_text(self) -> Result<String, AgentError> {
        let text = self
            .result
            .alternatives
            .into_iter()
            .next()
            .map(|alt| alt.message.text)
            .ok_or_else(|| AgentError::Malformed("no alternatives in response".to_string()))?;
        if text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Agent for YandexAgent {
    #[instrument(skip_all, fields(task_id = task.id(), model = %self.model_uri))]
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(&self.request(context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), &body));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed.first_text()
    }
}
