//! Agent failure taxonomy.
//!
//! The engine only needs the rendered message: rate-limit failures render with
//! the word "limit", which selects the longer backoff.

use std::time::Duration;

use thiserror::Error;

/// Longest upstream body/output excerpt carried in an error message.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("rate limit exceeded (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("exit {code}: {output}")]
    Exit { code: i32, output: String },

    #[error("empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("process failed: {0}")]
    Process(String),
}

impl AgentError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = excerpt(body);
        if status == 429 {
            AgentError::RateLimited { status, body }
        } else {
            AgentError::Http { status, body }
        }
    }

    pub fn exit(code: i32, output: &str) -> Self {
        AgentError::Exit {
            code,
            output: excerpt(output),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AgentError::Malformed(err.to_string())
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
