//! Local CLI agent (headless `claude -p` by default).

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, warn};

use super::{Agent, AgentError, DEFAULT_SYSTEM_PROMPT};
use crate::core::backoff::truncate_chars;
use crate::core::task::Task;
use crate::io::config::CommandAgentConfig;
use crate::io::process::run_command_with_timeout;

/// Set by a parent CLI session; nested invocations refuse to start while it is present.
const NESTED_SESSION_ENV: &str = "CLAUDECODE";

/// Runs a program with the context on stdin and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    max_attempts: u32,
    output_limit_bytes: usize,
}

impl CommandAgent {
    pub fn new(config: &CommandAgentConfig) -> Self {
        let args = config.args.clone().unwrap_or_else(|| {
            let system_prompt = config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
            vec![
                "-p".to_string(),
                "--model".to_string(),
                config.model.clone(),
                "--output-format".to_string(),
                "text".to_string(),
                "--no-session-persistence".to_string(),
                "--system-prompt".to_string(),
                system_prompt,
            ]
        });
        Self {
            program: config.program.clone(),
            args,
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).env_remove(NESTED_SESSION_ENV);
        cmd
    }
}

#[async_trait]
impl Agent for CommandAgent {
    #[instrument(skip_all, fields(task_id = task.id(), program = %self.program))]
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        let mut last_error = AgentError::EmptyResponse;
        for attempt in 1..=self.max_attempts {
            let output = run_command_with_timeout(
                self.command(),
                Some(context.as_bytes()),
                self.timeout,
                self.output_limit_bytes,
            )
            .await
            .map_err(|err| AgentError::Process(format!("{err:#}")))?;

            if output.timed_out {
                warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    timeout_secs = self.timeout.as_secs(),
                    "agent command timed out"
                );
                last_error = AgentError::Timeout(self.timeout);
                continue;
            }

            let stdout = output.stdout_text();
            let text = if stdout.is_empty() {
                output.stderr_text()
            } else {
                stdout
            };

            if !output.success() {
                let code = output.exit_code().unwrap_or(-1);
                warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    code,
                    output = truncate_chars(&text, 300),
                    "agent command failed"
                );
                last_error = AgentError::exit(code, &text);
                continue;
            }

            if text.is_empty() {
                return Err(AgentError::EmptyResponse);
            }
            return Ok(text);
        }
        Err(last_error)
    }
}
