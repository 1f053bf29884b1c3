//! Agents that need no model: useful for wiring checks and acknowledgements.

use async_trait::async_trait;

use super::{Agent, AgentError};
use crate::core::task::Task;

const ECHO_TAIL_CHARS: usize = 200;

/// Echoes the tail of the context back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn respond(&self, _task: &Task, context: &str) -> Result<String, AgentError> {
        let total = context.chars().count();
        let tail: String = context
            .chars()
            .skip(total.saturating_sub(ECHO_TAIL_CHARS))
            .collect();
        Ok(format!(
            "[ECHO] Received context ({total} chars). Last {ECHO_TAIL_CHARS}:\n{tail}"
        ))
    }
}

/// Acknowledges the task by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusAgent;

#[async_trait]
impl Agent for StatusAgent {
    async fn respond(&self, task: &Task, _context: &str) -> Result<String, AgentError> {
        Ok(format!("Task accepted: {}. Starting work.", task.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::AutonomyRules;
    use crate::test_support::node_named;

    fn task() -> Task {
        Task::from_node(node_named("t", 0, "собрать статус"), &AutonomyRules::default())
    }

    #[tokio::test]
    async fn echo_reports_length_and_tail() {
        let context = format!("{}{}", "a".repeat(250), "б".repeat(50));
        let reply = EchoAgent.respond(&task(), &context).await.expect("echo");
        assert!(reply.starts_with("[ECHO] Received context (300 chars)"));
        let tail = reply.rsplit('\n').next().expect("tail");
        assert_eq!(tail, format!("{}{}", "a".repeat(150), "б".repeat(50)));
    }

    #[tokio::test]
    async fn status_acknowledges_by_name() {
        let reply = StatusAgent.respond(&task(), "").await.expect("status");
        assert_eq!(reply, "Task accepted: собрать статус. Starting work.");
    }
}
