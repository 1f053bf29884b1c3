//! Keyword router over sub-agents.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use super::{Agent, AgentError};
use crate::core::task::Task;

/// Dispatches to the first route whose keyword occurs in the task name,
/// falling back to the first route.
pub struct RouterAgent {
    routes: Vec<(String, Arc<dyn Agent>)>,
}

impl RouterAgent {
    pub fn new(routes: Vec<(String, Arc<dyn Agent>)>) -> Result<Self> {
        if routes.is_empty() {
            return Err(anyhow!("router needs at least one route"));
        }
        let routes = routes
            .into_iter()
            .map(|(keyword, agent)| (keyword.to_lowercase(), agent))
            .collect();
        Ok(Self { routes })
    }

    fn route(&self, task_name: &str) -> (&str, &Arc<dyn Agent>) {
        let name = task_name.to_lowercase();
        let (keyword, agent) = self
            .routes
            .iter()
            .find(|(keyword, _)| name.contains(keyword.as_str()))
            .unwrap_or(&self.routes[0]);
        (keyword.as_str(), agent)
    }
}

#[async_trait]
impl Agent for RouterAgent {
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        let (keyword, agent) = self.route(task.name());
        debug!(task_id = task.id(), keyword, "routing task");
        agent.respond(task, context).await
    }
}
