//! Pluggable agents: `(task, context) → response`.
//!
//! Every implementation sits behind the one [`Agent`] trait; the engine only
//! sees an [`AgentRegistry`] keyed by routing name.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::selector::{DEFAULT_AGENT, route_agent};
use crate::core::task::Task;
use crate::io::config::AgentConfig;

pub mod anthropic;
pub mod command;
pub mod error;
pub mod router;
pub mod simple;
pub mod yandex;

pub use error::AgentError;

/// Shared system prompt for LLM-backed agents.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an executor agent in a task management system. \
    You receive a task with its context. Act concretely: either complete the task and show the \
    result, or ask one clarifying question. Plain text, no markdown headings. Be brief.";

#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce a response for `task` given the rendered `context`.
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError>;
}

/// Agents keyed by routing name, in registration order.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<(String, Arc<dyn Agent>)>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` under `name`, replacing any agent with that name in place.
    pub fn register(&mut self, name: &str, agent: Arc<dyn Agent>) {
        if let Some(slot) = self.agents.iter_mut().find(|(existing, _)| existing == name) {
            slot.1 = agent;
        } else {
            self.agents.push((name.to_string(), agent));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, agent)| Arc::clone(agent))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|(name, _)| name.as_str())
    }

    /// Agent for `task`: a matching `#<name>` tag, else the `default` agent.
    pub fn select_for(&self, task: &Task) -> Option<(String, Arc<dyn Agent>)> {
        let name = route_agent(task.name(), self.names())?;
        self.get(name).map(|agent| (name.to_string(), agent))
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build the registry from `[[agents]]`, reading secrets from the process environment.
pub fn build_registry(configs: &[AgentConfig]) -> Result<AgentRegistry> {
    build_registry_with(configs, &|key| std::env::var(key).ok())
}

/// Build the registry resolving secrets through `lookup_env`.
///
/// Routers are wired after every concrete agent exists. With no agents
/// configured, an echo agent is registered as `default`.
pub fn build_registry_with(
    configs: &[AgentConfig],
    lookup_env: &dyn Fn(&str) -> Option<String>,
) -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    if configs.is_empty() {
        warn!("no agents configured, registering echo agent as default");
        registry.register(DEFAULT_AGENT, Arc::new(simple::EchoAgent));
        return Ok(registry);
    }

    let mut concrete: HashMap<&str, Arc<dyn Agent>> = HashMap::new();
    let mut built: Vec<Option<Arc<dyn Agent>>> = Vec::with_capacity(configs.len());
    for config in configs {
        let agent = build_concrete(config, lookup_env)?;
        if let Some(agent) = &agent {
            for name in config.names() {
                concrete.insert(name.as_str(), Arc::clone(agent));
            }
        }
        built.push(agent);
    }

    for (config, agent) in configs.iter().zip(built) {
        let agent = match (config, agent) {
            (_, Some(agent)) => agent,
            (AgentConfig::Router(cfg), None) => {
                let routes = cfg
                    .routes
                    .iter()
                    .map(|route| {
                        concrete
                            .get(route.agent.as_str())
                            .map(|agent| (route.keyword.clone(), Arc::clone(agent)))
                            .ok_or_else(|| anyhow!("route target {:?} is not a concrete agent", route.agent))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(router::RouterAgent::new(routes)?) as Arc<dyn Agent>
            }
            (other, None) => return Err(anyhow!("{} agent could not be built", other.kind())),
        };
        for name in config.names() {
            registry.register(name, Arc::clone(&agent));
        }
        info!(kind = config.kind(), names = ?config.names(), "registered agent");
    }

    if registry.get(DEFAULT_AGENT).is_none() {
        warn!("no agent registered as `default`; untagged tasks will not be dispatched");
    }
    Ok(registry)
}

fn build_concrete(
    config: &AgentConfig,
    lookup_env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn Agent>>> {
    let secret = |key: &str| {
        lookup_env(key)
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("environment variable {key} is not set"))
    };

    let agent: Arc<dyn Agent> = match config {
        AgentConfig::Anthropic(cfg) => {
            Arc::new(anthropic::AnthropicAgent::new(cfg, secret(&cfg.api_key_env)?)?)
        }
        AgentConfig::Yandex(cfg) => Arc::new(yandex::YandexAgent::new(cfg, secret(&cfg.api_key_env)?)?),
        AgentConfig::Command(cfg) => Arc::new(command::CommandAgent::new(cfg)),
        AgentConfig::Echo(_) => Arc::new(simple::EchoAgent),
        AgentConfig::Status(_) => Arc::new(simple::StatusAgent),
        AgentConfig::Router(_) => return Ok(None),
    };
    Ok(Some(agent))
}
