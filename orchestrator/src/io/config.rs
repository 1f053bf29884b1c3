//! Orchestrator configuration stored in a TOML file (default `orchestrator.toml`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::{AutonomyRule, AutonomyRules};
use crate::core::selector::DEFAULT_AGENT;
use crate::io::workflowy::DEFAULT_API_URL;

/// Orchestrator configuration (TOML).
///
/// This file is edited by humans. Missing fields default to the values the
/// service has always run with; secrets are referenced by environment
/// variable name and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Seconds to sleep between ticks.
    pub poll_interval_secs: u64,

    /// Levels fetched below each task when reading dialogs.
    pub dialog_depth: usize,

    /// Hours of silence after which a dialog is reported as stale.
    pub stale_hours: f64,

    /// Upper bound on agent invocations outstanding at once within a tick.
    pub max_concurrent_dispatches: usize,

    /// Write a digest into the tree every N ticks while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_every_ticks: Option<u64>,

    pub tree: TreeConfig,

    pub autonomy: AutonomyConfig,

    pub agents: Vec<AgentConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            dialog_depth: 5,
            stale_hours: 24.0,
            max_concurrent_dispatches: 4,
            digest_every_ticks: None,
            tree: TreeConfig::default(),
            autonomy: AutonomyConfig::default(),
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TreeConfig {
    pub api_url: String,

    /// Environment variable holding the WorkFlowy API key.
    pub api_key_env: String,

    /// Node whose children are the task backlog.
    pub backlog_node_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_node_id: Option<String>,

    /// Node under which digests are written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_node_id: Option<String>,

    pub request_timeout_secs: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key_env: "WORKFLOWY_API_KEY".to_string(),
            backlog_node_id: String::new(),
            review_node_id: None,
            digest_node_id: None,
            request_timeout_secs: 30,
        }
    }
}

impl TreeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Replaces the built-in rule table when set. Order matters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<AutonomyRule>>,
}

impl AutonomyConfig {
    pub fn to_rules(&self) -> AutonomyRules {
        match &self.rules {
            Some(rules) => AutonomyRules::new(rules.clone()),
            None => AutonomyRules::default(),
        }
    }
}

/// One `[[agents]]` entry, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentConfig {
    Anthropic(AnthropicAgentConfig),
    Yandex(YandexAgentConfig),
    Command(CommandAgentConfig),
    Echo(SimpleAgentConfig),
    Status(SimpleAgentConfig),
    Router(RouterAgentConfig),
}

impl AgentConfig {
    /// Registry names this agent is registered under.
    pub fn names(&self) -> &[String] {
        match self {
            AgentConfig::Anthropic(cfg) => &cfg.names,
            AgentConfig::Yandex(cfg) => &cfg.names,
            AgentConfig::Command(cfg) => &cfg.names,
            AgentConfig::Echo(cfg) | AgentConfig::Status(cfg) => &cfg.names,
            AgentConfig::Router(cfg) => &cfg.names,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AgentConfig::Anthropic(_) => "anthropic",
            AgentConfig::Yandex(_) => "yandex",
            AgentConfig::Command(_) => "command",
            AgentConfig::Echo(_) => "echo",
            AgentConfig::Status(_) => "status",
            AgentConfig::Router(_) => "router",
        }
    }
}

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnthropicAgentConfig {
    pub names: Vec<String>,
    pub api_url: String,
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AnthropicAgentConfig {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_AGENT.to_string()],
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: 1024,
            system_prompt: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YandexAgentConfig {
    pub names: Vec<String>,
    pub api_url: String,
    pub api_key_env: String,
    /// Cloud folder id; not a secret.
    pub folder_id: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
}

impl Default for YandexAgentConfig {
    fn default() -> Self {
        Self {
            names: vec!["comms-agent".to_string()],
            api_url: "https://llm.api.cloud.yandex.net/foundationModels/v1/completion".to_string(),
            api_key_env: "YANDEX_API_KEY".to_string(),
            folder_id: String::new(),
            model: "yandexgpt-lite".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            system_prompt: None,
            timeout_secs: 60,
        }
    }
}

/// Local CLI agent. With no `args`, runs a headless `claude -p` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandAgentConfig {
    pub names: Vec<String>,
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub output_limit_bytes: usize,
}

impl Default for CommandAgentConfig {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_AGENT.to_string(), "dev-agent".to_string()],
            program: "claude".to_string(),
            args: None,
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            system_prompt: None,
            timeout_secs: 120,
            max_attempts: 2,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimpleAgentConfig {
    pub names: Vec<String>,
}

impl Default for SimpleAgentConfig {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_AGENT.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterAgentConfig {
    pub names: Vec<String>,
    /// Checked in order; the first route is also the fallback.
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub keyword: String,
    /// Registry name of a non-router agent.
    pub agent: String,
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.dialog_depth == 0 {
            return Err(anyhow!("dialog_depth must be > 0"));
        }
        if !self.stale_hours.is_finite() || self.stale_hours <= 0.0 {
            return Err(anyhow!("stale_hours must be a positive number"));
        }
        if self.max_concurrent_dispatches == 0 {
            return Err(anyhow!("max_concurrent_dispatches must be > 0"));
        }
        if self.digest_every_ticks == Some(0) {
            return Err(anyhow!("digest_every_ticks must be > 0 when set"));
        }
        if self.digest_every_ticks.is_some() && self.tree.digest_node_id.is_none() {
            return Err(anyhow!("digest_every_ticks requires tree.digest_node_id"));
        }
        if self.tree.backlog_node_id.trim().is_empty() {
            return Err(anyhow!("tree.backlog_node_id must be set"));
        }
        if self.tree.api_key_env.trim().is_empty() {
            return Err(anyhow!("tree.api_key_env must be set"));
        }
        if self.tree.request_timeout_secs == 0 {
            return Err(anyhow!("tree.request_timeout_secs must be > 0"));
        }
        if let Some(rules) = &self.autonomy.rules
            && rules.iter().any(|rule| rule.keyword.trim().is_empty())
        {
            return Err(anyhow!("autonomy.rules keywords must be non-empty"));
        }
        self.validate_agents()
    }

    fn validate_agents(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.names().is_empty() {
                return Err(anyhow!("{} agent must have at least one name", agent.kind()));
            }
            for name in agent.names() {
                if name.trim().is_empty() || name.contains(char::is_whitespace) {
                    return Err(anyhow!("invalid agent name {name:?}"));
                }
                if !seen.insert(name.as_str()) {
                    return Err(anyhow!("agent name {name:?} registered twice"));
                }
            }
            match agent {
                AgentConfig::Anthropic(cfg) if cfg.timeout_secs == 0 => {
                    return Err(anyhow!("anthropic agent timeout_secs must be > 0"));
                }
                AgentConfig::Yandex(cfg) if cfg.folder_id.trim().is_empty() => {
                    return Err(anyhow!("yandex agent folder_id must be set"));
                }
                AgentConfig::Yandex(cfg) if cfg.timeout_secs == 0 => {
                    return Err(anyhow!("yandex agent timeout_secs must be > 0"));
                }
                AgentConfig::Command(cfg) => {
                    if cfg.program.trim().is_empty() {
                        return Err(anyhow!("command agent program must be set"));
                    }
                    if cfg.timeout_secs == 0 || cfg.max_attempts == 0 {
                        return Err(anyhow!(
                            "command agent timeout_secs and max_attempts must be > 0"
                        ));
                    }
                    if cfg.output_limit_bytes == 0 {
                        return Err(anyhow!("command agent output_limit_bytes must be > 0"));
                    }
                }
                AgentConfig::Router(cfg) if cfg.routes.is_empty() => {
                    return Err(anyhow!("router agent must have at least one route"));
                }
                _ => {}
            }
        }

        for agent in &self.agents {
            let AgentConfig::Router(router) = agent else {
                continue;
            };
            for route in &router.routes {
                let target = self
                    .agents
                    .iter()
                    .find(|candidate| candidate.names().contains(&route.agent))
                    .ok_or_else(|| anyhow!("route {:?} targets unknown agent {:?}", route.keyword, route.agent))?;
                if matches!(target, AgentConfig::Router(_)) {
                    return Err(anyhow!(
                        "route {:?} targets router {:?}; routes must target a concrete agent",
                        route.keyword,
                        route.agent
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`, which
/// still has to pass validation (the backlog node must be set).
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()
            .with_context(|| format!("{} not found; defaults are incomplete", path.display()))?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
