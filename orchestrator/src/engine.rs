//! The orchestration engine: one long-lived instance owning per-id dispatch
//! bookkeeping and the digest buffer, driven one tick at a time.
//!
//! Each id moves `new → in flight → {done, failed(backoff)}`; a failed id is
//! eligible again once its backoff elapses. In-flight membership is claimed
//! and released under the same lock as the backoff check, so two dispatches
//! for one id can never overlap while different ids run concurrently.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use futures::StreamExt;
use futures::stream;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{Agent, AgentRegistry};
use crate::core::backoff::{ERROR_EVENT_CHARS, backoff_for, truncate_chars};
use crate::core::classifier::AutonomyRules;
use crate::core::dialog::Dialog;
use crate::core::digest::{DigestEvent, render_digest};
use crate::core::selector::new_task_candidates;
use crate::core::task::{Task, set_tag};
use crate::core::types::{Autonomy, TaskStatus};
use crate::dialog::DialogManager;
use crate::io::config::OrchestratorConfig;
use crate::io::prompt::PromptEngine;
use crate::io::tree_client::TreeClient;
use crate::tree::Position;

/// Preamble posted ahead of red-tier results.
const DECISION_PREAMBLE: &str = "Prepared the material. Needs your decision:";

/// Engine settings derived from the file config.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub backlog_node_id: String,
    pub digest_node_id: Option<String>,
    pub poll_interval: Duration,
    pub dialog_depth: usize,
    pub stale_hours: f64,
    pub max_concurrent_dispatches: usize,
    pub digest_every_ticks: Option<u64>,
}

impl EngineConfig {
    pub fn new(backlog_node_id: &str) -> Self {
        Self::from(&OrchestratorConfig::default()).with_backlog(backlog_node_id)
    }

    fn with_backlog(mut self, backlog_node_id: &str) -> Self {
        self.backlog_node_id = backlog_node_id.to_string();
        self
    }
}

impl From<&OrchestratorConfig> for EngineConfig {
    fn from(cfg: &OrchestratorConfig) -> Self {
        Self {
            backlog_node_id: cfg.tree.backlog_node_id.clone(),
            digest_node_id: cfg.tree.digest_node_id.clone(),
            poll_interval: cfg.poll_interval(),
            dialog_depth: cfg.dialog_depth,
            stale_hours: cfg.stale_hours,
            max_concurrent_dispatches: cfg.max_concurrent_dispatches.max(1),
            digest_every_ticks: cfg.digest_every_ticks,
        }
    }
}

/// Result of one dispatch attempt for a task or dialog id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Agent answered and the answer was written back.
    Completed,
    /// Agent or tree write failed; the id is backing off.
    Failed,
    /// Another dispatch for this id is still running.
    SkippedInFlight,
    /// The id failed recently and its backoff has not elapsed.
    SkippedBackoff,
    /// No agent is registered under a matching or default name.
    NoAgent,
}

impl DispatchOutcome {
    fn attempted(self) -> bool {
        matches!(self, DispatchOutcome::Completed | DispatchOutcome::Failed)
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub tasks_scanned: usize,
    pub new_tasks: usize,
    pub pending_dialogs: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stale: usize,
}

impl TickReport {
    fn count(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Completed => self.completed += 1,
            DispatchOutcome::Failed => self.failed += 1,
            DispatchOutcome::SkippedInFlight
            | DispatchOutcome::SkippedBackoff
            | DispatchOutcome::NoAgent => self.skipped += 1,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    tick: u64,
    in_flight: HashSet<String>,
    failed: HashMap<String, Instant>,
    events: Vec<DigestEvent>,
}

/// Releases an in-flight claim when dropped, whatever the dispatch outcome.
struct InFlightGuard<'a> {
    state: &'a Mutex<EngineState>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&self.id);
    }
}

pub struct Orchestrator<C: TreeClient> {
    client: C,
    config: EngineConfig,
    agents: AgentRegistry,
    rules: AutonomyRules,
    prompts: PromptEngine,
    state: Mutex<EngineState>,
}

impl<C: TreeClient> Orchestrator<C> {
    pub fn new(
        config: EngineConfig,
        client: C,
        agents: AgentRegistry,
        rules: AutonomyRules,
    ) -> Result<Self> {
        Ok(Self {
            client,
            config,
            agents,
            rules,
            prompts: PromptEngine::new().context("load prompt templates")?,
            state: Mutex::new(EngineState::default()),
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tick_count(&self) -> u64 {
        self.lock().tick
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.lock().in_flight.contains(id)
    }

    /// When `id` becomes eligible again after a failure.
    pub fn retry_after(&self, id: &str) -> Option<Instant> {
        self.lock().failed.get(id).copied()
    }

    /// Digest events accumulated since the last digest.
    pub fn events(&self) -> Vec<DigestEvent> {
        self.lock().events.clone()
    }

    /// Run one orchestration cycle.
    ///
    /// Only a failure to list the backlog aborts the tick; every other error
    /// is confined to the task or dialog it belongs to.
    #[instrument(skip_all, fields(tick = tracing::field::Empty))]
    pub async fn tick(&self) -> Result<TickReport> {
        let tick = {
            let mut state = self.lock();
            state.tick += 1;
            state.tick
        };
        tracing::Span::current().record("tick", tick);
        let backlog = self.config.backlog_node_id.as_str();
        let dialogs = DialogManager::new(&self.client);
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        let children = self
            .client
            .list_children(Some(backlog))
            .await
            .with_context(|| format!("scan backlog {backlog}"))?;
        let tasks: Vec<Task> = children
            .into_iter()
            .filter(|node| !node.is_completed())
            .map(|node| Task::from_node(node, &self.rules))
            .collect();
        report.tasks_scanned = tasks.len();

        let candidates = new_task_candidates(tasks);
        report.new_tasks = candidates.len();

        let pending = dialogs
            .find_pending_dialogs(backlog, self.config.dialog_depth)
            .await
            .unwrap_or_else(|err| {
                warn!(err = %format!("{err:#}"), "pending dialog scan failed");
                Vec::new()
            });
        info!(
            tasks = report.tasks_scanned,
            new_tasks = report.new_tasks,
            pending_dialogs = pending.len(),
            "tick started"
        );

        let limit = self.config.max_concurrent_dispatches;
        let new_outcomes: Vec<(String, DispatchOutcome)> = stream::iter(candidates)
            .map(|task| async move {
                let id = task.id().to_string();
                (id, self.process_new_task(task).await)
            })
            .buffered(limit)
            .collect()
            .await;

        let mut dispatched = HashSet::new();
        for (id, outcome) in new_outcomes {
            report.count(outcome);
            if outcome.attempted() {
                dispatched.insert(id);
            }
        }

        let pending: Vec<Dialog> = pending
            .into_iter()
            .filter(|dialog| !dispatched.contains(&dialog.task_id))
            .collect();
        report.pending_dialogs = pending.len();

        let dialog_outcomes: Vec<DispatchOutcome> = stream::iter(pending)
            .map(|dialog| self.process_dialog(dialog))
            .buffered(limit)
            .collect()
            .await;
        for outcome in dialog_outcomes {
            report.count(outcome);
        }

        let stale = dialogs
            .find_stale_dialogs(backlog, self.config.stale_hours, self.config.dialog_depth)
            .await
            .unwrap_or_else(|err| {
                warn!(err = %format!("{err:#}"), "stale dialog scan failed");
                Vec::new()
            });
        report.stale = stale.len();
        if !stale.is_empty() {
            warn!(
                count = stale.len(),
                stale_hours = self.config.stale_hours,
                "stale dialogs"
            );
            let mut state = self.lock();
            for dialog in stale {
                // One undrained stale entry per dialog is enough.
                let reported = state.events.iter().any(|event| {
                    matches!(event, DigestEvent::Stale { task_id, .. } if *task_id == dialog.task_id)
                });
                if reported {
                    continue;
                }
                state.events.push(DigestEvent::Stale {
                    last_speaker: dialog.last_speaker(),
                    task: dialog.task_name,
                    task_id: dialog.task_id,
                });
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            stale = report.stale,
            "tick finished"
        );
        Ok(report)
    }

    /// Claim `id` for dispatch unless it is in flight or backing off.
    fn claim(&self, id: &str) -> Result<InFlightGuard<'_>, DispatchOutcome> {
        let mut state = self.lock();
        if state.in_flight.contains(id) {
            return Err(DispatchOutcome::SkippedInFlight);
        }
        if state
            .failed
            .get(id)
            .is_some_and(|retry_after| Instant::now() < *retry_after)
        {
            return Err(DispatchOutcome::SkippedBackoff);
        }
        state.in_flight.insert(id.to_string());
        Ok(InFlightGuard {
            state: &self.state,
            id: id.to_string(),
        })
    }

    fn record_success(&self, id: &str, event: DigestEvent) {
        let mut state = self.lock();
        state.failed.remove(id);
        state.events.push(event);
    }

    /// Start the backoff for `id` and return its length.
    fn record_failure(&self, id: &str, error_text: &str, event: Option<DigestEvent>) -> Duration {
        let backoff = backoff_for(error_text);
        let mut state = self.lock();
        state.failed.insert(id.to_string(), Instant::now() + backoff);
        if let Some(event) = event {
            state.events.push(event);
        }
        backoff
    }

    /// Dispatch a task seen for the first time and write the result back
    /// according to its autonomy tier.
    #[instrument(skip_all, fields(task_id = %task.id(), tier = %task.autonomy))]
    pub async fn process_new_task(&self, task: Task) -> DispatchOutcome {
        let _guard = match self.claim(task.id()) {
            Ok(guard) => guard,
            Err(skipped) => {
                debug!(outcome = ?skipped, "skipping task");
                return skipped;
            }
        };
        let Some((agent_name, agent)) = self.agents.select_for(&task) else {
            warn!(task = task.name(), "no agent available");
            return DispatchOutcome::NoAgent;
        };
        info!(task = task.name(), agent = %agent_name, "processing new task");

        match self.run_new_task(&task, agent.as_ref()).await {
            Ok(()) => {
                self.record_success(
                    task.id(),
                    DigestEvent::Processed {
                        task: task.name().to_string(),
                        autonomy: task.autonomy,
                    },
                );
                DispatchOutcome::Completed
            }
            Err(err) => {
                let text = format!("{err:#}");
                let event = DigestEvent::Error {
                    task: task.name().to_string(),
                    error: truncate_chars(&text, ERROR_EVENT_CHARS).to_string(),
                };
                let backoff = self.record_failure(task.id(), &text, Some(event));
                error!(
                    task = task.name(),
                    err = %text,
                    backoff_secs = backoff.as_secs(),
                    "agent failed on task"
                );
                DispatchOutcome::Failed
            }
        }
    }

    async fn run_new_task(&self, task: &Task, agent: &dyn Agent) -> Result<()> {
        let context = self.prompts.render_new_task(task)?;
        let response = agent.respond(task, &context).await?;
        let dialogs = DialogManager::new(&self.client);

        let (message, status) = match task.autonomy {
            Autonomy::Green => (response, TaskStatus::Done),
            Autonomy::Yellow => (response, TaskStatus::Review),
            Autonomy::Red => (
                format!("{DECISION_PREAMBLE}\n{response}"),
                TaskStatus::Blocked,
            ),
        };
        dialogs.agent_start(task.id(), &message).await?;

        let name = set_tag(task.name(), "status", status.as_str());
        self.client
            .edit_item(task.id(), Some(&name), None)
            .await
            .with_context(|| format!("retag {} as {status}", task.id()))?;

        if task.autonomy == Autonomy::Green {
            self.client
                .complete_item(task.id())
                .await
                .with_context(|| format!("complete {}", task.id()))?;
        }
        info!(status = %status, "task written back");
        Ok(())
    }

    /// Answer a dialog waiting on the agent, extending its deepest branch.
    ///
    /// Failures back off like new tasks but add no digest entry.
    #[instrument(skip_all, fields(task_id = %dialog.task_id))]
    pub async fn process_dialog(&self, dialog: Dialog) -> DispatchOutcome {
        let _guard = match self.claim(&dialog.task_id) {
            Ok(guard) => guard,
            Err(skipped) => {
                debug!(outcome = ?skipped, "skipping dialog");
                return skipped;
            }
        };

        let node = match self.client.get_item(&dialog.task_id).await {
            Ok(node) => node,
            Err(err) => {
                let text = format!("{err:#}");
                let backoff = self.record_failure(&dialog.task_id, &text, None);
                warn!(err = %text, backoff_secs = backoff.as_secs(), "could not re-read dialog task");
                return DispatchOutcome::Failed;
            }
        };
        let task = Task::from_node(node, &self.rules).with_dialog(dialog.clone());

        let Some((agent_name, agent)) = self.agents.select_for(&task) else {
            warn!(task = task.name(), "no agent available for dialog");
            return DispatchOutcome::NoAgent;
        };
        info!(task = %dialog.task_name, agent = %agent_name, "processing dialog reply");

        match self.run_dialog(&task, &dialog, agent.as_ref()).await {
            Ok(()) => {
                self.record_success(
                    &dialog.task_id,
                    DigestEvent::DialogReply {
                        task: dialog.task_name.clone(),
                    },
                );
                DispatchOutcome::Completed
            }
            Err(err) => {
                let text = format!("{err:#}");
                let backoff = self.record_failure(&dialog.task_id, &text, None);
                error!(
                    task = %dialog.task_name,
                    err = %text,
                    backoff_secs = backoff.as_secs(),
                    "agent dialog reply failed"
                );
                DispatchOutcome::Failed
            }
        }
    }

    async fn run_dialog(&self, task: &Task, dialog: &Dialog, agent: &dyn Agent) -> Result<()> {
        let context = self.prompts.render_dialog_reply(dialog)?;
        let response = agent.respond(task, &context).await?;
        DialogManager::new(&self.client)
            .agent_reply(dialog, &response, None)
            .await?;
        Ok(())
    }

    /// Render and clear the accumulated digest events.
    pub fn generate_digest(&self) -> String {
        let events = std::mem::take(&mut self.lock().events);
        render_digest(&events, Local::now().naive_local(), self.config.stale_hours)
    }

    /// Write the digest as a new node at the top of the digest node.
    ///
    /// Without a configured digest node nothing is written and the events
    /// are kept. If the write fails the events are restored.
    #[instrument(skip_all)]
    pub async fn write_digest(&self) -> Result<Option<String>> {
        let Some(digest_node) = self.config.digest_node_id.as_deref() else {
            warn!("no digest node configured, keeping digest events");
            return Ok(None);
        };

        let events = std::mem::take(&mut self.lock().events);
        let digest = render_digest(&events, Local::now().naive_local(), self.config.stale_hours);
        let title = digest.lines().next().unwrap_or_default();

        if let Err(err) = self
            .client
            .create_item(digest_node, title, Some(&digest), Position::Top)
            .await
        {
            let mut state = self.lock();
            let newer = std::mem::replace(&mut state.events, events);
            state.events.extend(newer);
            return Err(err).with_context(|| format!("write digest under {digest_node}"));
        }
        info!(digest_node, "digest written");
        Ok(Some(digest))
    }

    /// Tick until interrupted with Ctrl-C.
    pub async fn run_forever(&self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(err = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
        Ok(())
    }

    /// Tick every poll interval until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between ticks. Tick failures are logged
    /// and never end the loop.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            backlog = %self.config.backlog_node_id,
            "orchestrator starting"
        );
        tokio::pin!(shutdown);
        loop {
            match self.tick().await {
                Ok(report) => debug!(?report, "tick report"),
                Err(err) => error!(err = %format!("{err:#}"), "tick failed"),
            }

            let tick = self.tick_count();
            if let Some(every) = self.config.digest_every_ticks
                && every > 0
                && tick % every == 0
                && let Err(err) = self.write_digest().await
            {
                error!(err = %format!("{err:#}"), "digest write failed");
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                () = &mut shutdown => {
                    info!(ticks = tick, "orchestrator stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::agents::AgentError;
    use crate::test_support::{MemoryTree, ScriptedAgent, message_node, node, node_named};

    fn engine(tree: MemoryTree, agent: ScriptedAgent) -> (Orchestrator<MemoryTree>, Arc<ScriptedAgent>) {
        let agent = Arc::new(agent);
        let mut registry = AgentRegistry::new();
        registry.register("default", agent.clone());
        let orchestrator = Orchestrator::new(
            EngineConfig::new("backlog"),
            tree,
            registry,
            AutonomyRules::default(),
        )
        .expect("engine");
        (orchestrator, agent)
    }

    fn backlog_with(names: &[(&str, &str)]) -> MemoryTree {
        let tree = MemoryTree::new();
        tree.insert(None, node("backlog", 0));
        for (idx, (id, name)) in names.iter().enumerate() {
            tree.insert(Some("backlog"), node_named(id, idx as i64, name));
        }
        tree
    }

    fn task(orchestrator: &Orchestrator<MemoryTree>, id: &str) -> Task {
        let node = orchestrator.client().get(id).expect("seeded");
        Task::from_node(node, &AutonomyRules::default())
    }

    #[tokio::test]
    async fn concurrent_dispatch_for_same_id_is_skipped() {
        let gate = Arc::new(Notify::new());
        let tree = backlog_with(&[("t1", "черновик поста #agent")]);
        let (orchestrator, agent) = engine(tree, ScriptedAgent::replying("draft").gated(gate.clone()));
        let t = task(&orchestrator, "t1");

        let (first, second, ()) = tokio::join!(
            orchestrator.process_new_task(t.clone()),
            orchestrator.process_new_task(t.clone()),
            async { gate.notify_one() },
        );

        assert_eq!(first, DispatchOutcome::Completed);
        assert_eq!(second, DispatchOutcome::SkippedInFlight);
        assert_eq!(agent.calls().len(), 1);
        assert!(!orchestrator.is_in_flight("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_backs_off_sixty_seconds() {
        let tree = backlog_with(&[("t1", "написать тесты #agent")]);
        let (orchestrator, _agent) = engine(
            tree,
            ScriptedAgent::replying("ok").then(Err(AgentError::from_status(429, "too many"))),
        );
        let t = task(&orchestrator, "t1");

        let started = Instant::now();
        assert_eq!(orchestrator.process_new_task(t.clone()).await, DispatchOutcome::Failed);
        assert!(!orchestrator.is_in_flight("t1"));
        let retry_after = orchestrator.retry_after("t1").expect("backoff set");
        assert_eq!(retry_after - started, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(
            orchestrator.process_new_task(t.clone()).await,
            DispatchOutcome::SkippedBackoff
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.process_new_task(t).await, DispatchOutcome::Completed);
        assert!(orchestrator.retry_after("t1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_back_off_thirty_seconds() {
        let tree = backlog_with(&[("t1", "написать тесты #agent")]);
        let (orchestrator, _agent) = engine(
            tree,
            ScriptedAgent::replying("ok").then(Err(AgentError::Timeout(Duration::from_secs(120)))),
        );
        let started = Instant::now();
        orchestrator.process_new_task(task(&orchestrator, "t1")).await;
        let retry_after = orchestrator.retry_after("t1").expect("backoff set");
        assert_eq!(retry_after - started, Duration::from_secs(30));

        let events = orchestrator.events();
        assert_eq!(
            events,
            vec![DigestEvent::Error {
                task: "написать тесты #agent".to_string(),
                error: "timed out after 120s".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn tree_write_failure_counts_as_dispatch_failure() {
        let tree = backlog_with(&[("t1", "написать тесты #agent")]);
        tree.fail("edit_item", "t1");
        let (orchestrator, _agent) = engine(tree, ScriptedAgent::replying("done"));

        let outcome = orchestrator.process_new_task(task(&orchestrator, "t1")).await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert!(orchestrator.retry_after("t1").is_some());
        assert!(!orchestrator.is_in_flight("t1"));
        let Some(DigestEvent::Error { error, .. }) = orchestrator.events().pop() else {
            panic!("expected error event");
        };
        assert!(error.contains("retag t1"), "{error}");
    }

    #[tokio::test]
    async fn missing_agent_releases_claim_without_event() {
        let tree = backlog_with(&[("t1", "задача #agent")]);
        let orchestrator = Orchestrator::new(
            EngineConfig::new("backlog"),
            tree,
            AgentRegistry::new(),
            AutonomyRules::default(),
        )
        .expect("engine");

        let outcome = orchestrator.process_new_task(task(&orchestrator, "t1")).await;
        assert_eq!(outcome, DispatchOutcome::NoAgent);
        assert!(!orchestrator.is_in_flight("t1"));
        assert!(orchestrator.events().is_empty());
        assert!(orchestrator.retry_after("t1").is_none());
    }

    #[tokio::test]
    async fn dialog_failure_backs_off_silently() {
        let tree = backlog_with(&[("t1", "Онбординг")]);
        tree.insert(Some("t1"), message_node("m1", 0, "👤 what next?", vec![]));
        let (orchestrator, _agent) = engine(
            tree,
            ScriptedAgent::replying("ok").then(Err(AgentError::EmptyResponse)),
        );
        let dialog = DialogManager::new(orchestrator.client())
            .read_dialog("t1", 5)
            .await
            .expect("read");

        assert_eq!(orchestrator.process_dialog(dialog).await, DispatchOutcome::Failed);
        assert!(orchestrator.retry_after("t1").is_some());
        assert!(orchestrator.events().is_empty());
        assert!(orchestrator.client().created().is_empty());
    }

    #[tokio::test]
    async fn new_task_is_not_answered_twice_in_one_tick() {
        let tree = backlog_with(&[("t1", "код ревью #agent")]);
        tree.insert(Some("t1"), message_node("m1", 0, "👤 please start", vec![]));
        let (orchestrator, agent) = engine(tree, ScriptedAgent::replying("started"));

        let report = orchestrator.tick().await.expect("tick");
        assert_eq!(report.new_tasks, 1);
        assert_eq!(report.pending_dialogs, 0);
        assert_eq!(agent.calls().len(), 1);
    }

    #[tokio::test]
    async fn backlog_scan_failure_aborts_tick() {
        let tree = backlog_with(&[]);
        tree.fail("list_children", "backlog");
        let (orchestrator, _agent) = engine(tree, ScriptedAgent::replying("x"));
        let err = orchestrator.tick().await.expect_err("scan fails");
        assert!(format!("{err:#}").contains("scan backlog backlog"));
        assert_eq!(orchestrator.tick_count(), 1);
    }

    #[tokio::test]
    async fn write_digest_without_node_keeps_events() {
        let tree = backlog_with(&[("t1", "написать тесты #agent")]);
        let (orchestrator, _agent) = engine(tree, ScriptedAgent::replying("done"));
        orchestrator.tick().await.expect("tick");

        assert_eq!(orchestrator.write_digest().await.expect("write"), None);
        assert_eq!(orchestrator.events().len(), 1);
    }

    #[tokio::test]
    async fn failed_digest_write_restores_events() {
        let tree = backlog_with(&[("t1", "написать тесты #agent")]);
        tree.insert(None, node("digest", 1));
        tree.fail("create_item", "digest");
        let agent = Arc::new(ScriptedAgent::replying("done"));
        let mut registry = AgentRegistry::new();
        registry.register("default", agent);
        let mut config = EngineConfig::new("backlog");
        config.digest_node_id = Some("digest".to_string());
        let orchestrator =
            Orchestrator::new(config, tree, registry, AutonomyRules::default()).expect("engine");

        orchestrator.tick().await.expect("tick");
        assert!(orchestrator.write_digest().await.is_err());
        assert_eq!(orchestrator.events().len(), 1);

        orchestrator.client().clear_failures();
        let digest = orchestrator.write_digest().await.expect("write").expect("written");
        assert!(digest.contains("🟢 Auto-completed: 1"));
        assert!(orchestrator.events().is_empty());
        let created = orchestrator.client().created();
        let written = created.last().expect("digest node");
        assert_eq!(written.parent_id, "digest");
        assert_eq!(written.position, Position::Top);
        assert!(written.name.starts_with("📊 Digest"));
        assert_eq!(written.note.as_deref(), Some(digest.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_ticks_each_interval_and_stops() {
        let tree = backlog_with(&[]);
        let (orchestrator, _agent) = engine(tree, ScriptedAgent::replying("x"));
        let interval = orchestrator.config().poll_interval;

        orchestrator
            .run_until(tokio::time::sleep(interval * 2 + Duration::from_secs(1)))
            .await;
        assert_eq!(orchestrator.tick_count(), 3);
    }
}
