//! End-to-end tick scenarios against the in-memory tree.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use orchestrator::agents::{AgentError, AgentRegistry};
use orchestrator::core::classifier::AutonomyRules;
use orchestrator::core::digest::{DigestEvent, NOTHING_NEW};
use orchestrator::core::types::{Autonomy, DialogState, Speaker};
use orchestrator::dialog::DialogManager;
use orchestrator::engine::{EngineConfig, Orchestrator};
use orchestrator::test_support::{Edit, MemoryTree, ScriptedAgent, message_node, node, node_named};
use tokio::sync::Notify;
use tokio::time::Instant;

fn backlog(tasks: &[(&str, &str)]) -> MemoryTree {
    let tree = MemoryTree::new();
    tree.insert(None, node("backlog", 0));
    for (idx, (id, name)) in tasks.iter().enumerate() {
        tree.insert(Some("backlog"), node_named(id, idx as i64, name));
    }
    tree
}

fn orchestrator(tree: MemoryTree, agent: Arc<ScriptedAgent>) -> Orchestrator<MemoryTree> {
    let mut agents = AgentRegistry::new();
    agents.register("default", agent);
    Orchestrator::new(
        EngineConfig::new("backlog"),
        tree,
        agents,
        AutonomyRules::default(),
    )
    .expect("orchestrator")
}

#[tokio::test]
async fn green_task_is_completed() {
    let agent = Arc::new(ScriptedAgent::replying("Tests written: 12 cases."));
    let orch = orchestrator(backlog(&[("t1", "написать тесты #agent")]), agent.clone());

    let report = orch.tick().await.expect("tick");
    assert_eq!(report.new_tasks, 1);
    assert_eq!(report.completed, 1);

    let tree = orch.client();
    let task = tree.get("t1").expect("task");
    assert_eq!(task.name, "написать тесты #agent #status:done");
    assert!(task.is_completed());
    assert_eq!(
        tree.edits(),
        vec![Edit {
            id: "t1".to_string(),
            name: Some("написать тесты #agent #status:done".to_string()),
            note: None,
        }]
    );
    assert_eq!(tree.completed(), vec!["t1".to_string()]);

    let thread = tree.children_of("t1");
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].name, "🤖 Tests written: 12 cases.");

    assert_eq!(agent.calls()[0].context, "Task: написать тесты #agent");
    assert_eq!(
        orch.events(),
        vec![DigestEvent::Processed {
            task: "написать тесты #agent".to_string(),
            autonomy: Autonomy::Green,
        }]
    );
}

#[tokio::test]
async fn yellow_task_goes_to_review() {
    let agent = Arc::new(ScriptedAgent::replying("Draft attached."));
    let orch = orchestrator(
        backlog(&[("t1", "черновик рассылки #agent #status:backlog")]),
        agent,
    );

    orch.tick().await.expect("tick");

    let tree = orch.client();
    let task = tree.get("t1").expect("task");
    assert_eq!(task.name, "черновик рассылки #agent #status:review");
    assert!(!task.is_completed());
    assert!(tree.completed().is_empty());
    let edits = tree.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].name.as_deref(), Some("черновик рассылки #agent #status:review"));
}

#[tokio::test]
async fn red_task_asks_for_decision() {
    let agent = Arc::new(ScriptedAgent::replying("Release notes and rollback plan."));
    let orch = orchestrator(backlog(&[("t1", "задеплоить #agent")]), agent);

    orch.tick().await.expect("tick");

    let tree = orch.client();
    let task = tree.get("t1").expect("task");
    assert_eq!(task.name, "задеплоить #agent #status:blocked");
    assert!(!task.is_completed());
    assert!(tree.completed().is_empty());

    let thread = tree.children_of("t1");
    assert_eq!(
        thread[0].name,
        "🤖 Prepared the material. Needs your decision:\nRelease notes and rollback plan."
    );
    assert_eq!(
        orch.events(),
        vec![DigestEvent::Processed {
            task: "задеплоить #agent".to_string(),
            autonomy: Autonomy::Red,
        }]
    );

    // The decision request is now the human's turn.
    let dialog = DialogManager::new(tree).read_dialog("t1", 5).await.expect("read");
    assert_eq!(dialog.state, DialogState::AwaitingHuman);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_agent_backs_off_a_minute() {
    let agent = Arc::new(
        ScriptedAgent::replying("ok").then(Err(AgentError::from_status(429, "rate limit reached"))),
    );
    let orch = orchestrator(backlog(&[("t1", "написать тесты #agent")]), agent.clone());

    let started = Instant::now();
    let report = orch.tick().await.expect("tick");
    assert_eq!(report.failed, 1);

    let retry_after = orch.retry_after("t1").expect("backoff");
    assert_eq!(retry_after - started, Duration::from_secs(60));
    let events = orch.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], DigestEvent::Error { task, error }
        if task == "написать тесты #agent" && error.contains("rate limit")));

    // Still backing off on the next tick.
    let report = orch.tick().await.expect("tick");
    assert_eq!(report.skipped, 1);
    assert_eq!(agent.calls().len(), 1);

    tokio::time::advance(Duration::from_secs(60)).await;
    let report = orch.tick().await.expect("tick");
    assert_eq!(report.completed, 1);
    assert_eq!(agent.calls().len(), 2);
}

#[tokio::test]
async fn digest_drains_events() {
    let agent = Arc::new(ScriptedAgent::replying("done"));
    let orch = orchestrator(backlog(&[("t1", "написать тесты #agent")]), agent);
    orch.tick().await.expect("tick");

    let first = orch.generate_digest();
    assert!(first.starts_with("📊 Digest — "));
    assert!(first.contains("🟢 Auto-completed: 1\n  • написать тесты #agent"));

    assert_eq!(orch.generate_digest(), NOTHING_NEW);
}

#[tokio::test]
async fn human_reply_gets_answer_on_deepest_branch() {
    let tree = backlog(&[("t1", "Онбординг #agent #status:in-progress")]);
    tree.insert(
        Some("t1"),
        message_node(
            "m1",
            0,
            "🤖 three onboarding variants",
            vec![message_node("m2", 0, "👤 B, max 3 questions", vec![])],
        ),
    );
    let agent = Arc::new(ScriptedAgent::replying("Buttons or free text?"));
    let orch = orchestrator(tree, agent.clone());

    let report = orch.tick().await.expect("tick");
    assert_eq!(report.new_tasks, 0);
    assert_eq!(report.pending_dialogs, 1);
    assert_eq!(report.completed, 1);

    let created = orch.client().created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].parent_id, "m2");
    assert_eq!(created[0].name, "🤖 Buttons or free text?");

    let context = &agent.calls()[0].context;
    assert!(context.contains("Dialog history:\n🤖 three onboarding variants\n  👤 B, max 3 questions"));
    assert!(context.ends_with("Respond to the human's latest message."));
    assert_eq!(
        orch.events(),
        vec![DigestEvent::DialogReply {
            task: "Онбординг #agent #status:in-progress".to_string(),
        }]
    );

    // The agent spoke last, so the next tick leaves the dialog alone.
    let report = orch.tick().await.expect("tick");
    assert_eq!(report.pending_dialogs, 0);
    assert_eq!(agent.calls().len(), 1);
}

#[tokio::test]
async fn tagged_agent_is_selected_over_default() {
    let default = Arc::new(ScriptedAgent::replying("default"));
    let comms = Arc::new(ScriptedAgent::replying("comms"));
    let mut agents = AgentRegistry::new();
    agents.register("default", default.clone());
    agents.register("comms-agent", comms.clone());
    let orch = Orchestrator::new(
        EngineConfig::new("backlog"),
        backlog(&[("t1", "черновик письма партнёру #agent #comms-agent")]),
        agents,
        AutonomyRules::default(),
    )
    .expect("orchestrator");

    orch.tick().await.expect("tick");
    assert!(default.calls().is_empty());
    assert_eq!(comms.calls().len(), 1);
}

#[tokio::test]
async fn unreadable_task_does_not_stop_the_tick() {
    let tree = backlog(&[("a", "Онбординг"), ("b", "Лендинг")]);
    tree.insert(Some("a"), message_node("a1", 0, "👤 ping", vec![]));
    tree.insert(Some("b"), message_node("b1", 0, "👤 ping", vec![]));
    tree.fail("list_children", "a");
    let agent = Arc::new(ScriptedAgent::replying("pong"));
    let orch = orchestrator(tree, agent.clone());

    let report = orch.tick().await.expect("tick");
    assert_eq!(report.pending_dialogs, 1);
    assert_eq!(agent.calls()[0].task_id, "b");
}

#[tokio::test]
async fn stale_dialog_is_reported_once() {
    let tree = backlog(&[("t1", "Лендинг #status:in-progress")]);
    let mut question = message_node("m1", 0, "🤖 which hero image?", vec![]);
    question.created_at = Some(Utc::now() - chrono::Duration::hours(30));
    tree.insert(Some("t1"), question);
    let agent = Arc::new(ScriptedAgent::replying("unused"));
    let orch = orchestrator(tree, agent.clone());

    let report = orch.tick().await.expect("tick");
    assert_eq!(report.stale, 1);
    assert_eq!(report.pending_dialogs, 0);
    assert!(agent.calls().is_empty());
    assert_eq!(
        orch.events(),
        vec![DigestEvent::Stale {
            task: "Лендинг #status:in-progress".to_string(),
            task_id: "t1".to_string(),
            last_speaker: Some(Speaker::Agent),
        }]
    );

    // Still stale on the next tick, but the undrained entry is not repeated.
    let report = orch.tick().await.expect("tick");
    assert_eq!(report.stale, 1);
    assert_eq!(orch.events().len(), 1);

    orch.generate_digest();
    orch.tick().await.expect("tick");
    assert_eq!(orch.events().len(), 1);
}

#[tokio::test]
async fn different_tasks_dispatch_concurrently() {
    let default_gate = Arc::new(Notify::new());
    let comms_gate = Arc::new(Notify::new());
    let default = Arc::new(ScriptedAgent::replying("post").gated(default_gate.clone()));
    let comms = Arc::new(ScriptedAgent::replying("letter").gated(comms_gate.clone()));
    let mut agents = AgentRegistry::new();
    agents.register("default", default.clone());
    agents.register("comms-agent", comms.clone());
    let orch = Orchestrator::new(
        EngineConfig::new("backlog"),
        backlog(&[
            ("t1", "черновик поста #agent"),
            ("t2", "черновик письма #agent #comms-agent"),
        ]),
        agents,
        AutonomyRules::default(),
    )
    .expect("orchestrator");

    let release = async {
        let both_called = tokio::time::timeout(Duration::from_secs(5), async {
            while default.calls().is_empty() || comms.calls().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        let both_in_flight = orch.is_in_flight("t1") && orch.is_in_flight("t2");
        default_gate.notify_one();
        comms_gate.notify_one();
        both_called.is_ok() && both_in_flight
    };
    let (report, overlapped) = tokio::join!(orch.tick(), release);

    assert!(overlapped, "both agents should be waiting at the same time");
    let report = report.expect("tick");
    assert_eq!(report.completed, 2);
    assert!(!orch.is_in_flight("t1"));
    assert!(!orch.is_in_flight("t2"));
}
