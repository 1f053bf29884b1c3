//! Test helpers: node builders, an in-memory tree backend and scripted agents.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::agents::{Agent, AgentError};
use crate::core::task::Task;
use crate::io::tree_client::TreeClient;
use crate::tree::{Node, Position};

/// Create a deterministic node with default fields and no children.
pub fn node(id: &str, priority: i64) -> Node {
    node_named(id, priority, id)
}

/// Create a childless node with an explicit name.
pub fn node_named(id: &str, priority: i64, name: &str) -> Node {
    Node {
        id: id.to_string(),
        name: name.to_string(),
        note: None,
        priority,
        created_at: None,
        completed_at: None,
        children: Vec::new(),
    }
}

/// Create a node with children using deterministic defaults.
pub fn node_with_children(id: &str, priority: i64, children: Vec<Node>) -> Node {
    Node {
        children,
        ..node(id, priority)
    }
}

/// Create a dialog message node; `name` carries the speaker marker.
pub fn message_node(id: &str, priority: i64, name: &str, children: Vec<Node>) -> Node {
    Node {
        children,
        ..node_named(id, priority, name)
    }
}

/// Tree operation names accepted by [`MemoryTree::fail`].
pub const OPS: [&str; 5] = [
    "get_item",
    "list_children",
    "create_item",
    "edit_item",
    "complete_item",
];

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    parent: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: HashMap<String, Entry>,
    next_id: u64,
    failures: HashSet<(String, String)>,
    created: Vec<Created>,
    edits: Vec<Edit>,
    completed: Vec<String>,
}

/// A node created through [`TreeClient::create_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub parent_id: String,
    pub id: String,
    pub name: String,
    pub note: Option<String>,
    pub position: Position,
}

/// One [`TreeClient::edit_item`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub id: String,
    pub name: Option<String>,
    pub note: Option<String>,
}

/// In-memory outliner that records writes and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryTree {
    state: Mutex<MemoryState>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seed `node` (and its children, recursively) under `parent`.
    pub fn insert(&self, parent: Option<&str>, node: Node) {
        let mut state = self.lock();
        insert_entry(&mut state, parent, node);
    }

    /// Snapshot of a stored node without children.
    pub fn get(&self, id: &str) -> Option<Node> {
        self.lock().nodes.get(id).map(|entry| entry.node.clone())
    }

    /// Direct children of `id`, in priority order.
    pub fn children_of(&self, id: &str) -> Vec<Node> {
        children(&self.lock(), Some(id))
    }

    /// Make every later call of `op` on `id` fail (for `create_item`, `id` is the parent).
    pub fn fail(&self, op: &str, id: &str) {
        debug_assert!(OPS.contains(&op), "unknown op {op}");
        self.lock()
            .failures
            .insert((op.to_string(), id.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn created(&self) -> Vec<Created> {
        self.lock().created.clone()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.lock().edits.clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.lock().completed.clone()
    }

    fn check(state: &MemoryState, op: &str, id: &str) -> Result<()> {
        if state.failures.contains(&(op.to_string(), id.to_string())) {
            return Err(anyhow!("{op} {id}: injected failure"));
        }
        Ok(())
    }
}

fn insert_entry(state: &mut MemoryState, parent: Option<&str>, mut node: Node) {
    let children = std::mem::take(&mut node.children);
    let id = node.id.clone();
    state.nodes.insert(
        id.clone(),
        Entry {
            node,
            parent: parent.map(str::to_string),
        },
    );
    for child in children {
        insert_entry(state, Some(&id), child);
    }
}

fn children(state: &MemoryState, parent: Option<&str>) -> Vec<Node> {
    let mut out: Vec<Node> = state
        .nodes
        .values()
        .filter(|entry| entry.parent.as_deref() == parent)
        .map(|entry| entry.node.clone())
        .collect();
    out.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    out
}

#[async_trait]
impl TreeClient for MemoryTree {
    async fn get_item(&self, id: &str) -> Result<Node> {
        let state = self.lock();
        Self::check(&state, "get_item", id)?;
        state
            .nodes
            .get(id)
            .map(|entry| entry.node.clone())
            .ok_or_else(|| anyhow!("item {id} not found"))
    }

    async fn list_children(&self, parent_id: Option<&str>) -> Result<Vec<Node>> {
        let state = self.lock();
        if let Some(id) = parent_id {
            Self::check(&state, "list_children", id)?;
        }
        Ok(children(&state, parent_id))
    }

    async fn create_item(
        &self,
        parent_id: &str,
        name: &str,
        note: Option<&str>,
        position: Position,
    ) -> Result<String> {
        let mut state = self.lock();
        Self::check(&state, "create_item", parent_id)?;
        if !state.nodes.contains_key(parent_id) {
            return Err(anyhow!("parent {parent_id} not found"));
        }
        let siblings = children(&state, Some(parent_id));
        let priority = match position {
            Position::Top => siblings.first().map_or(0, |n| n.priority - 1),
            Position::Bottom => siblings.last().map_or(0, |n| n.priority + 1),
        };
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        let node = Node {
            id: id.clone(),
            name: name.to_string(),
            note: note.map(str::to_string),
            priority,
            created_at: Some(Utc::now()),
            completed_at: None,
            children: Vec::new(),
        };
        insert_entry(&mut state, Some(parent_id), node);
        state.created.push(Created {
            parent_id: parent_id.to_string(),
            id: id.clone(),
            name: name.to_string(),
            note: note.map(str::to_string),
            position,
        });
        Ok(id)
    }

    async fn edit_item(&self, id: &str, name: Option<&str>, note: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, "edit_item", id)?;
        let entry = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| anyhow!("item {id} not found"))?;
        if let Some(name) = name {
            entry.node.name = name.to_string();
        }
        if let Some(note) = note {
            entry.node.note = Some(note.to_string());
        }
        state.edits.push(Edit {
            id: id.to_string(),
            name: name.map(str::to_string),
            note: note.map(str::to_string),
        });
        Ok(())
    }

    async fn complete_item(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, "complete_item", id)?;
        let entry = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| anyhow!("item {id} not found"))?;
        entry.node.completed_at = Some(Utc::now());
        state.completed.push(id.to_string());
        Ok(())
    }
}

/// One recorded agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCall {
    pub task_id: String,
    pub context: String,
}

/// Agent that answers from a queue, then with a fixed reply.
///
/// With a gate set, every call waits for a notification before answering.
#[derive(Debug)]
pub struct ScriptedAgent {
    fallback: String,
    script: Mutex<VecDeque<Result<String, AgentError>>>,
    calls: Mutex<Vec<AgentCall>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedAgent {
    pub fn replying(reply: &str) -> Self {
        Self {
            fallback: reply.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Queue responses consumed before falling back to the fixed reply.
    pub fn then(self, response: Result<String, AgentError>) -> Self {
        lock(&self.script).push_back(response);
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        lock(&self.calls).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn respond(&self, task: &Task, context: &str) -> Result<String, AgentError> {
        lock(&self.calls).push(AgentCall {
            task_id: task.id().to_string(),
            context: context.to_string(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
