//! Fractal dialog model: nested message forests rebuilt from tree nodes.
//!
//! A dialog is a forest of messages hanging off a task node. Replies nest under
//! the message they answer, so the most recent message is always the deepest
//! leaf reached by following the last child from the last top-level message.

use chrono::{DateTime, Utc};

use crate::core::types::{DialogState, Speaker};
use crate::tree::Node;

const RESOLUTION_MARKERS: [&str; 2] = ["#resolved", "#done"];
const ESCALATION_MARKERS: [&str; 2] = ["#escalated", "#red"];

/// One message in a dialog; owns its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogMessage {
    pub node_id: String,
    pub speaker: Speaker,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub children: Vec<DialogMessage>,
}

impl DialogMessage {
    /// Follow the last child until reaching a leaf.
    pub fn deepest_leaf(&self) -> &DialogMessage {
        let mut current = self;
        while let Some(last) = current.children.last() {
            current = last;
        }
        current
    }

    /// Find a message by node id anywhere under (and including) this one.
    pub fn find(&self, node_id: &str) -> Option<&DialogMessage> {
        if self.node_id == node_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(node_id))
    }
}

/// A conversation thread rooted at a task node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub task_id: String,
    pub task_name: String,
    pub messages: Vec<DialogMessage>,
    pub state: DialogState,
}

impl Dialog {
    /// Build a dialog from the task's subtree, keeping only speaker-marked nodes.
    pub fn from_subtree(task_id: &str, task_name: &str, subtree: &[Node]) -> Self {
        let messages = parse_messages(subtree);
        let state = determine_state(&messages);
        Self {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            messages,
            state,
        }
    }

    /// The most recent message: deepest leaf of the last top-level branch.
    pub fn last_message(&self) -> Option<&DialogMessage> {
        self.messages.last().map(DialogMessage::deepest_leaf)
    }

    pub fn last_speaker(&self) -> Option<Speaker> {
        self.last_message().map(|msg| msg.speaker)
    }

    /// Depth-first flatten in chronological order.
    pub fn full_thread(&self) -> Vec<&DialogMessage> {
        let mut out = Vec::new();
        for msg in &self.messages {
            flatten(msg, &mut out);
        }
        out
    }

    pub fn find(&self, node_id: &str) -> Option<&DialogMessage> {
        self.messages.iter().find_map(|msg| msg.find(node_id))
    }

    /// Indented transcript, two spaces per nesting level, one message per line.
    pub fn context_for_agent(&self) -> String {
        let mut lines = Vec::new();
        for msg in &self.messages {
            format_thread(msg, 0, &mut lines);
        }
        lines.join("\n")
    }

    /// True when the last message is older than `stale_hours` at `now`.
    ///
    /// Dialogs whose last message has no timestamp are never stale.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_hours: f64) -> bool {
        let Some(created_at) = self.last_message().and_then(|msg| msg.created_at) else {
            return false;
        };
        let age_hours = (now - created_at).num_seconds() as f64 / 3600.0;
        age_hours > stale_hours
    }
}

/// True if any of `nodes` carries a speaker marker.
pub fn has_dialog_nodes(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .any(|node| Speaker::split_marker(&node.name).is_some())
}

/// Convert a node forest into messages, dropping unmarked nodes at every level.
pub fn parse_messages(nodes: &[Node]) -> Vec<DialogMessage> {
    nodes
        .iter()
        .filter_map(|node| {
            let (speaker, text) = Speaker::split_marker(&node.name)?;
            Some(DialogMessage {
                node_id: node.id.clone(),
                speaker,
                text: text.to_string(),
                created_at: node.created_at,
                children: parse_messages(&node.children),
            })
        })
        .collect()
}

/// Compute whose turn it is from the most recent message.
pub fn determine_state(messages: &[DialogMessage]) -> DialogState {
    let Some(last) = messages.last() else {
        return DialogState::AwaitingAgent;
    };
    let leaf = last.deepest_leaf();

    let text = leaf.text.to_lowercase();
    if RESOLUTION_MARKERS.iter().any(|marker| text.contains(marker)) {
        return DialogState::Resolved;
    }
    if ESCALATION_MARKERS.iter().any(|marker| text.contains(marker)) {
        return DialogState::Escalated;
    }

    match leaf.speaker {
        Speaker::Agent => DialogState::AwaitingHuman,
        Speaker::Human | Speaker::System => DialogState::AwaitingAgent,
    }
}

fn flatten<'a>(msg: &'a DialogMessage, out: &mut Vec<&'a DialogMessage>) {
    out.push(msg);
    for child in &msg.children {
        flatten(child, out);
    }
}

fn format_thread(msg: &DialogMessage, indent: usize, lines: &mut Vec<String>) {
    lines.push(format!(
        "{}{} {}",
        "  ".repeat(indent),
        msg.speaker.marker(),
        msg.text
    ));
    for child in &msg.children {
        format_thread(child, indent + 1, lines);
    }
}
