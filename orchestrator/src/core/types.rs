//! Shared deterministic types for orchestrator core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a dialog message, encoded as the leading glyph of the node text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    Agent,
    Human,
    System,
}

impl Speaker {
    pub const ALL: [Speaker; 3] = [Speaker::Agent, Speaker::Human, Speaker::System];

    pub fn marker(self) -> &'static str {
        match self {
            Speaker::Agent => "🤖",
            Speaker::Human => "👤",
            Speaker::System => "⚙️",
        }
    }

    /// Detect the speaker marker at the start of `text` (after trimming).
    ///
    /// Returns the speaker and the remaining text with the marker and
    /// surrounding whitespace removed.
    pub fn split_marker(text: &str) -> Option<(Speaker, &str)> {
        let trimmed = text.trim();
        for speaker in Self::ALL {
            if let Some(rest) = trimmed.strip_prefix(speaker.marker()) {
                return Some((speaker, rest.trim()));
            }
        }
        // Bare gear without the emoji variation selector.
        trimmed
            .strip_prefix('⚙')
            .map(|rest| (Speaker::System, rest.trim()))
    }

    /// Prefix `text` with this speaker's marker.
    pub fn format(self, text: &str) -> String {
        format!("{} {}", self.marker(), text)
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Who owes the next reply in a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    AwaitingHuman,
    AwaitingAgent,
    Resolved,
    Escalated,
}

/// Human oversight tier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Autonomy {
    /// Agent executes; no review needed.
    Green,
    /// Agent executes; result goes to review.
    Yellow,
    /// Agent prepares material; a human decides.
    Red,
}

impl Autonomy {
    pub fn as_str(self) -> &'static str {
        match self {
            Autonomy::Green => "green",
            Autonomy::Yellow => "yellow",
            Autonomy::Red => "red",
        }
    }
}

impl fmt::Display for Autonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task workflow status, carried as a `#status:<value>` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Backlog,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl TaskStatus {
    /// Fixed scan order used when parsing tags.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Backlog,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assignee {
    Agent,
    Human,
    Unassigned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_marker_strips_glyph_and_whitespace() {
        assert_eq!(
            Speaker::split_marker("  🤖  hello "),
            Some((Speaker::Agent, "hello"))
        );
        assert_eq!(
            Speaker::split_marker("👤 reply"),
            Some((Speaker::Human, "reply"))
        );
        assert_eq!(
            Speaker::split_marker("⚙️ note"),
            Some((Speaker::System, "note"))
        );
        assert_eq!(Speaker::split_marker("⚙ bare"), Some((Speaker::System, "bare")));
    }

    #[test]
    fn split_marker_rejects_unmarked_text() {
        assert_eq!(Speaker::split_marker("plain annotation"), None);
        assert_eq!(Speaker::split_marker("text 🤖 later"), None);
    }

    #[test]
    fn format_prefixes_marker() {
        assert_eq!(Speaker::Agent.format("done"), "🤖 done");
    }
}
