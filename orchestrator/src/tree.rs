use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of one outliner node.
///
/// `children` is only populated by subtree fetches; `list_children` returns
/// nodes with an empty child list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub note: Option<String>,
    pub priority: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Sort children by `(priority, id)`, recursively.
    pub fn sort_children(&mut self) {
        sort_nodes(&mut self.children);
    }
}

/// Sort a sibling list by `(priority, id)`, recursively.
pub fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    for node in nodes {
        node.sort_children();
    }
}

/// Where a newly created node lands among its siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    Bottom,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Position::Top => "top",
            Position::Bottom => "bottom",
        }
    }
}
