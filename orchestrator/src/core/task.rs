//! Parsed view of a task node.

use regex::Regex;

use crate::core::classifier::AutonomyRules;
use crate::core::dialog::Dialog;
use crate::core::types::{Assignee, Autonomy, TaskStatus};
use crate::tree::Node;

/// A task node with status, assignee and autonomy tier resolved from its text.
///
/// Built fresh from a node snapshot on every scan and never written back as a
/// whole; only tag edits reach the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub node: Node,
    pub status: TaskStatus,
    pub assignee: Assignee,
    pub autonomy: Autonomy,
    pub dialog: Option<Dialog>,
}

impl Task {
    pub fn from_node(node: Node, rules: &AutonomyRules) -> Self {
        let text = format!(
            "{} {}",
            node.name.to_lowercase(),
            node.note.as_deref().unwrap_or_default().to_lowercase()
        );
        let status = parse_status(&text);
        let assignee = parse_assignee(&text);
        let autonomy = rules.classify(&node.name, node.note.as_deref());

        Self {
            node,
            status,
            assignee,
            autonomy,
            dialog: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn note(&self) -> Option<&str> {
        self.node.note.as_deref()
    }

    pub fn with_dialog(mut self, dialog: Dialog) -> Self {
        self.dialog = Some(dialog);
        self
    }
}

/// First status (in enumeration order) whose `#status:<v>` or `#<v>` tag is present.
fn parse_status(text: &str) -> TaskStatus {
    TaskStatus::ALL
        .into_iter()
        .find(|status| {
            let value = status.as_str();
            text.contains(&format!("#status:{value}")) || text.contains(&format!("#{value}"))
        })
        .unwrap_or(TaskStatus::Backlog)
}

fn parse_assignee(text: &str) -> Assignee {
    if text.contains("#agent") || text.contains("#dev-agent") {
        Assignee::Agent
    } else if text.contains("#human") {
        Assignee::Human
    } else {
        Assignee::Unassigned
    }
}

/// Replace an existing `#key:<value>` tag in `name`, or append one.
pub fn set_tag(name: &str, key: &str, value: &str) -> String {
    let replacement = format!("#{key}:{value}");
    let pattern = format!(r"#\s*{}:\S+", regex::escape(key));
    match Regex::new(&pattern) {
        Ok(re) if re.is_match(name) => re.replace_all(name, replacement.as_str()).into_owned(),
        _ => format!("{name} {replacement}"),
    }
}
