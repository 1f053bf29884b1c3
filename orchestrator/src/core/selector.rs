//! Deterministic selection of work items and agents.

use crate::core::task::Task;
use crate::core::types::{Assignee, TaskStatus};

/// Registry name used when a task carries no routing tag.
pub const DEFAULT_AGENT: &str = "default";

/// True for tasks the engine should pick up as new work.
pub fn is_new_agent_task(task: &Task) -> bool {
    task.assignee == Assignee::Agent && task.status == TaskStatus::Backlog
}

/// Keep new-work candidates, preserving tree order.
pub fn new_task_candidates(tasks: Vec<Task>) -> Vec<Task> {
    tasks.into_iter().filter(is_new_agent_task).collect()
}

/// Pick the registry name to dispatch `task_name` to.
///
/// Scans `names` in registry order and returns the first whose `#<name>` tag
/// appears in the task text, else [`DEFAULT_AGENT`] if registered.
pub fn route_agent<'a, I>(task_name: &str, names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let text = task_name.to_lowercase();
    let mut has_default = false;
    for name in names {
        if name == DEFAULT_AGENT {
            has_default = true;
            continue;
        }
        if text.contains(&format!("#{}", name.to_lowercase())) {
            return Some(name);
        }
    }
    has_default.then_some(DEFAULT_AGENT)
}
