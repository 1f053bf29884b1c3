//! Dialog operations against the tree: reading threads, posting agent
//! messages, and scanning a backlog for dialogs that need attention.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::core::dialog::{Dialog, has_dialog_nodes};
use crate::core::types::{DialogState, Speaker};
use crate::io::tree_client::TreeClient;
use crate::tree::{Node, Position};

/// Reads and writes dialogs through a [`TreeClient`].
pub struct DialogManager<'a, C: TreeClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: TreeClient + ?Sized> DialogManager<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Read the dialog hanging off `task_id`, `depth` levels deep.
    #[instrument(skip(self))]
    pub async fn read_dialog(&self, task_id: &str, depth: usize) -> Result<Dialog> {
        let task = self
            .client
            .get_item(task_id)
            .await
            .with_context(|| format!("read task {task_id}"))?;
        let subtree = self
            .client
            .get_subtree(task_id, depth)
            .await
            .with_context(|| format!("read dialog under {task_id}"))?;
        Ok(Dialog::from_subtree(task_id, &task.name, &subtree))
    }

    /// Post an agent message as the last child of `reply_to`, else of the
    /// dialog's deepest leaf, else directly under the task.
    pub async fn agent_reply(
        &self,
        dialog: &Dialog,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String> {
        let parent_id = match reply_to {
            Some(id) => id,
            None => dialog
                .last_message()
                .map_or(dialog.task_id.as_str(), |msg| msg.node_id.as_str()),
        };
        self.post(parent_id, text).await
    }

    /// Start a new top-level agent thread under the task.
    pub async fn agent_start(&self, task_id: &str, text: &str) -> Result<String> {
        self.post(task_id, text).await
    }

    /// Reply under an earlier message, leaving the current leaf thread intact.
    pub async fn agent_branch(
        &self,
        dialog: &Dialog,
        branch_from_id: &str,
        text: &str,
    ) -> Result<String> {
        if dialog.find(branch_from_id).is_none() {
            debug!(
                task_id = %dialog.task_id,
                branch_from_id,
                "branching from a node outside the loaded dialog"
            );
        }
        self.post(branch_from_id, text).await
    }

    async fn post(&self, parent_id: &str, text: &str) -> Result<String> {
        self.client
            .create_item(parent_id, &Speaker::Agent.format(text), None, Position::Bottom)
            .await
            .with_context(|| format!("post agent message under {parent_id}"))
    }

    /// Dialogs under `parent_id` waiting for the agent, in child order.
    ///
    /// Completed children and children without top-level dialog messages are
    /// skipped; a child that cannot be read is logged and skipped.
    #[instrument(skip(self))]
    pub async fn find_pending_dialogs(&self, parent_id: &str, depth: usize) -> Result<Vec<Dialog>> {
        let mut pending = Vec::new();
        for (child, subtree) in self.scan(parent_id, depth).await? {
            if !has_dialog_nodes(&subtree) {
                continue;
            }
            let dialog = Dialog::from_subtree(&child.id, &child.name, &subtree);
            if dialog.state == DialogState::AwaitingAgent {
                pending.push(dialog);
            }
        }
        debug!(count = pending.len(), "pending dialogs");
        Ok(pending)
    }

    /// Dialogs under `parent_id` whose latest message is older than `stale_hours`.
    #[instrument(skip(self))]
    pub async fn find_stale_dialogs(
        &self,
        parent_id: &str,
        stale_hours: f64,
        depth: usize,
    ) -> Result<Vec<Dialog>> {
        let now = Utc::now();
        let stale: Vec<Dialog> = self
            .scan(parent_id, depth)
            .await?
            .into_iter()
            .map(|(child, subtree)| Dialog::from_subtree(&child.id, &child.name, &subtree))
            .filter(|dialog| dialog.is_stale(now, stale_hours))
            .collect();
        debug!(count = stale.len(), "stale dialogs");
        Ok(stale)
    }

    /// Active children of `parent_id` paired with their subtrees.
    async fn scan(&self, parent_id: &str, depth: usize) -> Result<Vec<(Node, Vec<Node>)>> {
        let children = self
            .client
            .list_children(Some(parent_id))
            .await
            .with_context(|| format!("list children of {parent_id}"))?;

        let mut out = Vec::new();
        for child in children {
            if child.is_completed() {
                continue;
            }
            match self.client.get_subtree(&child.id, depth).await {
                Ok(subtree) => out.push((child, subtree)),
                Err(err) => {
                    warn!(task_id = %child.id, err = %format!("{err:#}"), "skipping unreadable task");
                }
            }
        }
        Ok(out)
    }
}
