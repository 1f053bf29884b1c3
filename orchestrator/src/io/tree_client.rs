//! Tree backend abstraction.
//!
//! The [`TreeClient`] trait decouples the engine from the outliner backend
//! (currently the WorkFlowy beta API). Tests use an in-memory tree that
//! records writes without any network access.

use anyhow::Result;
use async_trait::async_trait;

use crate::tree::{Node, Position};

/// CRUD and traversal over a hierarchical outliner.
///
/// Every call may fail with a transport or authorization error.
#[async_trait]
pub trait TreeClient: Send + Sync {
    async fn get_item(&self, id: &str) -> Result<Node>;

    /// Children of `parent_id` (root when `None`), sorted by priority.
    ///
    /// Completed children are included; returned nodes have no children.
    async fn list_children(&self, parent_id: Option<&str>) -> Result<Vec<Node>>;

    /// Create a child node and return its id.
    async fn create_item(
        &self,
        parent_id: &str,
        name: &str,
        note: Option<&str>,
        position: Position,
    ) -> Result<String>;

    /// Update name and/or note; `None` leaves a field unchanged.
    async fn edit_item(&self, id: &str, name: Option<&str>, note: Option<&str>) -> Result<()>;

    async fn complete_item(&self, id: &str) -> Result<()>;

    /// Fetch children of `id` recursively to `depth` levels.
    ///
    /// `depth == 1` returns direct children only.
    async fn get_subtree(&self, id: &str, depth: usize) -> Result<Vec<Node>> {
        let mut children = self.list_children(Some(id)).await?;
        if depth > 1 {
            for child in &mut children {
                child.children = self.get_subtree(&child.id, depth - 1).await?;
            }
        }
        Ok(children)
    }
}
