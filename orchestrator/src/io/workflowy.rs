//! WorkFlowy beta API client implementing [`TreeClient`].

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::tree_client::TreeClient;
use crate::tree::{Node, Position, sort_nodes};

pub const DEFAULT_API_URL: &str = "https://beta.workflowy.com/api/beta";

/// Root sentinel understood by the API in place of a parent id.
const ROOT_ID: &str = "None";

/// HTTP client for the WorkFlowy beta endpoints (`POST <base>/<endpoint>/`).
pub struct WorkflowyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WorkflowyClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send(&self, endpoint: &str, payload: Value) -> Result<reqwest::Response> {
        let url = format!("{}/{}/", self.base_url, endpoint);
        debug!(%url, "workflowy request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{endpoint} failed with HTTP {}: {}",
                status.as_u16(),
                body.trim()
            ));
        }
        Ok(response)
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: &str, payload: Value) -> Result<T> {
        self.send(endpoint, payload)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("parse {endpoint} response"))
    }
}

/// Item as returned by the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    id: String,
    #[serde(default)]
    name: String,
    note: Option<String>,
    #[serde(default)]
    priority: i64,
    created_at: Option<i64>,
    completed_at: Option<i64>,
}

impl From<ApiItem> for Node {
    fn from(item: ApiItem) -> Self {
        Node {
            id: item.id,
            name: item.name,
            note: item.note,
            priority: item.priority,
            created_at: item.created_at.and_then(from_unix),
            completed_at: item.completed_at.and_then(from_unix),
            children: Vec::new(),
        }
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: ApiItem,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    item_id: String,
}

#[async_trait]
impl TreeClient for WorkflowyClient {
    #[instrument(skip(self))]
    async fn get_item(&self, id: &str) -> Result<Node> {
        let response: ItemResponse = self.post("get-item", json!({ "item_id": id })).await?;
        Ok(response.item.into())
    }

    #[instrument(skip(self))]
    async fn list_children(&self, parent_id: Option<&str>) -> Result<Vec<Node>> {
        let response: ItemsResponse = self
            .post(
                "list-children",
                json!({ "item_id": parent_id.unwrap_or(ROOT_ID) }),
            )
            .await?;
        let mut nodes: Vec<Node> = response.items.into_iter().map(Node::from).collect();
        sort_nodes(&mut nodes);
        Ok(nodes)
    }

    #[instrument(skip(self, name, note))]
    async fn create_item(
        &self,
        parent_id: &str,
        name: &str,
        note: Option<&str>,
        position: Position,
    ) -> Result<String> {
        let mut payload = json!({
            "parent_id": parent_id,
            "name": name,
            "position": position.as_str(),
        });
        if let Some(note) = note.filter(|n| !n.is_empty()) {
            payload["note"] = Value::String(note.to_string());
        }
        let response: CreateResponse = self.post("create-item", payload).await?;
        Ok(response.item_id)
    }

    #[instrument(skip(self, name, note))]
    async fn edit_item(&self, id: &str, name: Option<&str>, note: Option<&str>) -> Result<()> {
        let mut payload = json!({ "item_id": id });
        if let Some(name) = name {
            payload["name"] = Value::String(name.to_string());
        }
        if let Some(note) = note {
            payload["note"] = Value::String(note.to_string());
        }
        self.send("edit-item", payload).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_item(&self, id: &str) -> Result<()> {
        self.send("complete-item", json!({ "item_id": id })).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_item_converts_timestamps_and_defaults() {
        let raw = r#"{
            "id": "abc",
            "name": "👤 hi",
            "priority": 3,
            "createdAt": 1700000000,
            "completedAt": null,
            "data": { "layoutMode": "bullets" }
        }"#;
        let item: ApiItem = serde_json::from_str(raw).expect("parse");
        let node = Node::from(item);
        assert_eq!(node.id, "abc");
        assert_eq!(node.priority, 3);
        assert_eq!(node.note, None);
        assert_eq!(
            node.created_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert!(!node.is_completed());
    }

    #[test]
    fn items_response_tolerates_missing_list() {
        let parsed: ItemsResponse = serde_json::from_str("{}").expect("parse");
        assert!(parsed.items.is_empty());
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client =
            WorkflowyClient::new("https://example.test/api/", "k".to_string(), Duration::from_secs(1))
                .expect("client");
        assert_eq!(client.base_url, "https://example.test/api");
    }
}
