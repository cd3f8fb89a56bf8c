use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Success,
  Error,
  Canceled,
}

/// One node instance as it stood when the run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
  /// Display id, `template#i#j`.
  pub instance_id: String,
  /// Id of the template node in the definition.
  pub original_id: String,
  pub node_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  pub status: String,
  /// Payloads, results, output-handle statuses and error detail.
  pub data: serde_json::Value,
}

/// A finished (or interrupted) run as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
  pub run_id: String,
  pub workflow_id: String,
  pub definition: Json<serde_json::Value>,
  pub status: ExecutionStatus,
  pub started_at: DateTime<Utc>,
  pub ended_at: Option<DateTime<Utc>>,
  pub nodes: Json<Vec<NodeSnapshot>>,
}

impl RunRecord {
  pub fn node(&self, instance_id: &str) -> Option<&NodeSnapshot> {
    self.nodes.0.iter().find(|n| n.instance_id == instance_id)
  }
}
