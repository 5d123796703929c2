use crate::core::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle milestone recorded for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Committed,
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Started => "started",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Append-only audit entry, keyed by transaction id.
///
/// Stored apart from the parent records so history survives a failed or
/// rolled back save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub transaction_id: String,
    pub parent_id: String,
    pub operation: Operation,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}
