use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::error::ErrorKind;

// ============================================================================
// Content items
// ============================================================================

/// Normalized keyword entry. Keywords are always stored as `{ "value": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub value: String,
}

impl Keyword {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// One entry of a parent record's item collection.
///
/// Items have no identity of their own; a save replaces the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub title: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub approved: bool,
    /// Opaque identifier of another record. Never an embedded object.
    #[serde(default)]
    pub linked_record: Option<String>,
    /// RFC 3339 publication timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

impl ContentItem {
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            description: None,
            keywords: Vec::new(),
            approved: false,
            linked_record: None,
            published_at: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keyword(mut self, value: impl Into<String>) -> Self {
        self.keywords.push(Keyword::new(value));
        self
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn linked_record(mut self, id: impl Into<String>) -> Self {
        self.linked_record = Some(id.into());
        self
    }
}

/// Aggregate record owning an item collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRecord {
    pub id: String,
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ParentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_items(mut self, items: Vec<ContentItem>) -> Self {
        self.items = items;
        self
    }
}

// ============================================================================
// Transaction context
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    SaveGenerated,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveGenerated => "save-generated",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation transaction state.
///
/// Clones share the retry counter, so a logger holding a clone observes
/// retry progress while the attempt is still running.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
    pub max_retries: u32,
    pub timeout: Duration,
    pub parent_record_id: String,
    pub actor_id: Option<String>,
    pub operation: Operation,
    started: Instant,
    retry_count: Arc<AtomicU32>,
}

impl TransactionContext {
    pub fn new(
        parent_record_id: impl Into<String>,
        actor_id: Option<String>,
        operation: Operation,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            start_time: Utc::now(),
            max_retries,
            timeout,
            parent_record_id: parent_record_id.into(),
            actor_id,
            operation,
            started: Instant::now(),
            retry_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn set_retry_count(&self, count: u32) {
        self.retry_count.store(count, Ordering::SeqCst);
    }

    pub(crate) fn retry_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.retry_count)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

pub fn new_transaction_id() -> String {
    format!("txn_{}", Uuid::new_v4().simple())
}

// ============================================================================
// Connection health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub total: usize,
    pub idle: usize,
    pub active: usize,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Status: {}/{} active, {} idle",
            self.active, self.total, self.idle
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub connected: bool,
    pub latency_ms: u64,
    pub pool_status: Option<PoolStatus>,
    pub last_check: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionHealth {
    pub fn healthy(latency_ms: u64, pool_status: Option<PoolStatus>) -> Self {
        Self {
            connected: true,
            latency_ms,
            pool_status,
            last_check: Utc::now(),
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            connected: false,
            latency_ms,
            pool_status: None,
            last_check: Utc::now(),
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// `None` for batch-level issues.
    pub item_index: Option<usize>,
    pub field: String,
    pub message: String,
    pub value: serde_json::Value,
}

impl ValidationIssue {
    pub fn new(
        item_index: Option<usize>,
        field: impl Into<String>,
        message: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            item_index,
            field: field.into(),
            message: message.into(),
            value,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item_index {
            Some(index) => write!(f, "item {} field '{}': {}", index, self.field, self.message),
            None => write!(f, "field '{}': {}", self.field, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

// ============================================================================
// Save result
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    Pending,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Unverified,
    Verified,
    RolledBack,
    RollbackFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub connection_status: ConnectionStatus,
    pub schema_validation: SchemaStatus,
    pub data_integrity: IntegrityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Default for SaveMetadata {
    fn default() -> Self {
        Self {
            connection_status: ConnectionStatus::Unknown,
            schema_validation: SchemaStatus::Pending,
            data_integrity: IntegrityStatus::Unverified,
            version: None,
        }
    }
}

/// Outcome of one `save_with_transaction` call. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    success: bool,
    transaction_id: String,
    items_saved: usize,
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    retry_attempts: u32,
    execution_time_ms: u64,
    metadata: SaveMetadata,
}

impl SaveResult {
    pub(crate) fn succeeded(
        context: &TransactionContext,
        items_saved: usize,
        metadata: SaveMetadata,
    ) -> Self {
        Self {
            success: true,
            transaction_id: context.transaction_id.clone(),
            items_saved,
            errors: Vec::new(),
            error_kind: None,
            retry_attempts: context.retry_count(),
            execution_time_ms: context.elapsed_ms(),
            metadata,
        }
    }

    pub(crate) fn failed(
        context: &TransactionContext,
        errors: Vec<String>,
        error_kind: ErrorKind,
        metadata: SaveMetadata,
    ) -> Self {
        Self {
            success: false,
            transaction_id: context.transaction_id.clone(),
            items_saved: 0,
            errors,
            error_kind: Some(error_kind),
            retry_attempts: context.retry_count(),
            execution_time_ms: context.elapsed_ms(),
            metadata,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn items_saved(&self) -> usize {
        self.items_saved
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time_ms
    }

    pub fn metadata(&self) -> &SaveMetadata {
        &self.metadata
    }
}
