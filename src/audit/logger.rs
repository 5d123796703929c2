use super::record::{AuditRecord, AuditStatus};
use crate::core::{ErrorKind, Operation, PersistError, SaveResult, TransactionContext};
use crate::store::AuditStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Ambient fields attached to every entry. Unset fields are left out.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub transaction_id: Option<String>,
    pub parent_id: Option<String>,
    pub actor_id: Option<String>,
    pub operation: Option<Operation>,
    pub(crate) retry_count: Option<Arc<AtomicU32>>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn parent_id(mut self, id: impl Into<String>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    pub fn actor_id(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Context tracking a live transaction, including its retry counter.
    pub fn from_transaction(context: &TransactionContext) -> Self {
        Self {
            transaction_id: Some(context.transaction_id.clone()),
            parent_id: Some(context.parent_record_id.clone()),
            actor_id: context.actor_id.clone(),
            operation: Some(context.operation),
            retry_count: Some(context.retry_counter()),
        }
    }

    pub fn retry_count(&self) -> Option<u32> {
        self.retry_count
            .as_ref()
            .map(|count| count.load(Ordering::SeqCst))
    }

    /// Fields set in `other` win.
    fn merge(&self, other: LogContext) -> Self {
        Self {
            transaction_id: other.transaction_id.or_else(|| self.transaction_id.clone()),
            parent_id: other.parent_id.or_else(|| self.parent_id.clone()),
            actor_id: other.actor_id.or_else(|| self.actor_id.clone()),
            operation: other.operation.or(self.operation),
            retry_count: other.retry_count.or_else(|| self.retry_count.clone()),
        }
    }
}

/// Fixed-shape structured log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub transaction_id: Option<String>,
    pub parent_id: Option<String>,
    pub actor_id: Option<String>,
    pub operation: Option<Operation>,
    pub retry_count: Option<u32>,
    pub details: Value,
}

macro_rules! emit_at {
    ($level:expr, $entry:expr) => {
        event!(
            $level,
            transaction_id = %$entry.transaction_id.as_deref().unwrap_or("-"),
            parent_id = %$entry.parent_id.as_deref().unwrap_or("-"),
            actor_id = %$entry.actor_id.as_deref().unwrap_or("-"),
            operation = %$entry.operation.map(|op| op.as_str()).unwrap_or("-"),
            retry_count = $entry.retry_count.unwrap_or(0),
            details = %$entry.details,
            "{}",
            $entry.message
        )
    };
}

/// Context-carrying logger for the persistence pipeline.
///
/// Entries go to the `tracing` subscriber. Lifecycle milestones are also
/// appended to the audit store when one is attached; audit writes are best
/// effort and never fail the caller.
#[derive(Clone)]
pub struct TransactionLogger {
    context: LogContext,
    audit: Option<Arc<dyn AuditStore>>,
    enabled: bool,
}

impl Default for TransactionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLogger {
    pub fn new() -> Self {
        Self {
            context: LogContext::default(),
            audit: None,
            enabled: true,
        }
    }

    pub fn with_audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns a logger whose context is this one's merged with `partial`.
    pub fn with_context(&self, partial: LogContext) -> Self {
        Self {
            context: self.context.merge(partial),
            audit: self.audit.clone(),
            enabled: self.enabled,
        }
    }

    pub fn for_transaction(&self, context: &TransactionContext) -> Self {
        self.with_context(LogContext::from_transaction(context))
    }

    /// Returns a logger that writes entries only when `enabled`. Audit records are unaffected.
    pub fn with_logging(&self, enabled: bool) -> Self {
        Self {
            context: self.context.clone(),
            audit: self.audit.clone(),
            enabled,
        }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn entry(&self, level: LogLevel, message: impl Into<String>, details: Value) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            transaction_id: self.context.transaction_id.clone(),
            parent_id: self.context.parent_id.clone(),
            actor_id: self.context.actor_id.clone(),
            operation: self.context.operation,
            retry_count: self.context.retry_count(),
            details,
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, details: Value) {
        if !self.enabled {
            return;
        }
        let entry = self.entry(level, message, details);
        match entry.level {
            LogLevel::Debug => emit_at!(Level::DEBUG, entry),
            LogLevel::Info => emit_at!(Level::INFO, entry),
            LogLevel::Warn => emit_at!(Level::WARN, entry),
            LogLevel::Error => emit_at!(Level::ERROR, entry),
        }
    }

    pub fn debug(&self, message: impl Into<String>, details: Value) {
        self.log(LogLevel::Debug, message, details);
    }

    pub fn info(&self, message: impl Into<String>, details: Value) {
        self.log(LogLevel::Info, message, details);
    }

    pub fn warn(&self, message: impl Into<String>, details: Value) {
        self.log(LogLevel::Warn, message, details);
    }

    pub fn error(&self, message: impl Into<String>, details: Value) {
        self.log(LogLevel::Error, message, details);
    }

    pub async fn log_transaction_start(&self, context: &TransactionContext, item_count: usize) {
        self.info(
            "Transaction started",
            json!({
                "itemCount": item_count,
                "maxRetries": context.max_retries,
                "timeoutMs": context.timeout.as_millis() as u64,
            }),
        );

        let mut record = self.audit_record(context, AuditStatus::Started);
        record.metadata = json!({
            "itemCount": item_count,
            "actorId": context.actor_id,
            "startedAt": context.start_time,
        });
        self.persist_audit(record).await;
    }

    pub async fn log_transaction_success(&self, context: &TransactionContext, result: &SaveResult) {
        self.info(
            "Transaction committed",
            json!({
                "itemsSaved": result.items_saved(),
                "retryAttempts": result.retry_attempts(),
                "executionTimeMs": result.execution_time_ms(),
                "version": result.metadata().version,
            }),
        );

        let mut record = self.audit_record(context, AuditStatus::Committed);
        record.execution_time_ms = Some(result.execution_time_ms());
        record.completed_at = Some(Utc::now());
        record.metadata = json!({
            "itemsSaved": result.items_saved(),
            "version": result.metadata().version,
            "dataIntegrity": result.metadata().data_integrity,
        });
        self.persist_audit(record).await;
    }

    pub async fn log_transaction_failure(
        &self,
        context: &TransactionContext,
        error: &PersistError,
        kind: ErrorKind,
    ) {
        self.error(
            "Transaction failed",
            json!({
                "error": error.to_string(),
                "errorKind": kind,
                "retryCount": context.retry_count(),
                "executionTimeMs": context.elapsed_ms(),
            }),
        );

        let mut record = self.audit_record(context, AuditStatus::Failed);
        record.error_details = Some(error.root().to_string());
        record.execution_time_ms = Some(context.elapsed_ms());
        record.completed_at = Some(Utc::now());
        record.metadata = json!({ "errorKind": kind });
        self.persist_audit(record).await;
    }

    pub fn log_retry_attempt(
        &self,
        next_attempt: u32,
        error: &PersistError,
        kind: ErrorKind,
        delay: Duration,
    ) {
        self.warn(
            format!("Retrying after {} ({})", kind, error),
            json!({
                "nextAttempt": next_attempt,
                "errorKind": kind,
                "delayMs": delay.as_millis() as u64,
            }),
        );
    }

    fn audit_record(&self, context: &TransactionContext, status: AuditStatus) -> AuditRecord {
        AuditRecord {
            transaction_id: context.transaction_id.clone(),
            parent_id: context.parent_record_id.clone(),
            operation: context.operation,
            status,
            error_details: None,
            metadata: Value::Null,
            retry_count: context.retry_count(),
            execution_time_ms: None,
            completed_at: None,
            recorded_at: Utc::now(),
        }
    }

    async fn persist_audit(&self, record: AuditRecord) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(err) = audit.append(&record).await {
            // Audit history must never decide the outcome of a save.
            event!(
                Level::WARN,
                transaction_id = %record.transaction_id,
                status = %record.status,
                error = %err,
                "audit record append failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuditStore;

    fn context() -> TransactionContext {
        TransactionContext::new(
            "page-1",
            Some("editor-7".to_string()),
            Operation::SaveGenerated,
            3,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_with_context_merges_and_keeps_original() {
        let base = TransactionLogger::new().with_context(LogContext::new().actor_id("system"));
        let scoped = base.with_context(LogContext::new().parent_id("page-9"));

        assert_eq!(base.context().parent_id, None);
        assert_eq!(scoped.context().actor_id.as_deref(), Some("system"));
        assert_eq!(scoped.context().parent_id.as_deref(), Some("page-9"));

        let overridden = scoped.with_context(LogContext::new().actor_id("editor"));
        assert_eq!(overridden.context().actor_id.as_deref(), Some("editor"));
    }

    #[test]
    fn test_entry_tracks_live_retry_count() {
        let ctx = context();
        let logger = TransactionLogger::new().for_transaction(&ctx);

        assert_eq!(logger.entry(LogLevel::Info, "a", Value::Null).retry_count, Some(0));
        ctx.set_retry_count(2);

        let entry = logger.entry(LogLevel::Warn, "b", json!({ "k": 1 }));
        assert_eq!(entry.retry_count, Some(2));
        assert_eq!(entry.transaction_id.as_deref(), Some(ctx.transaction_id.as_str()));
        assert_eq!(entry.operation, Some(Operation::SaveGenerated));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warn");
        assert_eq!(json["parentId"], "page-1");
        assert_eq!(json["details"]["k"], 1);
    }

    #[tokio::test]
    async fn test_lifecycle_records_are_persisted() {
        let audits = Arc::new(MemoryAuditStore::new());
        let ctx = context();
        let logger = TransactionLogger::new()
            .with_audit_store(audits.clone())
            .with_logging(false)
            .for_transaction(&ctx);

        logger.log_transaction_start(&ctx, 2).await;
        ctx.set_retry_count(1);
        logger
            .log_transaction_failure(
                &ctx,
                &PersistError::Connection("connection reset".into()),
                ErrorKind::Connection,
            )
            .await;

        let records = audits.records_for(&ctx.transaction_id).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AuditStatus::Started);
        assert_eq!(records[0].metadata["itemCount"], 2);
        assert_eq!(records[1].status, AuditStatus::Failed);
        assert_eq!(records[1].retry_count, 1);
        assert!(records[1].error_details.as_deref().unwrap().contains("connection reset"));
        assert!(records[1].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_logger_without_audit_store_is_silent() {
        let ctx = context();
        let logger = TransactionLogger::new().for_transaction(&ctx);
        logger.log_transaction_start(&ctx, 0).await;
    }
}
