//! Orchestrator for transactional batch saves.
//!
//! One call runs `CONNECTION_CHECK -> SCHEMA_VALIDATE -> SANITIZE ->
//! UNIQUENESS_CHECK -> ATOMIC_SAVE` inside the retry loop and always hands
//! back a `SaveResult`, never an error.

mod atomic;

use crate::audit::TransactionLogger;
use crate::config::{PersistenceConfig, SaveOptions};
use crate::connection::ConnectionValidator;
use crate::core::{
    ConnectionStatus, ContentItem, Operation, PersistError, Result, SaveMetadata, SaveResult,
    SchemaStatus, TransactionContext,
};
use crate::retry::{RetryManager, classify_error};
use crate::schema::SchemaValidator;
use crate::store::{AuditStore, ConnectionProbe, ParentStore};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, info_span};

/// Counts reported by one successful attempt.
#[derive(Debug, Clone, Copy)]
struct Saved {
    items: usize,
}

pub struct RobustPersistenceManager {
    parents: Arc<dyn ParentStore>,
    probe: Arc<dyn ConnectionProbe>,
    connection: ConnectionValidator,
    schema: Arc<SchemaValidator>,
    retry: RetryManager,
    logger: TransactionLogger,
    config: PersistenceConfig,
}

impl RobustPersistenceManager {
    /// Manager over a store that is also its own connection probe.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: ParentStore + ConnectionProbe + 'static,
    {
        let parents: Arc<dyn ParentStore> = store.clone();
        let probe: Arc<dyn ConnectionProbe> = store;
        Self::with_parts(parents, probe, PersistenceConfig::default())
    }

    pub fn with_parts(
        parents: Arc<dyn ParentStore>,
        probe: Arc<dyn ConnectionProbe>,
        config: PersistenceConfig,
    ) -> Self {
        let connection = build_validator(&probe, &config);
        Self {
            parents,
            probe,
            connection,
            schema: Arc::new(SchemaValidator::new()),
            retry: RetryManager::new(config.retry.clone()),
            logger: TransactionLogger::new(),
            config,
        }
    }

    pub fn with_config(mut self, config: PersistenceConfig) -> Self {
        self.connection = build_validator(&self.probe, &config);
        self.retry = RetryManager::new(config.retry.clone());
        self.config = config;
        self
    }

    pub fn with_logger(mut self, logger: TransactionLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Persists lifecycle audit records to `audit`.
    pub fn with_audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.logger = self.logger.with_audit_store(audit);
        self
    }

    pub fn with_schema_validator(mut self, schema: SchemaValidator) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionValidator {
        &self.connection
    }

    /// Replaces the item collection of `parent_id` with `items`.
    ///
    /// The whole pipeline is retried on transient failures. Fatal failures
    /// (missing parent, invalid input, uniqueness or permission errors) abort
    /// on the first attempt. An empty batch clears the collection.
    pub async fn save_with_transaction(
        &self,
        parent_id: &str,
        items: Vec<Value>,
        options: SaveOptions,
        actor_id: Option<String>,
    ) -> SaveResult {
        let resolved = options.resolve(&self.config);
        let context = TransactionContext::new(
            parent_id,
            actor_id,
            Operation::SaveGenerated,
            resolved.max_retries,
            resolved.timeout,
        );
        let span = info_span!(
            "save_with_transaction",
            transaction_id = %context.transaction_id,
            parent_id = %parent_id,
        );

        self.run_transaction(context, items, resolved.validate_schema, resolved.enable_logging)
            .instrument(span)
            .await
    }

    /// Typed entry point; items still go through validation and sanitization.
    pub async fn save_items(
        &self,
        parent_id: &str,
        items: Vec<ContentItem>,
        options: SaveOptions,
        actor_id: Option<String>,
    ) -> SaveResult {
        let raw = items
            .iter()
            .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
            .collect();
        self.save_with_transaction(parent_id, raw, options, actor_id)
            .await
    }

    async fn run_transaction(
        &self,
        context: TransactionContext,
        items: Vec<Value>,
        validate_schema: bool,
        enable_logging: bool,
    ) -> SaveResult {
        let logger = self
            .logger
            .with_logging(enable_logging)
            .for_transaction(&context);
        logger.log_transaction_start(&context, items.len()).await;

        let metadata = Arc::new(Mutex::new(SaveMetadata::default()));
        // Attempts of one call never overlap in the store, even after a timeout.
        let write_gate = Arc::new(Mutex::new(()));
        let items = Arc::new(items);
        let retry = self.retry.with_logger(logger.clone());

        let ctx = &context;
        let attempt_logger = &logger;
        let outcome = retry
            .execute_with_retry(ctx, || {
                self.attempt(
                    ctx,
                    attempt_logger,
                    Arc::clone(&items),
                    validate_schema,
                    Arc::clone(&metadata),
                    Arc::clone(&write_gate),
                )
            })
            .await;

        // A write left running by a timed-out attempt lands before the call returns.
        let _settled = write_gate.lock().await;
        let metadata = *metadata.lock().await;
        match outcome {
            Ok(saved) => {
                let result = SaveResult::succeeded(&context, saved.items, metadata);
                logger.log_transaction_success(&context, &result).await;
                result
            }
            Err(err) => {
                let kind = classify_error(&err).kind;
                logger.log_transaction_failure(&context, &err, kind).await;
                SaveResult::failed(&context, error_messages(&err), kind, metadata)
            }
        }
    }

    async fn attempt(
        &self,
        context: &TransactionContext,
        logger: &TransactionLogger,
        raw: Arc<Vec<Value>>,
        validate_schema: bool,
        metadata: Arc<Mutex<SaveMetadata>>,
        write_gate: Arc<Mutex<()>>,
    ) -> Result<Saved> {
        // CONNECTION_CHECK
        let health = self
            .connection
            .with_logger(logger.clone())
            .ensure_connection()
            .await;
        metadata.lock().await.connection_status = if health.is_ok() {
            ConnectionStatus::Healthy
        } else {
            ConnectionStatus::Unhealthy
        };
        let health = health?;
        logger.debug(
            "Connection healthy",
            json!({
                "latencyMs": health.latency_ms,
                "pool": health.pool_status.map(|pool| pool.to_string()),
            }),
        );

        // SCHEMA_VALIDATE
        if validate_schema {
            let report = self.schema.validate_items(&raw);
            if !report.valid {
                metadata.lock().await.schema_validation = SchemaStatus::Failed;
                return Err(PersistError::Schema {
                    issues: report.errors,
                });
            }
            if !report.warnings.is_empty() {
                logger.warn(
                    "Schema validation warnings",
                    json!({
                        "warnings": report.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    }),
                );
            }
        }

        // SANITIZE
        let items = self.schema.sanitize_items(&raw);
        if validate_schema {
            let report = self.schema.validate_sanitized(&items);
            if !report.valid {
                metadata.lock().await.schema_validation = SchemaStatus::Failed;
                return Err(PersistError::Validation {
                    issues: report.errors,
                });
            }
        }

        // UNIQUENESS_CHECK
        let unique = self.schema.validate_unique_constraints(&items);
        if !unique.valid {
            metadata.lock().await.schema_validation = SchemaStatus::Failed;
            let detail = unique
                .errors
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PersistError::Constraint(detail));
        }
        metadata.lock().await.schema_validation = if validate_schema {
            SchemaStatus::Passed
        } else {
            SchemaStatus::Skipped
        };

        // ATOMIC_SAVE
        let gate = write_gate.lock_owned().await;
        let parents = Arc::clone(&self.parents);
        let parent_id = context.parent_record_id.clone();
        let save_logger = logger.clone();
        let expected = items.len();

        // The write runs detached so an attempt timeout cannot cut it short.
        let task = tokio::spawn(async move {
            let _gate = gate;
            atomic::replace_items(parents.as_ref(), &parent_id, items, &save_logger, &metadata).await
        });
        task.await
            .map_err(|err| PersistError::Store(format!("atomic save task failed: {}", err)))??;

        Ok(Saved { items: expected })
    }
}

fn build_validator(probe: &Arc<dyn ConnectionProbe>, config: &PersistenceConfig) -> ConnectionValidator {
    ConnectionValidator::new(Arc::clone(probe))
        .check_timeout(Duration::from_millis(config.connection_check_timeout_ms))
        .max_latency(Duration::from_millis(config.max_latency_ms))
        .sample_interval(Duration::from_millis(config.stability_sample_interval_ms))
}

/// Summary line followed by one line per field-level issue.
fn error_messages(err: &PersistError) -> Vec<String> {
    std::iter::once(err.to_string())
        .chain(err.issues().iter().map(ToString::to_string))
        .collect()
}
