// ============================================================================
// Robust Persist Library
// ============================================================================

pub mod audit;
pub mod config;
pub mod connection;
pub mod core;
pub mod manager;
pub mod retry;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use audit::{AuditRecord, AuditStatus, LogContext, LogEntry, LogLevel, TransactionLogger};
pub use config::{PersistenceConfig, RetryPolicy, SaveOptions};
pub use connection::{ConnectionValidator, StabilityReport};
pub use core::{
    ConnectionHealth, ContentItem, ErrorKind, Keyword, Operation, ParentRecord, PersistError,
    Result, SaveMetadata, SaveResult, TransactionContext, ValidationIssue, ValidationResult,
};
pub use manager::RobustPersistenceManager;
pub use retry::{Classification, RetryManager, classify_error};
pub use schema::SchemaValidator;

// Re-export store API
pub use store::{
    AuditStore, ConnectionProbe, FileParentStore, JsonlAuditStore, MemoryAuditStore,
    MemoryParentStore, ParentLocks, ParentStore,
};
