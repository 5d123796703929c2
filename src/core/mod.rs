pub mod error;
pub mod types;

pub use error::{ErrorKind, PersistError, Result};
pub use types::{
    ConnectionHealth, ConnectionStatus, ContentItem, IntegrityStatus, Keyword, Operation,
    ParentRecord, PoolStatus, SaveMetadata, SaveResult, SchemaStatus, TransactionContext,
    ValidationIssue, ValidationResult, new_transaction_id,
};
