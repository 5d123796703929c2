//! Backing-store boundaries.
//!
//! The pipeline only needs three capabilities from the outside world: read
//! and overwrite the item field of a parent record, probe the store for
//! reachability, and append audit records. Each is an async trait so real
//! drivers and the bundled memory/file stores plug in the same way.

pub mod file;
pub mod locks;
pub mod memory;

use crate::audit::AuditRecord;
use crate::core::{ContentItem, ParentRecord, PersistError, PoolStatus, Result};
use async_trait::async_trait;

pub use file::{FileParentStore, JsonlAuditStore};
pub use locks::ParentLocks;
pub use memory::{MemoryAuditStore, MemoryParentStore};

/// Parent records with an array-valued item field.
#[async_trait]
pub trait ParentStore: Send + Sync {
    /// Reads a parent record, `None` when it does not exist.
    async fn read_parent(&self, parent_id: &str) -> Result<Option<ParentRecord>>;

    /// Overwrites the item field of an existing parent and returns the new version.
    async fn write_items(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64>;

    /// Whether `replace_items_transactional` clears and writes in one atomic step.
    fn supports_native_transactions(&self) -> bool {
        false
    }

    async fn replace_items_transactional(
        &self,
        parent_id: &str,
        _items: &[ContentItem],
    ) -> Result<u64> {
        Err(PersistError::Unsupported(format!(
            "native transactional replace for parent '{}'",
            parent_id
        )))
    }
}

/// Lightweight reachability checks against the backing store.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// One round trip to the store.
    async fn ping(&self) -> Result<()>;

    /// Pool utilization, `None` when the store has no pool to report.
    async fn pool_status(&self) -> Option<PoolStatus>;
}

/// Append-only sink for transaction audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}
