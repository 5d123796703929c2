use super::{AuditStore, ConnectionProbe, ParentStore};
use crate::audit::AuditRecord;
use crate::core::{ContentItem, ParentRecord, PersistError, PoolStatus, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::{sleep, timeout};

/// Process-local parent store with a bounded connection pool.
///
/// Every operation borrows one pool slot for its duration. When the pool is
/// exhausted for longer than the acquire timeout the operation fails with a
/// connection error instead of hanging.
pub struct MemoryParentStore {
    records: Arc<RwLock<HashMap<String, ParentRecord>>>,
    pool: Arc<Semaphore>,
    max_connections: usize,
    acquire_timeout: Duration,
    latency: Duration,
    available: Arc<AtomicBool>,
    native_transactions: bool,
}

impl Default for MemoryParentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryParentStore {
    pub fn new() -> Self {
        Self::with_max_connections(10)
    }

    pub fn with_max_connections(max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            acquire_timeout: Duration::from_secs(1),
            latency: Duration::ZERO,
            available: Arc::new(AtomicBool::new(true)),
            native_transactions: false,
        }
    }

    /// Set how long an operation waits for a free pool slot
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Simulated round-trip latency added to every operation
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn native_transactions(mut self, enabled: bool) -> Self {
        self.native_transactions = enabled;
        self
    }

    /// Marks the store reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn insert_parent(&self, record: ParentRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
    }

    /// Current items of a parent, bypassing the pool.
    pub async fn items(&self, parent_id: &str) -> Option<Vec<ContentItem>> {
        let records = self.records.read().await;
        records.get(parent_id).map(|record| record.items.clone())
    }

    /// Occupies one pool slot until the returned permit is dropped.
    pub async fn checkout(&self) -> Result<OwnedSemaphorePermit> {
        self.acquire().await
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PersistError::Connection(
                "connection refused: store unavailable".to_string(),
            ));
        }

        let permit = timeout(self.acquire_timeout, self.pool.clone().acquire_owned())
            .await
            .map_err(|_| {
                PersistError::Connection(format!(
                    "Connection pool timeout: no connections available within {}ms",
                    self.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| PersistError::Connection("Connection pool closed".to_string()))?;

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        Ok(permit)
    }

    async fn overwrite(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(parent_id)
            .ok_or_else(|| PersistError::ParentNotFound(parent_id.to_string()))?;
        record.items = items.to_vec();
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.version)
    }
}

#[async_trait]
impl ParentStore for MemoryParentStore {
    async fn read_parent(&self, parent_id: &str) -> Result<Option<ParentRecord>> {
        let _permit = self.acquire().await?;
        let records = self.records.read().await;
        Ok(records.get(parent_id).cloned())
    }

    async fn write_items(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        let _permit = self.acquire().await?;
        self.overwrite(parent_id, items).await
    }

    fn supports_native_transactions(&self) -> bool {
        self.native_transactions
    }

    async fn replace_items_transactional(
        &self,
        parent_id: &str,
        items: &[ContentItem],
    ) -> Result<u64> {
        if !self.native_transactions {
            return Err(PersistError::Unsupported(
                "native transactions are disabled for this store".to_string(),
            ));
        }
        // One write lock covers the clear and the write.
        let _permit = self.acquire().await?;
        self.overwrite(parent_id, items).await
    }
}

#[async_trait]
impl ConnectionProbe for MemoryParentStore {
    async fn ping(&self) -> Result<()> {
        let _permit = self.acquire().await?;
        Ok(())
    }

    async fn pool_status(&self) -> Option<PoolStatus> {
        let idle = self.pool.available_permits();
        Some(PoolStatus {
            total: self.max_connections,
            idle,
            active: self.max_connections.saturating_sub(idle),
        })
    }
}

/// Audit store that keeps records in memory, in append order.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    pub async fn records_for(&self, transaction_id: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.transaction_id == transaction_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
