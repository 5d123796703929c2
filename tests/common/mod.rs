#![allow(dead_code)]

use async_trait::async_trait;
use robust_persist::{
    ConnectionProbe, ContentItem, MemoryParentStore, ParentRecord, ParentStore, PersistError,
    PersistenceConfig, Result, RetryPolicy,
};
use robust_persist::core::PoolStatus;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type WriteFault = Box<dyn Fn(usize, &[ContentItem]) -> Option<PersistError> + Send + Sync>;
type ReadFault = Box<dyn Fn(usize) -> Option<PersistError> + Send + Sync>;

/// Memory store wrapper that injects failures by call index.
///
/// Write calls are counted across the whole test: for a non-native save the
/// clear is one call, the replacement write the next, a rollback the next.
/// With native transactions each `replace_items_transactional` is one call.
pub struct FaultyStore {
    pub inner: Arc<MemoryParentStore>,
    write_calls: AtomicUsize,
    read_calls: AtomicUsize,
    write_fault: Option<WriteFault>,
    read_fault: Option<ReadFault>,
    truncated_writes: AtomicUsize,
    slow_write: Option<(usize, Duration)>,
    native: bool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryParentStore>) -> Self {
        Self {
            inner,
            write_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            write_fault: None,
            read_fault: None,
            truncated_writes: AtomicUsize::new(0),
            slow_write: None,
            native: false,
        }
    }

    pub fn on_write(
        mut self,
        fault: impl Fn(usize, &[ContentItem]) -> Option<PersistError> + Send + Sync + 'static,
    ) -> Self {
        self.write_fault = Some(Box::new(fault));
        self
    }

    pub fn on_read(
        mut self,
        fault: impl Fn(usize) -> Option<PersistError> + Send + Sync + 'static,
    ) -> Self {
        self.read_fault = Some(Box::new(fault));
        self
    }

    /// The next `count` non-empty writes silently drop their last item.
    pub fn truncate_next_writes(self, count: usize) -> Self {
        self.truncated_writes.store(count, Ordering::SeqCst);
        self
    }

    /// Write call `call` takes `delay` before it lands.
    pub fn slow_write(mut self, call: usize, delay: Duration) -> Self {
        self.slow_write = Some((call, delay));
        self
    }

    /// Report native transaction support and route replaces through one call.
    pub fn native_transactions(mut self) -> Self {
        self.native = true;
        self
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParentStore for FaultyStore {
    async fn read_parent(&self, parent_id: &str) -> Result<Option<ParentRecord>> {
        let call = self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.read_fault.as_ref().and_then(|fault| fault(call)) {
            return Err(err);
        }
        self.inner.read_parent(parent_id).await
    }

    async fn write_items(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        self.faulty_write(parent_id, items).await
    }

    fn supports_native_transactions(&self) -> bool {
        self.native
    }

    async fn replace_items_transactional(
        &self,
        parent_id: &str,
        items: &[ContentItem],
    ) -> Result<u64> {
        if !self.native {
            return Err(PersistError::Unsupported("native transactions".to_string()));
        }
        self.faulty_write(parent_id, items).await
    }
}

impl FaultyStore {
    async fn faulty_write(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((slow_call, delay)) = self.slow_write {
            if slow_call == call {
                tokio::time::sleep(delay).await;
            }
        }
        if let Some(err) = self.write_fault.as_ref().and_then(|fault| fault(call, items)) {
            return Err(err);
        }

        let truncate = !items.is_empty()
            && self
                .truncated_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
        if truncate {
            return self
                .inner
                .write_items(parent_id, &items[..items.len() - 1])
                .await;
        }
        self.inner.write_items(parent_id, items).await
    }
}

#[async_trait]
impl ConnectionProbe for FaultyStore {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn pool_status(&self) -> Option<PoolStatus> {
        self.inner.pool_status().await
    }
}

/// Default config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> PersistenceConfig {
    PersistenceConfig::new().retry_policy(RetryPolicy {
        base_delay_ms: 1,
        max_delay_ms: 10,
        min_delay_ms: 1,
        jitter: 0.25,
    })
}

pub fn item(title: &str, slug: &str) -> Value {
    json!({ "title": title, "slug": slug, "description": "", "keywords": [] })
}

pub async fn seeded_store(parent_id: &str, count: usize) -> Arc<MemoryParentStore> {
    let store = Arc::new(MemoryParentStore::new());
    let items = (0..count)
        .map(|i| ContentItem::new(format!("Existing {}", i), format!("existing-{}", i)))
        .collect();
    store
        .insert_parent(ParentRecord::new(parent_id).with_items(items))
        .await;
    store
}

pub async fn slugs(store: &MemoryParentStore, parent_id: &str) -> Vec<String> {
    store
        .items(parent_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|item| item.slug)
        .collect()
}
