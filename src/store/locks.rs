use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per parent id.
///
/// The persistence manager never locks across calls; callers that issue
/// concurrent saves for the same parent hold a guard from here around each
/// save so the replaces run one after another.
#[derive(Default, Clone)]
pub struct ParentLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ParentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, parent_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(parent_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Drops entries nobody is holding or waiting on.
    pub async fn prune(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = ParentLocks::new();
        let guard = locks.lock("page-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("page-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = ParentLocks::new();
        let _a = locks.lock("page-1").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock("page-2"))
            .await
            .expect("independent key should not block");
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_prune_removes_idle_entries() {
        let locks = ParentLocks::new();
        {
            let _guard = locks.lock("page-1").await;
        }
        let _held = locks.lock("page-2").await;

        locks.prune().await;
        assert_eq!(locks.len().await, 1);
    }
}
