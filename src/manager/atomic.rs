use crate::audit::TransactionLogger;
use crate::core::{ContentItem, IntegrityStatus, PersistError, Result, SaveMetadata};
use crate::store::ParentStore;
use serde_json::json;
use tokio::sync::Mutex;

/// Snapshot, replace, verify. Any failure after the collection may have
/// changed puts the snapshot back before the error is returned.
pub(super) async fn replace_items(
    parents: &dyn ParentStore,
    parent_id: &str,
    items: Vec<ContentItem>,
    logger: &TransactionLogger,
    metadata: &Mutex<SaveMetadata>,
) -> Result<u64> {
    let parent = parents
        .read_parent(parent_id)
        .await?
        .ok_or_else(|| PersistError::ParentNotFound(parent_id.to_string()))?;
    let snapshot = parent.items;
    let expected = items.len();
    let native = parents.supports_native_transactions();

    let written = if native {
        parents.replace_items_transactional(parent_id, &items).await
    } else {
        match parents.write_items(parent_id, &[]).await {
            Ok(_) => parents.write_items(parent_id, &items).await,
            Err(err) => Err(err),
        }
    };

    // A failed native replace leaves the collection untouched.
    let (outcome, touched) = match written {
        Ok(_) => (verify(parents, parent_id, expected).await, true),
        Err(err) => (Err(err), !native),
    };

    match outcome {
        Ok(version) => {
            let mut metadata = metadata.lock().await;
            metadata.data_integrity = IntegrityStatus::Verified;
            metadata.version = Some(version);
            logger.debug(
                "Items replaced",
                json!({ "itemsWritten": expected, "previousItems": snapshot.len(), "version": version }),
            );
            Ok(version)
        }
        Err(err) if touched => {
            let status = rollback(parents, parent_id, &snapshot, native, logger, &err).await;
            metadata.lock().await.data_integrity = status;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

async fn verify(parents: &dyn ParentStore, parent_id: &str, expected: usize) -> Result<u64> {
    let record = parents
        .read_parent(parent_id)
        .await?
        .ok_or_else(|| PersistError::ParentNotFound(parent_id.to_string()))?;

    if record.items.len() != expected {
        return Err(PersistError::Verification {
            expected,
            actual: record.items.len(),
        });
    }
    Ok(record.version)
}

/// Best effort; a failed rollback is reported, never returned.
async fn rollback(
    parents: &dyn ParentStore,
    parent_id: &str,
    snapshot: &[ContentItem],
    native: bool,
    logger: &TransactionLogger,
    cause: &PersistError,
) -> IntegrityStatus {
    let restored = if native {
        parents.replace_items_transactional(parent_id, snapshot).await
    } else {
        parents.write_items(parent_id, snapshot).await
    };

    match restored {
        Ok(_) => {
            logger.warn(
                "Rolled back to previous items",
                json!({ "restoredItems": snapshot.len(), "cause": cause.to_string() }),
            );
            IntegrityStatus::RolledBack
        }
        Err(rollback_err) => {
            logger.error(
                "Rollback failed",
                json!({
                    "cause": cause.to_string(),
                    "rollbackError": rollback_err.to_string(),
                    "snapshotItems": snapshot.len(),
                }),
            );
            IntegrityStatus::RollbackFailed
        }
    }
}
