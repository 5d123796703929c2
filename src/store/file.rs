//! File-backed stores.
//!
//! Parents live as one JSON document each under `<root>/parents/`. Every
//! write goes through a temp file in the same directory followed by a rename,
//! so readers never observe a half-written document. Audit records are
//! appended as JSON lines.

use super::{AuditStore, ConnectionProbe, ParentStore};
use crate::audit::AuditRecord;
use crate::core::{ContentItem, ParentRecord, PersistError, PoolStatus, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

const PARENTS_DIR: &str = "parents";

pub struct FileParentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileParentStore {
    /// Opens a store at `root`, creating the directory layout if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(PARENTS_DIR)).await.map_err(|err| {
            PersistError::Io(format!(
                "Failed to create store root '{}': {}",
                root.display(),
                err
            ))
        })?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates an empty parent record. Existing records are left untouched.
    pub async fn create_parent(&self, parent_id: &str) -> Result<ParentRecord> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.load(parent_id).await? {
            return Ok(existing);
        }
        let record = ParentRecord::new(parent_id);
        self.store(&record).await?;
        Ok(record)
    }

    fn parent_path(&self, parent_id: &str) -> Result<PathBuf> {
        let valid = !parent_id.is_empty()
            && parent_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(PersistError::Store(format!(
                "invalid input syntax for parent id '{}'",
                parent_id
            )));
        }
        Ok(self.root.join(PARENTS_DIR).join(format!("{parent_id}.json")))
    }

    async fn load(&self, parent_id: &str) -> Result<Option<ParentRecord>> {
        let path = self.parent_path(parent_id)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PersistError::Io(err.to_string())),
        };
        let record = serde_json::from_slice::<ParentRecord>(&raw).map_err(|err| {
            PersistError::Serialization(format!("parse parent '{}': {}", parent_id, err))
        })?;
        Ok(Some(record))
    }

    async fn store(&self, record: &ParentRecord) -> Result<()> {
        let path = self.parent_path(&record.id)?;
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|err| PersistError::Io(format!("atomic write task failed: {}", err)))?
    }

    async fn overwrite(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .load(parent_id)
            .await?
            .ok_or_else(|| PersistError::ParentNotFound(parent_id.to_string()))?;

        record.items = items.to_vec();
        record.version += 1;
        record.updated_at = Utc::now();
        self.store(&record).await?;
        Ok(record.version)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PersistError::Io(format!("'{}' has no parent directory", path.display())))?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|err| PersistError::Io(format!("persist '{}': {}", path.display(), err)))?;
    Ok(())
}

#[async_trait]
impl ParentStore for FileParentStore {
    async fn read_parent(&self, parent_id: &str) -> Result<Option<ParentRecord>> {
        self.load(parent_id).await
    }

    async fn write_items(&self, parent_id: &str, items: &[ContentItem]) -> Result<u64> {
        self.overwrite(parent_id, items).await
    }

    // A single rename replaces the whole document.
    fn supports_native_transactions(&self) -> bool {
        true
    }

    async fn replace_items_transactional(
        &self,
        parent_id: &str,
        items: &[ContentItem],
    ) -> Result<u64> {
        self.overwrite(parent_id, items).await
    }
}

#[async_trait]
impl ConnectionProbe for FileParentStore {
    async fn ping(&self) -> Result<()> {
        let metadata = fs::metadata(self.root.join(PARENTS_DIR))
            .await
            .map_err(|err| PersistError::Connection(format!("store root unreachable: {}", err)))?;
        if !metadata.is_dir() {
            return Err(PersistError::Connection(format!(
                "store root '{}' is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn pool_status(&self) -> Option<PoolStatus> {
        None
    }
}

/// Append-only audit log stored as JSON lines.
pub struct JsonlAuditStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record in append order.
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new().read(true).open(&self.path).await?;
        let mut records = Vec::new();
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<AuditRecord>(&line).map_err(|err| {
                PersistError::Serialization(format!("parse audit record: {}", err))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
