//! Locked, atomically persisted index store.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::record::{DownloadRecord, DownloadStatus, Index, IndexSummary};
use super::{IndexError, now_unix};
use crate::item::{WorkItem, WorkItemKey};

/// Owner of the on-disk index for one output root.
///
/// All mutation goes through [`IndexStore::record`] and
/// [`IndexStore::register`], which hold an async mutex across the in-memory
/// update and the full rewrite of the file, so concurrent workers never
/// interleave writes. The store also holds an exclusive advisory lock on
/// `{path}.lock` for its whole lifetime so two processes cannot share an
/// index.
#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    state: Mutex<Index>,
    // Released when the store is dropped.
    _lock: File,
}

impl IndexStore {
    /// Opens (or starts) the index at `path` and takes its process lock.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Locked`] if another process holds the lock, or
    /// [`IndexError::Io`] if the directory or lock file cannot be created or
    /// an existing index cannot be read.
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
        }

        let lock_path = sibling(path, "lock");
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| IndexError::io(&lock_path, e))?;
        lock.try_lock_exclusive()
            .map_err(|_| IndexError::locked(path))?;

        let index = Self::load(path)?;
        info!(records = index.len(), "index loaded");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(index),
            _lock: lock,
        })
    }

    /// Loads the index at `path`.
    ///
    /// A missing file yields an empty index. A malformed file is moved aside
    /// to `{path}.corrupt` and also yields an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Index, IndexError> {
        read_index(path, true)
    }

    /// Reads the index without locking or moving anything on disk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file exists but cannot be read.
    pub fn read_snapshot(path: &Path) -> Result<Index, IndexError> {
        read_index(path, false)
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds `pending` records for items the index has not seen yet.
    ///
    /// Returns the number of new records. Persists once if anything changed.
    ///
    /// # Errors
    ///
    /// Returns the persist error, if any.
    pub async fn register(&self, items: &[WorkItem]) -> Result<usize, IndexError> {
        let mut index = self.state.lock().await;
        let mut added = 0;
        for item in items {
            index
                .records
                .entry(item.key().to_string())
                .or_insert_with(|| {
                    added += 1;
                    DownloadRecord::pending(item)
                });
        }
        if added > 0 {
            index.refresh_summary(now_unix());
            write_atomic(&self.path, &index).await?;
            debug!(added, "registered new work items");
        }
        Ok(added)
    }

    /// Stores the outcome for `key` and persists the index immediately.
    ///
    /// # Errors
    ///
    /// Returns the persist error; the in-memory update is kept regardless.
    pub async fn record(&self, key: &WorkItemKey, record: DownloadRecord) -> Result<(), IndexError> {
        let mut index = self.state.lock().await;
        index.records.insert(key.to_string(), record);
        index.refresh_summary(now_unix());
        write_atomic(&self.path, &index).await
    }

    /// Writes the current index to disk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if serialization or any file operation fails.
    pub async fn persist(&self) -> Result<(), IndexError> {
        let index = self.state.lock().await;
        write_atomic(&self.path, &index).await
    }

    /// Returns a copy of the record for `key`.
    pub async fn get(&self, key: &WorkItemKey) -> Option<DownloadRecord> {
        self.state.lock().await.get(key).cloned()
    }

    /// Returns the current aggregate counters.
    pub async fn summary(&self) -> IndexSummary {
        self.state.lock().await.summary.clone()
    }

    /// Returns every `failed` record, in key order.
    pub async fn failed_records(&self) -> Vec<DownloadRecord> {
        self.state
            .lock()
            .await
            .records
            .values()
            .filter(|r| r.status == DownloadStatus::Failed)
            .cloned()
            .collect()
    }

    /// Returns a copy of the whole index.
    pub async fn snapshot(&self) -> Index {
        self.state.lock().await.clone()
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn read_index(path: &Path, quarantine: bool) -> Result<Index, IndexError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index yet, starting empty");
            return Ok(Index::default());
        }
        Err(e) => return Err(IndexError::io(path, e)),
    };

    match serde_json::from_str::<Index>(&content) {
        Ok(index) => Ok(index),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "index is malformed, starting from an empty index"
            );
            if quarantine {
                let corrupt = sibling(path, "corrupt");
                if let Err(rename_err) = fs::rename(path, &corrupt) {
                    warn!(error = %rename_err, "could not move malformed index aside");
                } else {
                    warn!(moved_to = %corrupt.display(), "malformed index kept for inspection");
                }
            }
            Ok(Index::default())
        }
    }
}

/// Writes `{path}.tmp`, syncs it, then renames it over `path`.
async fn write_atomic(path: &Path, index: &Index) -> Result<(), IndexError> {
    let json = serde_json::to_vec_pretty(index)?;
    let tmp = sibling(path, "tmp");

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| IndexError::io(&tmp, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| IndexError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| IndexError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| IndexError::io(path, e))
}
