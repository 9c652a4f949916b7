// # File History Store
//
// JSON file implementation of HistoryStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename, so the file is always a complete document
// - Automatic backup: the previous good file is kept as `.backup`
// - Recovery: a corrupted file falls back to the backup, then to empty history
//
// ## Sharing
//
// The daemon and one-shot CLI commands may use the same file. Every operation
// takes an advisory lock on `<path>.lock` (exclusive to write, shared to read)
// and re-reads the file under it, so an update never overwrites entries
// another process appended in the meantime.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "runs": [
//     {
//       "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
//       "domain": "example.com",
//       "triggered_by": "scheduled",
//       "dry_run": false,
//       "started_at": "2025-01-09T12:00:00Z",
//       "finished_at": "2025-01-09T12:00:03Z",
//       "status": "success",
//       "counts": { "created": 1, "updated": 0, "deleted": 0, "unchanged": 12, "skipped": 0, "errors": 0 },
//       "error_summary": null
//     }
//   ]
// }
// ```
//
// Runs are stored oldest first. The optional retention cap drops the oldest
// finished runs once the file holds more than `max_runs` entries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::memory::{newest_first, replace_running};
use crate::Error;
use crate::history::SyncRun;
use crate::config::HistoryStoreConfig;
use crate::traits::{HistoryStore, HistoryStoreFactory};

/// History file format version
const HISTORY_FILE_VERSION: &str = "1.0";

/// File-based history store with crash recovery
///
/// Every `append` and `complete` re-reads the file and rewrites it through a
/// temporary file and a rename, keeping the previous file as `.backup`.
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    max_runs: Option<usize>,
    /// Orders this process's tasks before they queue on the file lock
    local: RwLock<()>,
}

/// Which advisory lock to hold on the lock file
#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct HistoryFileFormat {
    version: String,
    runs: Vec<SyncRun>,
}

impl FileHistoryStore {
    /// Create or load a file history store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Check the existing history file loads
    /// 3. If it is corrupted, restore the backup instead
    /// 4. If both fail, start with empty history
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create history directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let store = Self {
            path,
            max_runs: None,
            local: RwLock::new(()),
        };
        store.snapshot().await?;
        Ok(store)
    }

    /// Keep at most `max_runs` entries on disk
    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the file, read under a shared lock
    async fn snapshot(&self) -> Result<Vec<SyncRun>, Error> {
        let _local = self.local.read().await;
        let _file = self.lock(LockMode::Shared).await?;
        Self::load_with_recovery(&self.path).await
    }

    /// Re-read, change and rewrite the file under an exclusive lock
    async fn update<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<SyncRun>) -> Result<(), Error>,
    {
        let _local = self.local.write().await;
        let _file = self.lock(LockMode::Exclusive).await?;
        let mut runs = Self::load_with_recovery(&self.path).await?;
        change(&mut runs)?;
        self.apply_retention(&mut runs);
        self.write(&runs).await
    }

    /// Block (off the runtime) until the lock file is held; released on drop
    async fn lock(&self, mode: LockMode) -> Result<std::fs::File, Error> {
        let lock_path = Self::lock_path(&self.path);
        let display = lock_path.display().to_string();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            match mode {
                LockMode::Shared => file.lock_shared()?,
                LockMode::Exclusive => file.lock()?,
            }
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| Error::history_store(format!("History lock task failed: {e}")))?
        .map_err(|e| Error::history_store(format!("Failed to lock {display}: {e}")))
    }

    async fn load_with_recovery(path: &Path) -> Result<Vec<SyncRun>, Error> {
        match Self::load(path).await {
            Ok(runs) => {
                tracing::debug!(runs = runs.len(), path = %path.display(), "Loaded history file");
                Ok(runs)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "History file appears corrupted, attempting recovery from backup"
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No history backup found, starting with empty history");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(runs) => {
                        tracing::info!(runs = runs.len(), "Recovered history from backup");
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!(error = %e, "Failed to restore history file from backup");
                        }
                        Ok(runs)
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "History backup also unreadable, starting with empty history"
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<SyncRun>, Error> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "History file does not exist yet");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history_store(format!(
                "Failed to read history file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: HistoryFileFormat = serde_json::from_str(&content)?;

        if file.version != HISTORY_FILE_VERSION {
            tracing::warn!(
                expected = HISTORY_FILE_VERSION,
                found = %file.version,
                "History file version mismatch, attempting to load anyway"
            );
        }
        Ok(file.runs)
    }

    /// Write `runs` to disk atomically
    async fn write(&self, runs: &[SyncRun]) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&HistoryFileFormat {
            version: HISTORY_FILE_VERSION.to_string(),
            runs: runs.to_vec(),
        })
        .map_err(|e| Error::history_store(format!("Failed to serialize history: {e}")))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::history_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!(error = %e, "Failed to create history backup");
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::history_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %self.path.display(), "History written");
        Ok(())
    }

    fn apply_retention(&self, runs: &mut Vec<SyncRun>) {
        let Some(max) = self.max_runs else {
            return;
        };
        let mut excess = runs.len().saturating_sub(max);
        // Running entries are never evicted; they still have a `complete` coming
        runs.retain(|run| {
            if excess > 0 && run.is_finished() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut lock = path.to_path_buf();
        lock.set_extension("lock");
        lock
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, run: &SyncRun) -> Result<(), Error> {
        self.update(|runs| {
            if runs.iter().any(|stored| stored.id == run.id) {
                return Err(Error::history_store(format!(
                    "history entry {} already exists",
                    run.id
                )));
            }
            runs.push(run.clone());
            Ok(())
        })
        .await
    }

    async fn complete(&self, run: &SyncRun) -> Result<(), Error> {
        self.update(|runs| replace_running(runs, run)).await
    }

    async fn list(&self, domain: &str, limit: usize) -> Result<Vec<SyncRun>, Error> {
        Ok(newest_first(&self.snapshot().await?, domain, limit))
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<SyncRun>, Error> {
        Ok(self.snapshot().await?.into_iter().find(|run| run.id == run_id))
    }
}

/// Factory for [`FileHistoryStore`], registered as `file`
#[derive(Debug, Default)]
pub struct FileHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for FileHistoryStoreFactory {
    async fn create(&self, config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>, Error> {
        match config {
            HistoryStoreConfig::File { path } => Ok(Box::new(FileHistoryStore::new(path).await?)),
            other => Err(Error::config(format!(
                "file history factory cannot build a '{}' store",
                other.type_name()
            ))),
        }
    }
}
