// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// ## Crash Behavior
//
// - All history is lost on restart
// - Runs that were in flight at shutdown simply disappear
//
// ## When to Use
//
// - Testing environments
// - Deployments where the audit trail is shipped elsewhere through logs

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Error;
use crate::config::canonical_domain;
use crate::history::SyncRun;
use crate::config::HistoryStoreConfig;
use crate::traits::{HistoryStore, HistoryStoreFactory};

/// In-memory history store
///
/// Entries are kept in insertion order in a `Vec` behind a `RwLock`; `list`
/// walks it backwards so the newest run comes first.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<Vec<SyncRun>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs, across all domains
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Shared `complete` rule: the entry must exist and still be running
pub(crate) fn replace_running(runs: &mut [SyncRun], run: &SyncRun) -> Result<(), Error> {
    let slot = runs
        .iter_mut()
        .find(|stored| stored.id == run.id)
        .ok_or_else(|| Error::not_found(format!("history entry {}", run.id)))?;
    if slot.is_finished() {
        return Err(Error::history_store(format!(
            "history entry {} is already finalised",
            run.id
        )));
    }
    *slot = run.clone();
    Ok(())
}

pub(crate) fn newest_first(runs: &[SyncRun], domain: &str, limit: usize) -> Vec<SyncRun> {
    let domain = canonical_domain(domain);
    runs.iter()
        .rev()
        .filter(|run| run.domain == domain)
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, run: &SyncRun) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.iter().any(|stored| stored.id == run.id) {
            return Err(Error::history_store(format!(
                "history entry {} already exists",
                run.id
            )));
        }
        guard.push(run.clone());
        Ok(())
    }

    async fn complete(&self, run: &SyncRun) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        replace_running(&mut guard, run)
    }

    async fn list(&self, domain: &str, limit: usize) -> Result<Vec<SyncRun>, Error> {
        let guard = self.inner.read().await;
        Ok(newest_first(&guard, domain, limit))
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<SyncRun>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.iter().find(|run| run.id == run_id).cloned())
    }
}

/// Factory for [`MemoryHistoryStore`], registered as `memory`
#[derive(Debug, Default)]
pub struct MemoryHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for MemoryHistoryStoreFactory {
    async fn create(&self, _config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>, Error> {
        Ok(Box::new(MemoryHistoryStore::new()))
    }
}
