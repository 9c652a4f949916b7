// # History Store Trait
//
// Defines the interface for persisting run history.
//
// ## Lifecycle of an entry
//
// 1. `append` when the run starts (status `running`)
// 2. `complete` when the run ends; the entry is immutable afterwards
//
// Entries only ever reach a store through the history recorder, which
// redacts them when they are finalised.
//
// ## Implementations
//
// - In-memory: [`crate::store::MemoryHistoryStore`]
// - JSON file: [`crate::store::FileHistoryStore`]

use crate::history::SyncRun;
use async_trait::async_trait;
use uuid::Uuid;

/// Trait for history store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple workers.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record a run that has just started
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Stored
    /// - `Err(Error::HistoryStore)`: A run with the same id already exists, or storage failed
    async fn append(&self, run: &SyncRun) -> Result<(), crate::Error>;

    /// Replace a running entry with its finalised form
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Stored
    /// - `Err(Error::NotFound)`: No entry with this id
    /// - `Err(Error::HistoryStore)`: The stored entry is already finished
    async fn complete(&self, run: &SyncRun) -> Result<(), crate::Error>;

    /// Most recent runs of `domain`, newest first
    async fn list(&self, domain: &str, limit: usize) -> Result<Vec<SyncRun>, crate::Error>;

    /// A single run by id
    async fn get(&self, run_id: Uuid) -> Result<Option<SyncRun>, crate::Error>;
}

/// Helper trait for constructing history stores from configuration
///
/// Creation is async because persistent stores load existing history first.
#[async_trait]
pub trait HistoryStoreFactory: Send + Sync {
    /// Create a HistoryStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::HistoryStoreConfig,
    ) -> Result<Box<dyn HistoryStore>, crate::Error>;
}
