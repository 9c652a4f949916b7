// # History Recorder
//
// The single choke point between the engine and the history store. A run is
// appended when it starts and completed when it ends; completion always
// finalises the entry through the recorder's redactor first.

use super::{Redactor, SyncRun};
use crate::plan::ExecutionResult;
use crate::traits::HistoryStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes redacted run history
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    redactor: Redactor,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, redactor: Redactor) -> Self {
        Self { store, redactor }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Persist a run that has just started.
    ///
    /// A store failure is logged and swallowed: history is an audit trail, and
    /// losing an entry must not stop the run itself.
    pub async fn start(&self, run: &SyncRun) {
        if let Err(e) = self.store.append(run).await {
            warn!(run_id = %run.id, domain = %run.domain, error = %e, "Failed to record run start");
        }
    }

    /// Finalise a run from its execution result and persist it
    pub async fn finish(&self, run: SyncRun, result: &ExecutionResult) -> SyncRun {
        let run = run.finish(result, &self.redactor);
        self.complete(&run).await;
        run
    }

    /// Finalise a run that aborted before any action and persist it
    pub async fn fail(&self, run: SyncRun, error: &crate::Error) -> SyncRun {
        let run = run.fail(error, &self.redactor);
        self.complete(&run).await;
        run
    }

    async fn complete(&self, run: &SyncRun) {
        match self.store.complete(run).await {
            Ok(()) => debug!(run_id = %run.id, status = %run.status, "Run recorded"),
            Err(e) => {
                warn!(run_id = %run.id, domain = %run.domain, error = %e, "Failed to record run completion")
            }
        }
    }
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("redactor", &self.redactor)
            .finish_non_exhaustive()
    }
}
