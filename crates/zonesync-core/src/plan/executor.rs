// # Plan Executor
//
// Applies a plan's actions against the destination.
//
// ## Semantics
//
// - Dry-run: no destination call; counts come straight from the plan
// - Apply: best-effort. Each action succeeds or fails on its own; a failed
//   action is recorded against that action and the remaining actions still run
// - Creates and updates go first, deletes last
// - Every destination call is bounded by a timeout; an elapsed call is a
//   failed action, never a blocked worker

use super::{ActionKind, PlanAction, SyncPlan};
use crate::history::RunCounts;
use crate::record::RecordKey;
use crate::traits::DestinationProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// What happened to one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub record: RecordKey,
    /// Provider error, unredacted; only ever stored through a redactor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of applying (or previewing) a plan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub counts: RunCounts,
    /// One entry per attempted action, in execution order; empty for dry-runs
    pub outcomes: Vec<ActionOutcome>,
    /// Deletes a dry-run would perform; deletes only count once applied
    pub pending_deletes: usize,
}

/// Drives a plan against a destination provider
pub struct PlanExecutor<'a> {
    destination: &'a dyn DestinationProvider,
    timeout: Duration,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(destination: &'a dyn DestinationProvider, timeout: Duration) -> Self {
        Self {
            destination,
            timeout,
        }
    }

    /// Apply `plan`, or only count it when `dry_run` is set
    pub async fn apply(&self, plan: &SyncPlan, dry_run: bool) -> ExecutionResult {
        let mut result = ExecutionResult {
            counts: RunCounts {
                unchanged: plan.unchanged,
                skipped: plan.skipped.len(),
                ..RunCounts::default()
            },
            ..ExecutionResult::default()
        };

        if dry_run {
            result.counts.created = plan.count(ActionKind::Create);
            result.counts.updated = plan.count(ActionKind::Update);
            result.pending_deletes = plan.count(ActionKind::Delete);
            return result;
        }

        let (writes, deletes): (Vec<&PlanAction>, Vec<&PlanAction>) = plan
            .actions
            .iter()
            .partition(|action| action.kind != ActionKind::Delete);

        for action in writes.into_iter().chain(deletes) {
            let outcome = match self.execute(&plan.domain, action).await {
                Ok(()) => {
                    debug!(domain = %plan.domain, action = %action, "Action applied");
                    result.counts.record_success(action.kind);
                    None
                }
                Err(e) => {
                    warn!(domain = %plan.domain, action = %action, error = %e, "Action failed");
                    result.counts.errors += 1;
                    Some(e.to_string())
                }
            };
            result.outcomes.push(ActionOutcome {
                kind: action.kind,
                record: action.record.key(),
                error: outcome,
            });
        }

        result
    }

    async fn execute(&self, domain: &str, action: &PlanAction) -> Result<(), crate::Error> {
        let destination = self.destination;
        let call = async {
            match action.kind {
                ActionKind::Create => destination.create_record(domain, &action.record).await,
                ActionKind::Update => match &action.previous {
                    Some(previous) => {
                        destination
                            .update_record(domain, previous, &action.record)
                            .await
                    }
                    None => Err(crate::Error::apply(
                        destination.provider_name(),
                        "update planned without a previous record",
                    )),
                },
                ActionKind::Delete => destination.delete_record(domain, &action.record).await,
            }
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                crate::Error::Timeout(format!(
                    "{} {} on {} after {}s",
                    action.kind,
                    action.record,
                    destination.provider_name(),
                    self.timeout.as_secs()
                ))
            })?
    }
}
