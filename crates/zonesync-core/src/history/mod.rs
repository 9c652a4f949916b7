//! Run history
//!
//! A [`SyncRun`] is created when a run starts and finalised exactly once
//! when it ends. Finalising is the only way to attach error text to a run,
//! and it always goes through a [`Redactor`], so nothing stored in history
//! can carry secret material regardless of what upstream stages produced.

pub mod recorder;
pub mod redact;

pub use recorder::HistoryRecorder;
pub use redact::Redactor;

use crate::plan::{ActionKind, ExecutionResult};
use crate::policy::SyncScope;
use crate::record::RecordKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Standard timer
    Scheduled,
    /// Fast-track timer
    FastTrack,
    /// Operator request
    Manual,
}

impl TriggerKind {
    /// Record subset a run of this kind reconciles
    pub fn scope(&self) -> SyncScope {
        match self {
            TriggerKind::FastTrack => SyncScope::FastTrack,
            TriggerKind::Scheduled | TriggerKind::Manual => SyncScope::Full,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Scheduled => f.write_str("scheduled"),
            TriggerKind::FastTrack => f.write_str("fast_track"),
            TriggerKind::Manual => f.write_str("manual"),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Not finished yet
    Running,
    /// No errors
    Success,
    /// At least one attempted action failed
    PartialFailure,
    /// The run aborted before any action was attempted
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => f.write_str("running"),
            RunStatus::Success => f.write_str("success"),
            RunStatus::PartialFailure => f.write_str("partial_failure"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Aggregate counts of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunCounts {
    /// Record one successful action
    pub fn record_success(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Create => self.created += 1,
            ActionKind::Update => self.updated += 1,
            ActionKind::Delete => self.deleted += 1,
        }
    }

    /// Number of actions that succeeded
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// A failed action as kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub kind: ActionKind,
    pub record: RecordKey,
    /// Redacted provider error
    pub error: String,
}

/// A history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub domain: String,
    pub triggered_by: TriggerKind,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub counts: RunCounts,
    #[serde(default)]
    error_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    failed_actions: Vec<FailedAction>,
}

impl SyncRun {
    /// A run that starts now
    pub fn start(id: Uuid, domain: impl Into<String>, triggered_by: TriggerKind, dry_run: bool) -> Self {
        Self {
            id,
            domain: domain.into(),
            triggered_by,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            error_summary: None,
            failed_actions: Vec::new(),
        }
    }

    /// Redacted error summary; `None` for successful runs
    pub fn error_summary(&self) -> Option<&str> {
        self.error_summary.as_deref()
    }

    /// Per-action failures, errors redacted
    pub fn failed_actions(&self) -> &[FailedAction] {
        &self.failed_actions
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Record subset this run reconciled
    pub fn scope(&self) -> SyncScope {
        self.triggered_by.scope()
    }

    /// Finalise from the executor's result.
    ///
    /// Status is `Success` with zero errors and `PartialFailure` otherwise,
    /// even when every attempted action errored. `Failed` is left to [`fail`].
    ///
    /// [`fail`]: SyncRun::fail
    pub fn finish(mut self, result: &ExecutionResult, redactor: &Redactor) -> Self {
        self.counts = result.counts;
        self.failed_actions = result
            .outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.error.as_ref().map(|error| FailedAction {
                    kind: outcome.kind,
                    record: outcome.record.clone(),
                    error: redactor.redact(error),
                })
            })
            .collect();

        let errors = result.counts.errors;
        self.status = if errors == 0 {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        };

        self.error_summary = self.failed_actions.first().map(|first| {
            let attempted = errors + result.counts.applied();
            redactor.redact(&format!(
                "{errors} of {attempted} actions failed; first: {} {}: {}",
                first.kind, first.record, first.error
            ))
        });
        self.finished_at = Some(Utc::now());
        self
    }

    /// Finalise a run that aborted before any action was attempted
    pub fn fail(mut self, error: &crate::Error, redactor: &Redactor) -> Self {
        self.status = RunStatus::Failed;
        self.error_summary = Some(redactor.redact(&error.to_string()));
        self.finished_at = Some(Utc::now());
        self
    }
}

impl fmt::Display for SyncRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}{}] {}: +{} ~{} -{} ={} skipped {} errors {}",
            self.id,
            self.domain,
            self.triggered_by,
            if self.dry_run { ", dry-run" } else { "" },
            self.status,
            self.counts.created,
            self.counts.updated,
            self.counts.deleted,
            self.counts.unchanged,
            self.counts.skipped,
            self.counts.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ActionOutcome;
    use crate::record::RecordType;

    fn outcome(kind: ActionKind, error: Option<&str>) -> ActionOutcome {
        ActionOutcome {
            kind,
            record: RecordKey {
                name: "www".into(),
                record_type: RecordType::A,
                value: "1.2.3.4".into(),
            },
            error: error.map(str::to_string),
        }
    }

    fn result(outcomes: Vec<ActionOutcome>) -> ExecutionResult {
        let mut counts = RunCounts::default();
        for o in &outcomes {
            match o.error {
                Some(_) => counts.errors += 1,
                None => counts.record_success(o.kind),
            }
        }
        ExecutionResult {
            counts,
            outcomes,
            pending_deletes: 0,
        }
    }

    #[test]
    fn status_from_outcomes() {
        let redactor = Redactor::new();
        let start = || SyncRun::start(Uuid::new_v4(), "example.com", TriggerKind::Manual, false);

        let ok = start().finish(&result(vec![outcome(ActionKind::Create, None)]), &redactor);
        assert_eq!(ok.status, RunStatus::Success);
        assert_eq!(ok.error_summary(), None);

        let empty = start().finish(&result(vec![]), &redactor);
        assert_eq!(empty.status, RunStatus::Success);

        let partial = start().finish(
            &result(vec![
                outcome(ActionKind::Create, None),
                outcome(ActionKind::Update, Some("HTTP 500")),
                outcome(ActionKind::Delete, None),
            ]),
            &redactor,
        );
        assert_eq!(partial.status, RunStatus::PartialFailure);
        assert_eq!(partial.counts.errors, 1);
        assert_eq!(partial.failed_actions().len(), 1);
        assert!(partial.error_summary().unwrap().starts_with("1 of 3 actions failed"));

        // Attempted actions never make a run `Failed`, even when all of them error
        let all_failed = start().finish(&result(vec![outcome(ActionKind::Create, Some("boom"))]), &redactor);
        assert_eq!(all_failed.status, RunStatus::PartialFailure);
        assert!(all_failed.error_summary().unwrap().starts_with("1 of 1 actions failed"));
        assert!(all_failed.finished_at.is_some());
    }

    #[test]
    fn finishing_redacts_errors() {
        let redactor = Redactor::with_secrets(["cf-api-token-value"]);
        let run = SyncRun::start(Uuid::new_v4(), "example.com", TriggerKind::Scheduled, false).finish(
            &result(vec![outcome(
                ActionKind::Create,
                Some("rejected token cf-api-token-value"),
            )]),
            &redactor,
        );
        assert!(!run.failed_actions()[0].error.contains("cf-api-token-value"));
        assert!(!run.error_summary().unwrap().contains("cf-api-token-value"));
    }

    #[test]
    fn fail_redacts_fetch_error() {
        let redactor = Redactor::new();
        let error = crate::Error::fetch("directadmin", "GET failed: password=hunter2");
        let run = SyncRun::start(Uuid::new_v4(), "example.com", TriggerKind::FastTrack, false)
            .fail(&error, &redactor);
        assert_eq!(run.status, RunStatus::Failed);
        assert!(!run.error_summary().unwrap().contains("hunter2"));
        assert_eq!(run.scope(), SyncScope::FastTrack);
    }

    #[test]
    fn serializes_with_snake_case_enums() {
        let run = SyncRun::start(Uuid::nil(), "example.com", TriggerKind::FastTrack, true);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["triggered_by"], "fast_track");
        assert_eq!(json["status"], "running");
        let back: SyncRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }
}
