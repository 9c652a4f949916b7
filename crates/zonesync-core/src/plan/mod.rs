//! Sync plans
//!
//! A [`SyncPlan`] is the ordered list of create/update/delete actions that
//! brings a destination zone's in-scope records into agreement with the
//! source. Plans are built per run by [`diff`], consumed by [`PlanExecutor`]
//! or returned as a dry-run preview, and never persisted.

pub mod diff;
pub mod executor;

pub use diff::{diff, diff_holding};
pub use executor::{ActionOutcome, ExecutionResult, PlanExecutor};

use crate::error::MalformedRecordError;
use crate::policy::SyncScope;
use crate::record::{NormalizedRecord, RawRecord, RecordKey, RecordType, malformed_slot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an action does to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => f.write_str("create"),
            ActionKind::Update => f.write_str("update"),
            ActionKind::Delete => f.write_str("delete"),
        }
    }
}

/// Why an action was planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionReason {
    /// Source record has no destination counterpart
    NotInDestination,
    /// Single-valued record (CNAME) whose target changed
    ValueMismatch,
    /// Destination proxied flag differs from policy
    ProxyMismatch,
    /// Destination TTL differs from source (only when TTL is managed)
    TtlMismatch,
    /// Destination record has no source counterpart
    NotInSource,
    /// Redundant destination copy of an already-matched record
    DuplicateInDestination,
}

impl ActionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionReason::NotInDestination => "not-in-destination",
            ActionReason::ValueMismatch => "value-mismatch",
            ActionReason::ProxyMismatch => "proxy-mismatch",
            ActionReason::TtlMismatch => "ttl-mismatch",
            ActionReason::NotInSource => "not-in-source",
            ActionReason::DuplicateInDestination => "duplicate-in-destination",
        }
    }
}

impl fmt::Display for ActionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a plan.
///
/// For `Create` and `Update`, `record` is the complete desired record so the
/// executor can issue a full replace. For `Delete`, `record` is the destination
/// record being removed. `previous` is the destination record an update
/// replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAction {
    pub kind: ActionKind,
    pub record: NormalizedRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<NormalizedRecord>,
    pub reason: ActionReason,
}

impl PlanAction {
    pub fn create(record: NormalizedRecord) -> Self {
        Self {
            kind: ActionKind::Create,
            record,
            previous: None,
            reason: ActionReason::NotInDestination,
        }
    }

    pub fn update(desired: NormalizedRecord, previous: NormalizedRecord, reason: ActionReason) -> Self {
        Self {
            kind: ActionKind::Update,
            record: desired,
            previous: Some(previous),
            reason,
        }
    }

    pub fn delete(record: NormalizedRecord, reason: ActionReason) -> Self {
        Self {
            kind: ActionKind::Delete,
            record,
            previous: None,
            reason,
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.record, self.reason)
    }
}

/// Why a record was left out of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// A later source record normalized to an identity already seen
    DuplicateAfterNormalization,
    /// The provider payload could not be normalized
    Malformed,
    /// Destination record kept because its source counterpart is malformed
    HeldByMalformedSource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DuplicateAfterNormalization => f.write_str("duplicate-after-normalization"),
            SkipReason::Malformed => f.write_str("malformed"),
            SkipReason::HeldByMalformedSource => f.write_str("held-by-malformed-source"),
        }
    }
}

/// A record the plan deliberately ignored, surfaced in previews and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub reason: SkipReason,
    /// Identity of the skipped record, when it normalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,
    /// Raw payload, when it did not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawRecord>,
    pub detail: String,
}

impl SkippedRecord {
    pub fn duplicate(record: &NormalizedRecord) -> Self {
        Self {
            reason: SkipReason::DuplicateAfterNormalization,
            key: Some(record.key()),
            raw: None,
            detail: format!("{record} normalizes to an identity already present in the source"),
        }
    }

    pub fn malformed(err: &MalformedRecordError) -> Self {
        Self {
            reason: SkipReason::Malformed,
            key: None,
            raw: Some(err.raw.clone()),
            detail: err.to_string(),
        }
    }

    pub fn held(record: &NormalizedRecord) -> Self {
        Self {
            reason: SkipReason::HeldByMalformedSource,
            key: Some(record.key()),
            raw: None,
            detail: format!("{record} kept: the source has a malformed record at this name and type"),
        }
    }
}

/// A `(name, type)` the source has a record for, but one that failed to
/// normalize. Unmatched destination records in it are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldSlot {
    pub name: String,
    /// `None` holds every type at `name`
    pub record_type: Option<RecordType>,
}

impl HeldSlot {
    /// Slots for the malformed source records of `zone`
    pub fn from_malformed(malformed: &[MalformedRecordError], zone: &str) -> Vec<Self> {
        malformed
            .iter()
            .filter_map(|err| malformed_slot(&err.raw, zone))
            .map(|(name, record_type)| Self { name, record_type })
            .collect()
    }

    pub fn holds(&self, record: &NormalizedRecord) -> bool {
        self.name == record.name
            && self
                .record_type
                .as_ref()
                .is_none_or(|record_type| *record_type == record.record_type)
    }
}

/// Ordered actions for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub domain: String,
    pub scope: SyncScope,
    pub generated_at: DateTime<Utc>,
    /// Creates and updates in source order, then deletes
    pub actions: Vec<PlanAction>,
    /// Matched records needing no change
    pub unchanged: usize,
    #[serde(default)]
    pub skipped: Vec<SkippedRecord>,
}

impl SyncPlan {
    pub fn new(domain: impl Into<String>, scope: SyncScope) -> Self {
        Self {
            domain: domain.into(),
            scope,
            generated_at: Utc::now(),
            actions: Vec::new(),
            unchanged: 0,
            skipped: Vec::new(),
        }
    }

    /// Number of actions of the given kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Whether applying the plan would change nothing
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Add skipped-record entries for payloads rejected by the normalizer
    pub fn record_malformed(&mut self, malformed: &[MalformedRecordError]) {
        self.skipped.extend(malformed.iter().map(SkippedRecord::malformed));
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} create, {} update, {} delete, {} unchanged, {} skipped",
            self.domain,
            self.scope,
            self.count(ActionKind::Create),
            self.count(ActionKind::Update),
            self.count(ActionKind::Delete),
            self.unchanged,
            self.skipped.len()
        )
    }
}
