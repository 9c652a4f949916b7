// # Differ
//
// Computes the minimal action list that makes the destination's in-scope
// records mirror the source's in-scope records.
//
// Records are matched by identity key `(name, type, value)`:
//
// | source | destination | action |
// |---|---|---|
// | present | absent | Create |
// | present | present, attributes differ | Update |
// | present | present, attributes match | none (unchanged) |
// | absent | present | Delete |
//
// Both sides are filtered through the policy before matching, so a record
// outside the run's scope is never a candidate for any action.
//
// A source record that failed to normalize still claims its `(name, type)`:
// unmatched destination records there are reported as held, never deleted.
//
// CNAME is single-valued per name: an unmatched source CNAME and an unmatched
// destination CNAME at the same name pair into one `value-mismatch` Update
// instead of a Create that the destination would reject.

use super::{ActionReason, HeldSlot, PlanAction, SkippedRecord, SyncPlan};
use crate::policy::{PolicyEngine, SyncScope};
use crate::record::{NormalizedRecord, RecordKey, RecordType};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Build the plan for one domain.
///
/// `source` and `destination` are normalized records in provider order; input
/// order decides which of several duplicates is authoritative.
pub fn diff(
    domain: &str,
    scope: SyncScope,
    source: &[NormalizedRecord],
    destination: &[NormalizedRecord],
    policy: &PolicyEngine<'_>,
) -> SyncPlan {
    diff_holding(domain, scope, source, destination, &[], policy)
}

/// [`diff`], keeping unmatched destination records inside `held`
pub fn diff_holding(
    domain: &str,
    scope: SyncScope,
    source: &[NormalizedRecord],
    destination: &[NormalizedRecord],
    held: &[HeldSlot],
    policy: &PolicyEngine<'_>,
) -> SyncPlan {
    let mut plan = SyncPlan::new(domain, scope);

    // Source: first occurrence of each identity wins
    let mut seen = HashSet::new();
    let mut wanted: Vec<&NormalizedRecord> = Vec::new();
    for record in source.iter().filter(|r| policy.is_in_run_scope(r, scope)) {
        if seen.insert(record.key()) {
            wanted.push(record);
        } else {
            debug!(domain, record = %record, "duplicate source record after normalization");
            plan.skipped.push(SkippedRecord::duplicate(record));
        }
    }

    // Destination: first occurrence is the match candidate, the rest are redundant
    let mut existing: HashMap<RecordKey, &NormalizedRecord> = HashMap::new();
    let mut existing_order: Vec<RecordKey> = Vec::new();
    let mut redundant: Vec<&NormalizedRecord> = Vec::new();
    for record in destination
        .iter()
        .filter(|r| policy.is_managed_type(&r.record_type))
        .filter(|r| policy.is_in_run_scope(r, scope))
    {
        let key = record.key();
        if existing.contains_key(&key) {
            redundant.push(record);
        } else {
            existing_order.push(key.clone());
            existing.insert(key, record);
        }
    }

    let manage_ttl = policy.global().manage_ttl;
    let mut matched: HashSet<RecordKey> = HashSet::new();
    let mut unmatched: Vec<NormalizedRecord> = Vec::new();
    // Position in `plan.actions` reserved for each unmatched source record
    let mut pending: Vec<usize> = Vec::new();

    for record in wanted {
        let mut desired = policy.with_desired_attributes(record);
        let key = desired.key();

        let Some(current) = existing.get(&key) else {
            pending.push(plan.actions.len());
            plan.actions.push(PlanAction::create(desired.clone()));
            unmatched.push(desired);
            continue;
        };
        matched.insert(key);

        let proxy_differs = desired
            .proxied
            .is_some_and(|want| current.proxied.unwrap_or(false) != want);
        let ttl_differs = manage_ttl && desired.ttl.is_some() && desired.ttl != current.ttl;

        if !manage_ttl {
            desired.ttl = current.ttl;
        }
        desired.provider_id = current.provider_id.clone();

        if proxy_differs || ttl_differs {
            let reason = if proxy_differs {
                ActionReason::ProxyMismatch
            } else {
                ActionReason::TtlMismatch
            };
            debug!(domain, record = %desired, %reason, "planning update");
            plan.actions
                .push(PlanAction::update(desired, (*current).clone(), reason));
        } else {
            plan.unchanged += 1;
        }
    }

    pair_single_valued(&mut plan, &pending, &unmatched, &existing, &existing_order, &mut matched);

    for key in &existing_order {
        if matched.contains(key) {
            continue;
        }
        let Some(record) = existing.get(key) else {
            continue;
        };
        if held.iter().any(|slot| slot.holds(record)) {
            debug!(domain, record = %record, "keeping destination record behind malformed source");
            plan.skipped.push(SkippedRecord::held(record));
            continue;
        }
        plan.actions
            .push(PlanAction::delete((*record).clone(), ActionReason::NotInSource));
    }
    for record in redundant {
        plan.actions.push(PlanAction::delete(
            record.clone(),
            ActionReason::DuplicateInDestination,
        ));
    }

    plan
}

/// Turn a planned CNAME create into an update of the unmatched destination
/// CNAME at the same name, when there is exactly one.
fn pair_single_valued(
    plan: &mut SyncPlan,
    pending: &[usize],
    unmatched: &[NormalizedRecord],
    existing: &HashMap<RecordKey, &NormalizedRecord>,
    existing_order: &[RecordKey],
    matched: &mut HashSet<RecordKey>,
) {
    for (slot, desired) in pending.iter().zip(unmatched) {
        if desired.record_type != RecordType::Cname {
            continue;
        }

        let mut candidates = existing_order.iter().filter(|key| {
            key.record_type == RecordType::Cname
                && key.name == desired.name
                && !matched.contains(*key)
        });
        let (Some(key), None) = (candidates.next(), candidates.next()) else {
            continue;
        };
        let Some(current) = existing.get(key) else {
            continue;
        };

        let key = key.clone();
        let mut replacement = desired.clone();
        replacement.provider_id = current.provider_id.clone();
        if replacement.ttl.is_none() {
            replacement.ttl = current.ttl;
        }
        plan.actions[*slot] =
            PlanAction::update(replacement, (*current).clone(), ActionReason::ValueMismatch);
        matched.insert(key);
    }
}
