//! Reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Fetching both sides of a domain through the provider collaborators
//! - Normalizing, filtering and diffing them into a plan
//! - Applying the plan (or stopping at a dry-run preview)
//! - Recording a redacted history entry for every run
//!
//! ## Architecture
//!
//! ```text
//!  ┌────────────────┐      ┌─────────────────────┐
//!  │ SourceProvider │      │ DestinationProvider │
//!  └───────┬────────┘      └──────────┬──────────┘
//!          │ fetch (concurrently)     │
//!          ▼                          ▼
//!       normalize ──► policy filter ──► diff ──► SyncPlan
//!                                                  │
//!                                      dry-run ◄───┤
//!                                                  ▼
//!                                            PlanExecutor
//!                                                  │
//!                                                  ▼
//!                                          HistoryRecorder
//! ```
//!
//! ## Run Flow
//!
//! 1. A trigger takes the domain's lock ([`SyncEngine::begin`])
//! 2. The run re-reads the domain's configuration
//! 3. Fetch failures abort the run before any destination mutation
//! 4. Action failures are recorded per action; the run continues
//! 5. The lock is released when the run's job is dropped

pub mod locks;

pub use locks::{DomainLease, DomainLocks};

use crate::config::{DomainConfig, EngineConfig, GlobalPolicy, canonical_domain};
use crate::error::{Error, Result};
use crate::history::{HistoryRecorder, Redactor, RunStatus, SyncRun, TriggerKind};
use crate::plan::{HeldSlot, PlanExecutor, SkipReason, SyncPlan, diff_holding};
use crate::policy::{PolicyEngine, SyncScope};
use crate::record::{RawRecord, RecordOrigin, normalize_all};
use crate::traits::{ConfigStore, DestinationProvider, HistoryStore, SourceProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduler started
    Started { domains: usize },

    /// A run took its domain's lock and started
    RunStarted {
        run_id: Uuid,
        domain: String,
        trigger: TriggerKind,
    },

    /// A run finished and was recorded
    RunFinished {
        run_id: Uuid,
        domain: String,
        trigger: TriggerKind,
        status: RunStatus,
    },

    /// A trigger was dropped without starting a run
    TriggerSkipped {
        domain: String,
        trigger: TriggerKind,
        reason: String,
    },

    /// Scheduler stopped
    Stopped { reason: String },
}

/// A triggered run waiting for a worker.
///
/// Owns the domain's lease, so the domain stays locked from trigger until the
/// job is executed or dropped.
#[derive(Debug)]
pub struct SyncJob {
    run_id: Uuid,
    trigger: TriggerKind,
    lease: DomainLease,
}

impl SyncJob {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn domain(&self) -> &str {
        self.lease.domain()
    }

    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }
}

/// Core reconciliation engine
///
/// Shared between the scheduler's workers behind an `Arc`; every method
/// takes `&self`.
pub struct SyncEngine {
    /// Authoritative provider
    source: Box<dyn SourceProvider>,

    /// Provider being reconciled
    destination: Box<dyn DestinationProvider>,

    /// Domain configuration, re-read per run
    config_store: Box<dyn ConfigStore>,

    /// Redacting history writer
    recorder: HistoryRecorder,

    /// Loaded once, immutable afterwards
    policy: GlobalPolicy,

    config: EngineConfig,

    locks: DomainLocks,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// Loads and validates the global policy from `config_store`; a bad
    /// policy fails here, never mid-run.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn new(
        source: Box<dyn SourceProvider>,
        destination: Box<dyn DestinationProvider>,
        config_store: Box<dyn ConfigStore>,
        history: Arc<dyn HistoryStore>,
        redactor: Redactor,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let policy = config_store.global_policy().await?;
        policy.validate()?;

        let locks = match &config.lock_dir {
            Some(dir) => DomainLocks::with_lock_dir(dir.clone())?,
            None => DomainLocks::new(),
        };
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            source,
            destination,
            config_store,
            recorder: HistoryRecorder::new(history, redactor),
            policy,
            config,
            locks,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    pub fn policy(&self) -> &GlobalPolicy {
        &self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &DomainLocks {
        &self.locks
    }

    /// Current configuration of every domain
    pub async fn domain_configs(&self) -> Result<Vec<DomainConfig>> {
        self.config_store.domain_configs().await
    }

    /// Take `domain`'s lock for a new run.
    ///
    /// # Returns
    ///
    /// - `Ok(SyncJob)`: The run may proceed; the lock is held by the job
    /// - `Err(Error::UnknownDomain)`: The domain is not configured
    /// - `Err(Error::LockContention)`: A run is already in flight; the trigger is dropped
    pub async fn begin(&self, domain: &str, trigger: TriggerKind) -> Result<SyncJob> {
        let domain = canonical_domain(domain);
        if self.config_store.domain_config(&domain).await?.is_none() {
            return Err(Error::UnknownDomain(domain));
        }

        match self.locks.try_acquire(&domain) {
            Some(lease) => Ok(SyncJob {
                run_id: Uuid::new_v4(),
                trigger,
                lease,
            }),
            None => {
                info!(domain = %domain, trigger = %trigger, "Sync already in progress, trigger skipped");
                self.emit_event(EngineEvent::TriggerSkipped {
                    domain: domain.clone(),
                    trigger,
                    reason: "locked".to_string(),
                });
                Err(Error::LockContention(domain))
            }
        }
    }

    /// Compute the plan for `domain` without touching the destination.
    ///
    /// Runs inline on the caller's task and takes the domain's lock like any
    /// other run; the preview is recorded in history as a dry-run.
    pub async fn preview_plan(&self, domain: &str) -> Result<SyncPlan> {
        let job = self.begin(domain, TriggerKind::Manual).await?;
        let (_, plan) = self.run_job(job, true).await;
        plan
    }

    /// Run a manual apply for `domain` inline and wait for it to finish
    pub async fn sync_now(&self, domain: &str) -> Result<SyncRun> {
        let job = self.begin(domain, TriggerKind::Manual).await?;
        Ok(self.execute(job).await)
    }

    /// Execute a triggered job; the domain is released when this returns
    pub async fn execute(&self, job: SyncJob) -> SyncRun {
        self.run_job(job, false).await.0
    }

    /// Most recent runs of `domain`, newest first
    ///
    /// `limit` defaults to `history_limit_default`.
    pub async fn get_history(&self, domain: &str, limit: Option<usize>) -> Result<Vec<SyncRun>> {
        let limit = limit.unwrap_or(self.config.history_limit_default);
        self.recorder
            .store()
            .list(&canonical_domain(domain), limit)
            .await
    }

    /// A single run by id
    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<SyncRun>> {
        self.recorder.store().get(run_id).await
    }

    #[instrument(
        skip(self, job),
        fields(domain = %job.domain(), run_id = %job.run_id, trigger = %job.trigger)
    )]
    async fn run_job(&self, job: SyncJob, dry_run: bool) -> (SyncRun, Result<SyncPlan>) {
        let domain = job.domain().to_string();
        let run = SyncRun::start(job.run_id, &domain, job.trigger, dry_run);
        self.recorder.start(&run).await;
        self.emit_event(EngineEvent::RunStarted {
            run_id: job.run_id,
            domain: domain.clone(),
            trigger: job.trigger,
        });
        info!(dry_run, "Run started");

        let plan = match self.plan_for(&domain, job.trigger.scope()).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "Run failed before any destination change");
                let run = self.recorder.fail(run, &e).await;
                self.finished(&run);
                return (run, Err(e));
            }
        };
        info!(plan = %plan, "Plan computed");

        let executor = PlanExecutor::new(self.destination.as_ref(), self.config.provider_timeout());
        let result = executor.apply(&plan, dry_run).await;
        let run = self.recorder.finish(run, &result).await;

        match run.status {
            RunStatus::Success => info!(
                created = run.counts.created,
                updated = run.counts.updated,
                deleted = run.counts.deleted,
                unchanged = run.counts.unchanged,
                skipped = run.counts.skipped,
                "Run finished"
            ),
            _ => warn!(
                status = %run.status,
                errors = run.counts.errors,
                applied = run.counts.applied(),
                "Run finished with errors"
            ),
        }
        self.finished(&run);

        // `job` (and with it the domain lease) is dropped here
        drop(job);
        (run, Ok(plan))
    }

    /// Fetch, normalize and diff one domain
    async fn plan_for(&self, domain: &str, scope: SyncScope) -> Result<SyncPlan> {
        let config = self
            .config_store
            .domain_config(domain)
            .await?
            .ok_or_else(|| Error::UnknownDomain(domain.to_string()))?;

        let timeout = self.config.provider_timeout();
        let pointer_base = config.pointer_base();
        let source_fetch = async {
            match &pointer_base {
                Some(base) => self.source.fetch_pointer_records(domain, base).await,
                None => self.source.fetch_records(domain).await,
            }
        };
        let (source_raw, destination_raw) = tokio::join!(
            fetch_with_timeout(self.source.provider_name(), timeout, source_fetch),
            fetch_with_timeout(
                self.destination.provider_name(),
                timeout,
                self.destination.fetch_records(domain)
            ),
        );
        let source_raw = source_raw?;
        let destination_raw = destination_raw?;
        debug!(
            source = source_raw.len(),
            destination = destination_raw.len(),
            "Fetched records"
        );

        let (source, source_malformed) = normalize_all(&source_raw, domain, RecordOrigin::Source);
        let (destination, destination_malformed) =
            normalize_all(&destination_raw, domain, RecordOrigin::Destination);
        for malformed in source_malformed.iter().chain(&destination_malformed) {
            warn!(error = %malformed, "Skipping malformed record");
        }

        let policy = PolicyEngine::new(&self.policy, &config);
        let held = HeldSlot::from_malformed(&source_malformed, domain);
        let mut plan = diff_holding(domain, scope, &source, &destination, &held, &policy);
        plan.record_malformed(&source_malformed);
        plan.record_malformed(&destination_malformed);
        for skipped in &plan.skipped {
            match skipped.reason {
                SkipReason::DuplicateAfterNormalization => {
                    warn!(detail = %skipped.detail, "Skipping duplicate source record")
                }
                SkipReason::HeldByMalformedSource => {
                    warn!(detail = %skipped.detail, "Keeping destination record")
                }
                SkipReason::Malformed => {}
            }
        }
        Ok(plan)
    }

    fn finished(&self, run: &SyncRun) {
        self.emit_event(EngineEvent::RunFinished {
            run_id: run.id,
            domain: run.domain.clone(),
            trigger: run.triggered_by,
            status: run.status,
        });
    }

    /// Emit an engine event
    ///
    /// Never blocks: when the channel is full the event is dropped with a
    /// warning.
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, event discarded");
            }
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("source", &self.source.provider_name())
            .field("destination", &self.destination.provider_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bound a fetch by `timeout` and report every failure as a fetch error
async fn fetch_with_timeout<F>(provider: &str, timeout: Duration, fetch: F) -> Result<Vec<RawRecord>>
where
    F: Future<Output = Result<Vec<RawRecord>>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e @ Error::Fetch { .. })) => Err(e),
        Ok(Err(e)) => Err(Error::fetch(provider, e.to_string())),
        Err(_) => Err(Error::fetch(
            provider,
            format!("timed out after {}s", timeout.as_secs()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::TriggerSkipped {
            domain: "example.com".to_string(),
            trigger: TriggerKind::Manual,
            reason: "locked".to_string(),
        };
        assert_eq!(event.clone(), event);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_becomes_fetch_error() {
        let result = fetch_with_timeout("slow", Duration::from_secs(5), async {
            std::future::pending::<()>().await;
            Ok(Vec::new())
        })
        .await;
        assert!(matches!(result, Err(Error::Fetch { ref provider, .. }) if provider == "slow"));
    }

    #[tokio::test]
    async fn non_fetch_errors_are_wrapped() {
        let result = fetch_with_timeout("cloudflare", Duration::from_secs(5), async {
            Err(Error::auth("bad token"))
        })
        .await;
        match result {
            Err(Error::Fetch { provider, message }) => {
                assert_eq!(provider, "cloudflare");
                assert!(message.contains("bad token"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
