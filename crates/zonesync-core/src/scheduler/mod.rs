// # Domain Scheduler
//
// Drives the engine from per-domain timers and manual triggers.
//
// ## Timers
//
// Every enabled domain has two independent timers:
// - standard: every `sync_interval` (domain override or engine default),
//   triggers a full run (`Scheduled`)
// - fast-track: every `fast_track_interval`, triggers a run over the
//   fast-track subset (`FastTrack`)
//
// Both first fire one interval after the domain is first seen. Domain
// configuration is re-read from the config store on every wake-up, so
// disabled, removed or re-timed domains take effect without a restart.
//
// ## Concurrency
//
// ```text
// timers ─┐
//         ├─► begin (domain lock) ─► bounded queue ─► worker pool (N permits) ─► engine
// manual ─┘
// ```
//
// - Per-domain lock: a trigger for a locked domain is dropped, not queued
// - Queue: `queue_capacity` pending runs; a full queue rejects the trigger
// - Pool: at most `sync_concurrency` runs execute at once
//
// ## Shutdown
//
// On the shutdown signal the timers stop, queued jobs are dropped (releasing
// their domains) and in-flight runs are allowed to finish.

use crate::config::{DomainConfig, canonical_domain};
use crate::engine::{EngineEvent, SyncEngine, SyncJob};
use crate::error::{Error, Result};
use crate::history::TriggerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound between two config store reads
const CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Next due runs of a domain, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRuns {
    pub standard: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_track: Option<DateTime<Utc>>,
}

impl NextRuns {
    /// The earlier of the two timers
    pub fn earliest(&self) -> DateTime<Utc> {
        match self.fast_track {
            Some(fast) if fast < self.standard => fast,
            _ => self.standard,
        }
    }
}

/// Outcome of one manual trigger in [`Scheduler::trigger_all`]
#[derive(Debug)]
pub struct TriggerOutcome {
    pub domain: String,
    pub result: Result<Uuid>,
}

#[derive(Debug, Clone, Copy)]
struct DomainTimers {
    standard_every: Duration,
    next_standard: Instant,
    fast_every: Option<Duration>,
    next_fast: Option<Instant>,
}

impl DomainTimers {
    fn new(now: Instant, standard_every: Duration, fast_every: Option<Duration>) -> Self {
        Self {
            standard_every,
            next_standard: now + standard_every,
            fast_every,
            next_fast: fast_every.map(|every| now + every),
        }
    }

    /// Pick up interval changes; a changed timer restarts from `now`
    fn retime(&mut self, now: Instant, standard_every: Duration, fast_every: Option<Duration>) {
        if standard_every != self.standard_every {
            self.standard_every = standard_every;
            self.next_standard = now + standard_every;
        }
        if fast_every != self.fast_every {
            self.fast_every = fast_every;
            self.next_fast = fast_every.map(|every| now + every);
        }
    }

    fn next_due(&self) -> Instant {
        match self.next_fast {
            Some(fast) => fast.min(self.next_standard),
            None => self.next_standard,
        }
    }
}

/// Timer loop, bounded queue and worker pool around a [`SyncEngine`]
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    job_tx: mpsc::Sender<SyncJob>,
    job_rx: Mutex<Option<mpsc::Receiver<SyncJob>>>,
    timers: Mutex<HashMap<String, DomainTimers>>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let (job_tx, job_rx) = mpsc::channel(engine.config().queue_capacity);
        Self {
            engine,
            job_tx,
            job_rx: Mutex::new(Some(job_rx)),
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Enqueue a manual apply of `domain`.
    ///
    /// Disabled domains may still be synced manually.
    ///
    /// # Returns
    ///
    /// - `Ok(Uuid)`: The id the run will be recorded under
    /// - `Err(Error::UnknownDomain)`: Not configured
    /// - `Err(Error::LockContention)`: A run is in flight; trigger dropped
    /// - `Err(Error::QueueFull)`: No room in the queue
    pub async fn trigger_sync(&self, domain: &str) -> Result<Uuid> {
        self.trigger(domain, TriggerKind::Manual).await
    }

    /// Manual trigger for every enabled domain
    pub async fn trigger_all(&self) -> Result<Vec<TriggerOutcome>> {
        let configs = self.engine.domain_configs().await?;
        let mut outcomes = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            let domain = config.name();
            let result = self.trigger(&domain, TriggerKind::Manual).await;
            outcomes.push(TriggerOutcome { domain, result });
        }
        Ok(outcomes)
    }

    /// Next due runs of `domain`; `None` when it has no timers
    pub fn next_runs(&self, domain: &str) -> Option<NextRuns> {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = timers.get(&canonical_domain(domain))?;
        let now = Instant::now();
        let wall = Utc::now();
        let to_wall = |at: Instant| {
            wall + chrono::Duration::from_std(at.saturating_duration_since(now))
                .unwrap_or_else(|_| chrono::Duration::zero())
        };
        Some(NextRuns {
            standard: to_wall(entry.next_standard),
            fast_track: entry.next_fast.map(to_wall),
        })
    }

    /// Run the scheduler until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The scheduler was already running, or the config store failed at startup
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the scheduler until `shutdown_rx` fires (or Ctrl-C when `None`)
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut jobs = self
            .job_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Other("scheduler is already running".to_string()))?;

        let concurrency = self.engine.config().sync_concurrency;
        let pool = Arc::new(Semaphore::new(concurrency));

        let configs = self.engine.domain_configs().await?;
        let scheduled = self.refresh_timers(&configs, Instant::now());
        info!(domains = scheduled, concurrency, "Scheduler started");
        self.engine.emit_event(EngineEvent::Started { domains: scheduled });

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            let wake = self.next_wake(Instant::now());
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = sleep_until(wake) => {
                    self.tick(Instant::now()).await;
                }

                Some((permit, job)) = next_job(&pool, &mut jobs) => {
                    let engine = Arc::clone(&self.engine);
                    debug!(domain = %job.domain(), run_id = %job.run_id(), "Dispatching run");
                    tokio::spawn(async move {
                        let _permit = permit;
                        engine.execute(job).await;
                    });
                }
            }
        }

        jobs.close();
        let mut dropped = 0usize;
        while let Ok(job) = jobs.try_recv() {
            debug!(domain = %job.domain(), run_id = %job.run_id(), "Dropping queued run");
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Queued runs dropped at shutdown");
        }

        info!("Waiting for in-flight runs to complete...");
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let _ = pool.acquire_many(permits).await;

        self.engine.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Scheduler stopped");
        Ok(())
    }

    async fn trigger(&self, domain: &str, trigger: TriggerKind) -> Result<Uuid> {
        let job = self.engine.begin(domain, trigger).await?;
        let run_id = job.run_id();

        match self.job_tx.try_send(job) {
            Ok(()) => {
                debug!(domain = %canonical_domain(domain), %run_id, %trigger, "Run queued");
                Ok(run_id)
            }
            // The rejected job is dropped here, releasing the domain
            Err(mpsc::error::TrySendError::Full(job)) => {
                let domain = job.domain().to_string();
                self.engine.emit_event(EngineEvent::TriggerSkipped {
                    domain: domain.clone(),
                    trigger,
                    reason: "queue full".to_string(),
                });
                Err(Error::QueueFull(domain))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::Other("scheduler has stopped".to_string()))
            }
        }
    }

    /// Re-read configuration and fire every due timer
    async fn tick(&self, now: Instant) {
        // An empty list clears every timer; a read failure keeps them
        match self.engine.domain_configs().await {
            Ok(configs) => {
                self.refresh_timers(&configs, now);
            }
            Err(e) => {
                error!(error = %e, "Failed to read domain configuration, keeping current timers");
            }
        }

        let due: Vec<(String, TriggerKind)> = {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            let mut due = Vec::new();
            for (domain, entry) in timers.iter_mut() {
                let standard_due = entry.next_standard <= now;
                if standard_due {
                    entry.next_standard = now + entry.standard_every;
                    due.push((domain.clone(), TriggerKind::Scheduled));
                }
                if let (Some(next), Some(every)) = (entry.next_fast, entry.fast_every) {
                    if next <= now {
                        entry.next_fast = Some(now + every);
                        // A full run already covers the fast-track subset
                        if !standard_due {
                            due.push((domain.clone(), TriggerKind::FastTrack));
                        }
                    }
                }
            }
            due
        };

        for (domain, trigger) in due {
            match self.trigger(&domain, trigger).await {
                Ok(run_id) => debug!(domain = %domain, %run_id, %trigger, "Timer fired"),
                Err(e) if e.is_lock_contention() => {}
                Err(Error::QueueFull(_)) => {
                    warn!(domain = %domain, %trigger, "Sync queue full, scheduled run dropped")
                }
                Err(e) => warn!(domain = %domain, %trigger, error = %e, "Scheduled trigger failed"),
            }
        }
    }

    /// Bring the timer table in line with `configs`; returns the number of
    /// domains with timers
    fn refresh_timers(&self, configs: &[DomainConfig], now: Instant) -> usize {
        let engine_config = self.engine.config();
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);

        let enabled: HashMap<String, &DomainConfig> = configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.name(), c))
            .collect();
        timers.retain(|domain, _| {
            let keep = enabled.contains_key(domain);
            if !keep {
                info!(domain = %domain, "Domain disabled or removed, timers stopped");
            }
            keep
        });

        for (domain, config) in &enabled {
            let standard = config.sync_interval(engine_config);
            let fast = config.fast_track_interval(engine_config);
            timers
                .entry(domain.clone())
                .and_modify(|entry| entry.retime(now, standard, fast))
                .or_insert_with(|| {
                    info!(
                        domain = %domain,
                        interval_secs = standard.as_secs(),
                        fast_track_secs = fast.map(|d| d.as_secs()),
                        "Domain scheduled"
                    );
                    DomainTimers::new(now, standard, fast)
                });
        }
        timers.len()
    }

    fn next_wake(&self, now: Instant) -> Instant {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers
            .values()
            .map(DomainTimers::next_due)
            .chain(std::iter::once(now + CONFIG_REFRESH_INTERVAL))
            .min()
            .unwrap_or(now + CONFIG_REFRESH_INTERVAL)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Wait for a free worker, then for a queued job
async fn next_job(
    pool: &Arc<Semaphore>,
    jobs: &mut mpsc::Receiver<SyncJob>,
) -> Option<(tokio::sync::OwnedSemaphorePermit, SyncJob)> {
    let permit = Arc::clone(pool).acquire_owned().await.ok()?;
    let job = jobs.recv().await?;
    Some((permit, job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_first_fire_one_interval_out() {
        let now = Instant::now();
        let timers = DomainTimers::new(now, Duration::from_secs(900), Some(Duration::from_secs(300)));
        assert_eq!(timers.next_standard, now + Duration::from_secs(900));
        assert_eq!(timers.next_due(), now + Duration::from_secs(300));
    }

    #[test]
    fn retime_only_resets_changed_timers() {
        let start = Instant::now();
        let mut timers = DomainTimers::new(start, Duration::from_secs(900), Some(Duration::from_secs(300)));
        let later = start + Duration::from_secs(100);

        timers.retime(later, Duration::from_secs(900), Some(Duration::from_secs(60)));
        assert_eq!(timers.next_standard, start + Duration::from_secs(900));
        assert_eq!(timers.next_fast, Some(later + Duration::from_secs(60)));

        timers.retime(later, Duration::from_secs(900), None);
        assert_eq!(timers.next_fast, None);
        assert_eq!(timers.next_due(), start + Duration::from_secs(900));
    }

    #[test]
    fn next_runs_earliest() {
        let standard = Utc::now();
        let runs = NextRuns {
            standard,
            fast_track: Some(standard - chrono::Duration::minutes(5)),
        };
        assert_eq!(runs.earliest(), standard - chrono::Duration::minutes(5));
    }
}
