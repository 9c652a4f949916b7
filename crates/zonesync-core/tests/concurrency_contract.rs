//! Contract Test: Per-Domain Exclusion & Worker Pool
//!
//! Constraints verified:
//! - While a run is in flight, further triggers for that domain are dropped
//!   (exactly 1 running + N skipped, never N+1 runs)
//! - At most `sync_concurrency` runs execute at once
//! - A full queue rejects the trigger and releases the domain
//! - Shutdown drops queued runs and waits for in-flight ones
//! - Engines sharing a lock directory (daemon and CLI) exclude each other
//!
//! If this test fails, a slow destination API can pile up overlapping runs.

mod common;

use common::*;
use std::sync::Arc;
use tokio::sync::oneshot;
use zonesync_core::config::{DomainConfig, EngineConfig, GlobalPolicy};
use zonesync_core::traits::HistoryStore;
use zonesync_core::{EngineEvent, Error, RunStatus, Scheduler, TriggerKind};

fn three_domains() -> Vec<DomainConfig> {
    ["example.com", "example.org", "example.net"]
        .into_iter()
        .map(DomainConfig::new)
        .collect()
}

fn start(scheduler: &Arc<Scheduler>) -> (oneshot::Sender<()>, tokio::task::JoinHandle<zonesync_core::Result<()>>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = Arc::clone(scheduler);
    let handle = tokio::spawn(async move { runner.run_with_shutdown(Some(shutdown_rx)).await });
    (shutdown_tx, handle)
}

#[tokio::test]
async fn triggers_for_a_busy_domain_are_skipped() {
    let source = FakeSource::new(vec![raw("www", "A", "1.2.3.4")]);
    let destination = FakeDestination::gated(vec![]);
    let mut h = harness(&source, &destination, GlobalPolicy::default(), single_domain(), EngineConfig::default()).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    let run_id = scheduler.trigger_sync(ZONE).await.unwrap();
    wait_until(|| destination.fetch_call_count() == 1, "the first run to fetch").await;

    let mut skipped = 0;
    for _ in 0..5 {
        match scheduler.trigger_sync(ZONE).await {
            Err(e) if e.is_lock_contention() => skipped += 1,
            other => panic!("expected lock contention, got {other:?}"),
        }
    }
    assert_eq!(skipped, 5);

    destination.open_gate();
    wait_for_runs(&h.history, ZONE, 1).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(destination.fetch_call_count(), 1);
    assert_eq!(destination.create_call_count(), 1);
    let history = h.history.list(ZONE, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, run_id);
    assert_eq!(history[0].status, RunStatus::Success);

    let skips = drain_events(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::TriggerSkipped { trigger: TriggerKind::Manual, .. }))
        .count();
    assert_eq!(skips, 5);
}

#[tokio::test]
async fn the_domain_is_released_once_its_run_finishes() {
    let source = FakeSource::new(vec![raw("www", "A", "1.2.3.4")]);
    let destination = FakeDestination::default();
    let h = harness(&source, &destination, GlobalPolicy::default(), single_domain(), EngineConfig::default()).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    scheduler.trigger_sync(ZONE).await.unwrap();
    wait_for_runs(&h.history, ZONE, 1).await;
    wait_until(|| !h.engine.locks().is_locked(ZONE), "the domain lock to be released").await;

    scheduler.trigger_sync(ZONE).await.unwrap();
    wait_for_runs(&h.history, ZONE, 2).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn engines_sharing_a_lock_dir_exclude_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let config = || EngineConfig {
        lock_dir: Some(dir.path().join("locks")),
        ..EngineConfig::default()
    };
    let source = FakeSource::new(vec![raw("www", "A", "1.2.3.4")]);
    let daemon_destination = FakeDestination::gated(vec![]);
    let cli_destination = FakeDestination::default();
    let daemon = harness(&source, &daemon_destination, GlobalPolicy::default(), single_domain(), config()).await;
    let cli = harness(&source, &cli_destination, GlobalPolicy::default(), single_domain(), config()).await;

    let engine = Arc::clone(&daemon.engine);
    let in_flight = tokio::spawn(async move { engine.sync_now(ZONE).await });
    wait_until(|| daemon_destination.fetch_call_count() == 1, "the daemon run to fetch").await;

    let err = cli.engine.sync_now(ZONE).await.unwrap_err();
    assert!(err.is_lock_contention());
    assert_eq!(cli_destination.fetch_call_count(), 0);

    daemon_destination.open_gate();
    assert_eq!(in_flight.await.unwrap().unwrap().status, RunStatus::Success);

    let run = cli.engine.sync_now(ZONE).await.unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(cli_destination.create_call_count(), 1);
}

#[tokio::test]
async fn worker_pool_caps_concurrent_runs() {
    let source = FakeSource::default();
    let destination = FakeDestination::gated(vec![]);
    let config = EngineConfig {
        sync_concurrency: 2,
        ..EngineConfig::default()
    };
    let h = harness(&source, &destination, GlobalPolicy::default(), three_domains(), config).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    let outcomes = scheduler.trigger_all().await.unwrap();
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    wait_until(|| destination.fetch_call_count() == 2, "two runs to start").await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(destination.fetch_call_count(), 2, "third run started before a worker was free");

    destination.open_gate();
    for domain in ["example.com", "example.org", "example.net"] {
        wait_for_runs(&h.history, domain, 1).await;
    }
    assert_eq!(destination.max_concurrent_fetches(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn full_queue_rejects_and_releases_the_domain() {
    let source = FakeSource::default();
    let destination = FakeDestination::gated(vec![]);
    let config = EngineConfig {
        sync_concurrency: 1,
        queue_capacity: 1,
        ..EngineConfig::default()
    };
    let h = harness(&source, &destination, GlobalPolicy::default(), three_domains(), config).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    scheduler.trigger_sync("example.com").await.unwrap();
    wait_until(|| destination.fetch_call_count() == 1, "the first run to start").await;

    scheduler.trigger_sync("example.org").await.unwrap();
    assert!(matches!(
        scheduler.trigger_sync("example.net").await,
        Err(Error::QueueFull(_))
    ));
    assert!(!h.engine.locks().is_locked("example.net"));
    assert!(h.engine.locks().is_locked("example.org"));

    destination.open_gate();
    wait_for_runs(&h.history, "example.org", 1).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_drops_queued_runs_and_waits_for_in_flight_ones() {
    let source = FakeSource::new(vec![raw("www", "A", "1.2.3.4")]);
    let destination = FakeDestination::gated(vec![]);
    let config = EngineConfig {
        sync_concurrency: 1,
        ..EngineConfig::default()
    };
    let mut h = harness(&source, &destination, GlobalPolicy::default(), three_domains(), config).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    scheduler.trigger_sync("example.com").await.unwrap();
    wait_until(|| destination.fetch_call_count() == 1, "the first run to start").await;
    scheduler.trigger_sync("example.org").await.unwrap();

    shutdown_tx.send(()).unwrap();
    wait_until(
        || !h.engine.locks().is_locked("example.org"),
        "the queued run to be dropped",
    )
    .await;
    assert!(!handle.is_finished(), "shutdown must wait for the in-flight run");

    destination.open_gate();
    handle.await.unwrap().unwrap();

    let finished = h.history.list("example.com", 10).await.unwrap();
    assert_eq!(finished.len(), 1);
    assert!(finished[0].is_finished());
    assert!(h.history.list("example.org", 10).await.unwrap().is_empty());

    let events = drain_events(&mut h.events);
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));

    // A stopped scheduler accepts no more work
    assert!(scheduler.trigger_sync("example.net").await.is_err());
}

#[tokio::test]
async fn scheduler_cannot_run_twice() {
    let source = FakeSource::default();
    let destination = FakeDestination::default();
    let mut h = harness(&source, &destination, GlobalPolicy::default(), single_domain(), EngineConfig::default()).await;
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&h.engine)));
    let (shutdown_tx, handle) = start(&scheduler);

    let started = h.events.recv().await.unwrap();
    assert!(matches!(started, EngineEvent::Started { domains: 1 }));

    let (_second_tx, second_rx) = oneshot::channel();
    assert!(scheduler.run_with_shutdown(Some(second_rx)).await.is_err());

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
