//! Test doubles and common utilities for contract tests
//!
//! `FakeSource` and `FakeDestination` are in-memory zones behind `Arc`s, so a
//! test keeps a clone as a handle after boxing one into the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, mpsc};
use zonesync_core::config::{DomainConfig, EngineConfig, GlobalPolicy};
use zonesync_core::error::{Error, Result};
use zonesync_core::record::{NormalizedRecord, RawRecord, RecordOrigin, RecordType, normalize_all};
use zonesync_core::store::MemoryHistoryStore;
use zonesync_core::traits::{ConfigStore, DestinationProvider, HistoryStore, SourceProvider};
use zonesync_core::{EngineEvent, Redactor, SyncEngine};

pub const ZONE: &str = "example.com";

/// Authoritative zone double
#[derive(Clone, Default)]
pub struct FakeSource {
    records: Arc<Mutex<Vec<RawRecord>>>,
    fetch_calls: Arc<AtomicUsize>,
    /// `(alias, base)` of every pointer fetch
    pointer_fetches: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<RawRecord>) {
        *self.records.lock().unwrap() = records;
    }

    /// Make every subsequent fetch fail
    pub fn fail_fetches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn pointer_fetches(&self) -> Vec<(String, String)> {
        self.pointer_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn fetch_records(&self, _domain: &str) -> Result<Vec<RawRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::fetch(
                "fake-source",
                "connection refused (Authorization: Basic dXNlcjpodW50ZXIy)",
            ));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn fetch_pointer_records(&self, alias: &str, base: &str) -> Result<Vec<RawRecord>> {
        self.pointer_fetches
            .lock()
            .unwrap()
            .push((alias.to_string(), base.to_string()));
        self.fetch_records(alias).await
    }

    fn provider_name(&self) -> &'static str {
        "fake-source"
    }
}

/// Mirrored zone double that applies mutations to its own record list
#[derive(Clone)]
pub struct FakeDestination {
    records: Arc<Mutex<Vec<RawRecord>>>,
    next_id: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    /// Record name → error message returned for any mutation of that name
    failures: Arc<Mutex<HashMap<String, String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for FakeDestination {
    fn default() -> Self {
        Self {
            records: Arc::default(),
            next_id: Arc::new(AtomicUsize::new(1)),
            fetch_calls: Arc::default(),
            create_calls: Arc::default(),
            update_calls: Arc::default(),
            delete_calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            failures: Arc::default(),
            gate: None,
        }
    }
}

impl FakeDestination {
    pub fn new(records: Vec<RawRecord>) -> Self {
        let destination = Self::default();
        for record in records {
            destination.seed(record);
        }
        destination
    }

    /// A destination whose fetches block until [`FakeDestination::open_gate`]
    pub fn gated(records: Vec<RawRecord>) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(records)
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }

    /// Insert a raw record, assigning an id when it has none
    pub fn seed(&self, mut record: RawRecord) {
        if record.id.is_none() {
            record.id = Some(self.allocate_id());
        }
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_on(&self, name: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(name.to_string(), message.to_string());
    }

    pub fn raw_records(&self) -> Vec<RawRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Current contents, normalized the way the engine sees them
    pub fn normalized(&self) -> Vec<NormalizedRecord> {
        normalize_all(&self.raw_records(), ZONE, RecordOrigin::Destination).0
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_call_count(&self) -> usize {
        self.create_call_count() + self.update_call_count() + self.delete_call_count()
    }

    /// Highest number of fetches observed in flight at the same time
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn check_failure(&self, name: &str) -> Result<()> {
        match self.failures.lock().unwrap().get(name) {
            Some(message) => Err(Error::apply("fake-destination", message.clone())),
            None => Ok(()),
        }
    }

    fn to_raw(&self, record: &NormalizedRecord, id: String) -> RawRecord {
        let mut raw = RawRecord::new(&record.name, record.record_type.as_str(), &record.value).with_id(id);
        raw.ttl = record.ttl;
        raw.proxied = record.proxied;
        raw
    }

    fn position(&self, records: &[RawRecord], target: &NormalizedRecord) -> Option<usize> {
        if let Some(id) = &target.provider_id {
            return records.iter().position(|r| r.id.as_ref() == Some(id));
        }
        let key = target.key();
        records.iter().position(|raw| {
            normalize_all(std::slice::from_ref(raw), ZONE, RecordOrigin::Destination)
                .0
                .first()
                .is_some_and(|n| n.key() == key)
        })
    }
}

#[async_trait]
impl DestinationProvider for FakeDestination {
    async fn fetch_records(&self, _domain: &str) -> Result<Vec<RawRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }

        let records = self.raw_records();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(records)
    }

    async fn create_record(&self, _domain: &str, record: &NormalizedRecord) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&record.name)?;
        let raw = self.to_raw(record, self.allocate_id());
        self.records.lock().unwrap().push(raw);
        Ok(())
    }

    async fn update_record(
        &self,
        _domain: &str,
        previous: &NormalizedRecord,
        desired: &NormalizedRecord,
    ) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&desired.name)?;
        let mut records = self.records.lock().unwrap();
        let index = self
            .position(&records, previous)
            .ok_or_else(|| Error::apply("fake-destination", format!("no record {previous}")))?;
        let id = records[index].id.clone().unwrap_or_else(|| self.allocate_id());
        records[index] = self.to_raw(desired, id);
        Ok(())
    }

    async fn delete_record(&self, _domain: &str, record: &NormalizedRecord) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&record.name)?;
        let mut records = self.records.lock().unwrap();
        let index = self
            .position(&records, record)
            .ok_or_else(|| Error::apply("fake-destination", format!("no record {record}")))?;
        records.remove(index);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake-destination"
    }
}

/// Config store whose domain list a test can change while the engine runs
#[derive(Clone)]
pub struct SharedConfigStore {
    policy: GlobalPolicy,
    domains: Arc<Mutex<Vec<DomainConfig>>>,
}

impl SharedConfigStore {
    pub fn new(policy: GlobalPolicy, domains: Vec<DomainConfig>) -> Self {
        Self {
            policy,
            domains: Arc::new(Mutex::new(domains)),
        }
    }

    pub fn set_domains(&self, domains: Vec<DomainConfig>) {
        *self.domains.lock().unwrap() = domains;
    }
}

#[async_trait]
impl ConfigStore for SharedConfigStore {
    async fn global_policy(&self) -> Result<GlobalPolicy> {
        Ok(self.policy.clone())
    }

    async fn domain_configs(&self) -> Result<Vec<DomainConfig>> {
        Ok(self.domains.lock().unwrap().clone())
    }
}

/// Engine wired to the given doubles, with an in-memory history store
pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub history: MemoryHistoryStore,
    pub config: SharedConfigStore,
}

pub async fn harness(
    source: &FakeSource,
    destination: &FakeDestination,
    policy: GlobalPolicy,
    domains: Vec<DomainConfig>,
    config: EngineConfig,
) -> Harness {
    harness_with_redactor(source, destination, policy, domains, config, Redactor::new()).await
}

pub async fn harness_with_redactor(
    source: &FakeSource,
    destination: &FakeDestination,
    policy: GlobalPolicy,
    domains: Vec<DomainConfig>,
    config: EngineConfig,
    redactor: Redactor,
) -> Harness {
    let history = MemoryHistoryStore::new();
    let store: Arc<dyn HistoryStore> = Arc::new(history.clone());
    let config_store = SharedConfigStore::new(policy, domains);
    let (engine, events) = SyncEngine::new(
        Box::new(source.clone()),
        Box::new(destination.clone()),
        Box::new(config_store.clone()),
        store,
        redactor,
        config,
    )
    .await
    .expect("engine construction succeeds");

    Harness {
        engine: Arc::new(engine),
        events,
        history,
        config: config_store,
    }
}

/// Single enabled `example.com`
pub fn single_domain() -> Vec<DomainConfig> {
    vec![DomainConfig::new(ZONE)]
}

/// Default policy with A records proxied
pub fn proxy_a_policy() -> GlobalPolicy {
    let mut policy = GlobalPolicy::default();
    policy.proxy_defaults.insert(RecordType::A, true);
    policy
}

pub fn raw(name: &str, record_type: &str, content: &str) -> RawRecord {
    RawRecord::new(name, record_type, content)
}

/// Poll `condition` until it holds, failing the test after ~5 seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Wait for `count` finished runs of `domain` in history
pub async fn wait_for_runs(history: &MemoryHistoryStore, domain: &str, count: usize) {
    for _ in 0..500 {
        let finished = history
            .list(domain, usize::MAX)
            .await
            .unwrap()
            .iter()
            .filter(|run| run.is_finished())
            .count();
        if finished >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} finished runs of {domain}");
}

/// Drain every event currently buffered
pub fn drain_events(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
