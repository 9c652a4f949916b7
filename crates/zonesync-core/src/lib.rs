// # zonesync-core
//
// Reconciliation engine that keeps a destination DNS zone an exact mirror of
// an authoritative source zone.
//
// ## Architecture Overview
//
// - **SourceProvider / DestinationProvider**: Collaborator traits for the two DNS APIs
// - **normalize**: Canonical record form, so equal records compare equal
// - **PolicyEngine**: Which records are managed, and their desired proxied flag
// - **diff**: Minimal create/update/delete plan between the two record sets
// - **PlanExecutor**: Best-effort application of a plan, with per-call timeouts
// - **SyncEngine**: One run end to end, per-domain locking, redacted history
// - **Scheduler**: Per-domain timers, bounded queue, fixed-size worker pool
// - **ProviderRegistry**: Plugin-based registry for providers and stores
//
// ## Run Flow
//
// ```text
// trigger ─► lock domain ─► fetch source ┐
//                           fetch dest   ┴► normalize ─► policy ─► diff ─► apply ─► history
// ```
//
// ## Design Principles
//
// 1. **Library-First**: The daemon only wires collaborators; every rule lives here
// 2. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 3. **Idempotency**: A converged domain plans zero actions
// 4. **Locality of failure**: A bad record or failed action never aborts the run

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod plan;
pub mod policy;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{DomainConfig, EngineConfig, GlobalPolicy, ZonesyncConfig};
pub use engine::{EngineEvent, SyncEngine};
pub use error::{Error, MalformedRecordError, Result};
pub use history::{Redactor, RunStatus, SyncRun, TriggerKind};
pub use plan::{PlanAction, SyncPlan};
pub use policy::{PolicyEngine, SyncScope};
pub use record::{NormalizedRecord, RawRecord, RecordType};
pub use registry::ProviderRegistry;
pub use scheduler::Scheduler;
pub use store::{FileHistoryStore, MemoryHistoryStore};
pub use traits::{ConfigStore, DestinationProvider, HistoryStore, SourceProvider};
