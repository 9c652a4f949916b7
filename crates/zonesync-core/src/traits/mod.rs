//! Collaborator traits
//!
//! This module defines the abstract interfaces the engine depends on.
//!
//! - [`SourceProvider`]: Read the authoritative zone
//! - [`DestinationProvider`]: Read and mutate the mirrored zone
//! - [`ConfigStore`]: Global policy and per-domain configuration
//! - [`HistoryStore`]: Persisted run history

pub mod config_store;
pub mod destination_provider;
pub mod history_store;
pub mod source_provider;

pub use config_store::ConfigStore;
pub use destination_provider::{DestinationProvider, DestinationProviderFactory};
pub use history_store::{HistoryStore, HistoryStoreFactory};
pub use source_provider::{SourceProvider, SourceProviderFactory};
