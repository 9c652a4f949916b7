//! Plugin-based provider registry
//!
//! The registry lets source providers, destination providers and history
//! stores be registered at runtime, so the daemon builds its collaborators
//! from configuration without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonesync_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::with_builtin_stores();
//! zonesync_provider_cloudflare::register(&registry);
//! zonesync_provider_directadmin::register(&registry);
//!
//! let source = registry.create_source(&config.source)?;
//! let destination = registry.create_destination(&config.destination)?;
//! let history = registry.create_history_store(&config.history).await?;
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_destination("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::{DestinationConfig, HistoryStoreConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::store::{FileHistoryStoreFactory, MemoryHistoryStoreFactory};
use crate::traits::{DestinationProvider, HistoryStore, SourceProvider};
use crate::traits::{DestinationProviderFactory, HistoryStoreFactory, SourceProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of collaborator factories keyed by type name
///
/// ## Thread Safety
///
/// Interior mutability with `RwLock`: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    sources: RwLock<HashMap<String, Box<dyn SourceProviderFactory>>>,
    destinations: RwLock<HashMap<String, Box<dyn DestinationProviderFactory>>>,
    history_stores: RwLock<HashMap<String, Arc<dyn HistoryStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `memory` and `file` history stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_history_store("memory", Box::new(MemoryHistoryStoreFactory));
        registry.register_history_store("file", Box::new(FileHistoryStoreFactory));
        registry
    }

    /// Register a source provider factory under `name` (e.g. "directadmin")
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn SourceProviderFactory>) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a destination provider factory under `name` (e.g. "cloudflare")
    pub fn register_destination(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DestinationProviderFactory>,
    ) {
        self.destinations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a history store factory under `name` (e.g. "file")
    pub fn register_history_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn HistoryStoreFactory>,
    ) {
        self.history_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(factory));
    }

    /// Create a source provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SourceProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: The type is not registered, or creation failed
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn SourceProvider>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source provider type: {source_type}")))?;
        factory.create(config)
    }

    /// Create a destination provider from configuration
    pub fn create_destination(&self, config: &DestinationConfig) -> Result<Box<dyn DestinationProvider>> {
        let destination_type = config.type_name();
        let destinations = self
            .destinations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let factory = destinations.get(destination_type).ok_or_else(|| {
            Error::config(format!("Unknown destination provider type: {destination_type}"))
        })?;
        factory.create(config)
    }

    /// Create a history store from configuration
    pub async fn create_history_store(&self, config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>> {
        let store_type = config.type_name();
        let factory = self
            .history_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown history store type: {store_type}")))?;

        // The guard is gone before the await
        factory.create(config).await
    }

    /// List all registered source provider types
    pub fn list_sources(&self) -> Vec<String> {
        sorted_keys(&self.sources)
    }

    /// List all registered destination provider types
    pub fn list_destinations(&self) -> Vec<String> {
        sorted_keys(&self.destinations)
    }

    /// List all registered history store types
    pub fn list_history_stores(&self) -> Vec<String> {
        sorted_keys(&self.history_stores)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn has_destination(&self, name: &str) -> bool {
        self.destinations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn has_history_store(&self, name: &str) -> bool {
        self.history_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("sources", &self.list_sources())
            .field("destinations", &self.list_destinations())
            .field("history_stores", &self.list_history_stores())
            .finish()
    }
}

fn sorted_keys<V>(map: &RwLock<HashMap<String, V>>) -> Vec<String> {
    let mut keys: Vec<String> = map
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}
