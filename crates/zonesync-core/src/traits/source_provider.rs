// # Source Provider Trait
//
// Defines the interface for reading a zone from the authoritative provider.
//
// ## Implementations
//
// - DirectAdmin: `zonesync-provider-directadmin` crate
//
// ## Usage
//
// ```rust,ignore
// use zonesync_core::{SourceProvider, RecordOrigin, normalize_all};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* SourceProvider implementation */;
//
//     let raw = source.fetch_records("example.com").await?;
//     let (records, malformed) = normalize_all(&raw, "example.com", RecordOrigin::Source);
//
//     Ok(())
// }
// ```

use crate::record::RawRecord;
use async_trait::async_trait;

/// Trait for source provider implementations
///
/// The source is read-only: the engine never mutates it.
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the worker pool may fetch several
/// domains from the same provider concurrently.
///
/// # Responsibilities
///
/// A source provider only translates the provider's API payloads into
/// [`RawRecord`]s. It must not:
/// - normalize names or values (owned by the normalizer)
/// - filter records by policy (owned by the policy engine)
/// - retry or sleep (a hung call is bounded by the engine's timeout)
/// - log credentials or include them in error messages
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch every record of `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<RawRecord>)`: Records in provider order
    /// - `Err(Error::Fetch)`: Network, authentication or protocol failure; the
    ///   engine aborts the run before touching the destination
    async fn fetch_records(&self, domain: &str) -> Result<Vec<RawRecord>, crate::Error>;

    /// Fetch every record of `alias`, a pointer domain of `base`
    ///
    /// Panels that serve an alias zone only through its base domain override
    /// this. The default fetches `alias` like any other zone.
    async fn fetch_pointer_records(
        &self,
        alias: &str,
        base: &str,
    ) -> Result<Vec<RawRecord>, crate::Error> {
        let _ = base;
        self.fetch_records(alias).await
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing source providers from configuration
pub trait SourceProviderFactory: Send + Sync {
    /// Create a SourceProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A boxed SourceProvider trait object
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn SourceProvider>, crate::Error>;
}
