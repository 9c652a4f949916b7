// # Destination Provider Trait
//
// Defines the interface for reading and mutating the zone being reconciled.
//
// ## Implementations
//
// - Cloudflare: `zonesync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use zonesync_core::{DestinationProvider, NormalizedRecord, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let destination = /* DestinationProvider implementation */;
//
//     let record = NormalizedRecord::new("www", RecordType::A, "192.0.2.1").with_proxied(true);
//     destination.create_record("example.com", &record).await?;
//
//     Ok(())
// }
// ```

use crate::record::{NormalizedRecord, RawRecord};
use async_trait::async_trait;

/// Trait for destination provider implementations
///
/// This trait defines the interface the plan executor drives. Each method is
/// a single-shot API operation; whether an action is needed at all is
/// decided by the differ, never by the provider.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// ## Allowed
/// - HTTP calls to the provider's own endpoints
/// - Caching provider metadata that does not change during the process
///   lifetime (e.g. zone identifiers)
///
/// ## Forbidden
/// - Retry loops or backoff (a failed action is recorded, the next scheduled
///   run converges)
/// - Spawning tasks
/// - Deciding whether an update is needed
/// - Logging credentials or including them in error messages
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    /// Fetch every record of `domain`
    ///
    /// Records should carry their provider id so later update/delete calls can
    /// address them.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<RawRecord>)`: Records in provider order
    /// - `Err(Error::Fetch)`: Network/auth failure, or the zone does not exist
    async fn fetch_records(&self, domain: &str) -> Result<Vec<RawRecord>, crate::Error>;

    /// Create `record` in `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Created
    /// - `Err(Error::Apply)`: The provider rejected or failed the call
    async fn create_record(
        &self,
        domain: &str,
        record: &NormalizedRecord,
    ) -> Result<(), crate::Error>;

    /// Replace `previous` with `desired`
    ///
    /// `desired` is complete: every attribute it carries is written. The
    /// provider id, when known, is on both records.
    async fn update_record(
        &self,
        domain: &str,
        previous: &NormalizedRecord,
        desired: &NormalizedRecord,
    ) -> Result<(), crate::Error>;

    /// Delete `record` from `domain`
    async fn delete_record(
        &self,
        domain: &str,
        record: &NormalizedRecord,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing destination providers from configuration
pub trait DestinationProviderFactory: Send + Sync {
    /// Create a DestinationProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A boxed DestinationProvider trait object
    fn create(
        &self,
        config: &crate::config::DestinationConfig,
    ) -> Result<Box<dyn DestinationProvider>, crate::Error>;
}
