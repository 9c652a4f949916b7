// # Config Store Trait
//
// Read access to operator configuration. The engine reads the global policy
// once at construction and the domain list at the start of every run.

use crate::config::{DomainConfig, GlobalPolicy, canonical_domain};
use async_trait::async_trait;

/// Trait for configuration storage
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The process-wide policy
    async fn global_policy(&self) -> Result<GlobalPolicy, crate::Error>;

    /// Every configured domain, enabled or not
    async fn domain_configs(&self) -> Result<Vec<DomainConfig>, crate::Error>;

    /// Current configuration of a single domain
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainConfig))`: The domain is configured
    /// - `Ok(None)`: No such domain
    /// - `Err(Error)`: Storage error
    async fn domain_config(&self, domain: &str) -> Result<Option<DomainConfig>, crate::Error> {
        let wanted = canonical_domain(domain);
        Ok(self
            .domain_configs()
            .await?
            .into_iter()
            .find(|config| config.name() == wanted))
    }
}
