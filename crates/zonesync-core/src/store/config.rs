// # Config Stores
//
// - `StaticConfigStore`: policy and domains fixed at construction
// - `FileConfigStore`: fixed policy, domains re-read from a JSON file on
//   every call, so edits take effect at the next run without a restart

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::Error;
use crate::config::{DomainConfig, DomainsConfig, GlobalPolicy, validate_domains};
use crate::traits::ConfigStore;

/// Build the config store a [`DomainsConfig`] describes
pub fn config_store_for(policy: GlobalPolicy, domains: &DomainsConfig) -> Box<dyn ConfigStore> {
    match domains {
        DomainsConfig::Static { domains } => Box::new(StaticConfigStore::new(policy, domains.clone())),
        DomainsConfig::File { path } => Box::new(FileConfigStore::new(policy, path)),
    }
}

/// Fixed, in-memory configuration
#[derive(Debug, Clone)]
pub struct StaticConfigStore {
    policy: GlobalPolicy,
    domains: Vec<DomainConfig>,
}

impl StaticConfigStore {
    pub fn new(policy: GlobalPolicy, domains: Vec<DomainConfig>) -> Self {
        Self { policy, domains }
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn global_policy(&self) -> Result<GlobalPolicy, Error> {
        Ok(self.policy.clone())
    }

    async fn domain_configs(&self) -> Result<Vec<DomainConfig>, Error> {
        Ok(self.domains.clone())
    }
}

/// Domains from a JSON array on disk
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    policy: GlobalPolicy,
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(policy: GlobalPolicy, path: impl AsRef<Path>) -> Self {
        Self {
            policy,
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn global_policy(&self) -> Result<GlobalPolicy, Error> {
        Ok(self.policy.clone())
    }

    async fn domain_configs(&self) -> Result<Vec<DomainConfig>, Error> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read domains file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let domains: Vec<DomainConfig> = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse domains file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        validate_domains(&domains)?;
        tracing::trace!(domains = domains.len(), path = %self.path.display(), "Domains file read");
        Ok(domains)
    }
}
