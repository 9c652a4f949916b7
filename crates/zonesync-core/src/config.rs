//! Configuration types for zonesync
//!
//! This module defines the policy, per-domain and engine configuration, plus
//! the collaborator descriptors the daemon uses to build providers through the
//! registry. Everything here is validated once at load time; nothing in a run
//! ever re-validates or fails on configuration.

use crate::record::RecordType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete zonesync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesyncConfig {
    /// Authoritative provider
    pub source: SourceConfig,

    /// Provider being reconciled
    pub destination: DestinationConfig,

    /// Where run history is kept
    #[serde(default)]
    pub history: HistoryStoreConfig,

    /// Where domain configuration is read from
    pub domains: DomainsConfig,

    /// Process-wide record policy
    #[serde(default)]
    pub policy: GlobalPolicy,

    /// Worker pool and timer settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ZonesyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate()?;
        self.destination.validate()?;
        self.history.validate()?;
        self.domains.validate()?;
        self.policy.validate()?;
        self.engine.validate()?;
        Ok(())
    }

    /// Literal credential values that must never reach a history entry
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = self.source.secrets();
        secrets.extend(self.destination.secrets());
        secrets
    }
}

/// Source provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// DirectAdmin control panel
    #[serde(rename = "directadmin")]
    DirectAdmin {
        /// Panel base URL, e.g. `https://panel.example.net:2222`
        url: String,
        /// Panel user
        username: String,
        /// Password or login key (HTTP basic auth)
        #[serde(default)]
        password: Option<String>,
        /// API token (bearer auth); takes precedence over `password`
        #[serde(default)]
        token: Option<String>,
    },

    /// Custom source provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::DirectAdmin {
                url,
                username,
                password,
                token,
            } => {
                if url.is_empty() {
                    return Err(crate::Error::config("DirectAdmin URL cannot be empty"));
                }
                if token.as_deref().is_none_or(str::is_empty) {
                    if username.is_empty() {
                        return Err(crate::Error::config(
                            "DirectAdmin username cannot be empty",
                        ));
                    }
                    if password.as_deref().is_none_or(str::is_empty) {
                        return Err(crate::Error::config(
                            "DirectAdmin requires a password, login key or token",
                        ));
                    }
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                validate_custom("source provider", factory, config)
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::DirectAdmin { .. } => "directadmin",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }

    fn secrets(&self) -> Vec<String> {
        match self {
            SourceConfig::DirectAdmin {
                password, token, ..
            } => password.iter().chain(token.iter()).cloned().collect(),
            SourceConfig::Custom { .. } => Vec::new(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::DirectAdmin { url, username, .. } => f
                .debug_struct("DirectAdmin")
                .field("url", url)
                .field("username", username)
                .field("credentials", &"<REDACTED>")
                .finish(),
            SourceConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

/// Destination provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Cloudflare v4 API
    Cloudflare {
        /// Scoped API token (preferred)
        #[serde(default)]
        api_token: Option<String>,
        /// Account email for global API key auth
        #[serde(default)]
        email: Option<String>,
        /// Global API key
        #[serde(default)]
        api_key: Option<String>,
        /// API base URL override (tests, proxies)
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Custom destination provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DestinationConfig {
    /// Validate the destination configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DestinationConfig::Cloudflare {
                api_token,
                email,
                api_key,
                ..
            } => {
                let has_token = api_token.as_deref().is_some_and(|t| !t.is_empty());
                let has_key = email.as_deref().is_some_and(|e| !e.is_empty())
                    && api_key.as_deref().is_some_and(|k| !k.is_empty());
                if !has_token && !has_key {
                    return Err(crate::Error::config(
                        "Cloudflare requires an API token or an email and API key",
                    ));
                }
                Ok(())
            }
            DestinationConfig::Custom { factory, config } => {
                validate_custom("destination provider", factory, config)
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            DestinationConfig::Cloudflare { .. } => "cloudflare",
            DestinationConfig::Custom { factory, .. } => factory,
        }
    }

    fn secrets(&self) -> Vec<String> {
        match self {
            DestinationConfig::Cloudflare {
                api_token, api_key, ..
            } => api_token.iter().chain(api_key.iter()).cloned().collect(),
            DestinationConfig::Custom { .. } => Vec::new(),
        }
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationConfig::Cloudflare {
                email, base_url, ..
            } => f
                .debug_struct("Cloudflare")
                .field("email", email)
                .field("base_url", base_url)
                .field("credentials", &"<REDACTED>")
                .finish(),
            DestinationConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

/// History store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryStoreConfig {
    /// JSON file history store
    File {
        /// Path to the history file
        path: String,
    },

    /// In-memory history store (not persistent)
    #[default]
    Memory,

    /// Custom history store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl HistoryStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            HistoryStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("History file path cannot be empty"))
            }
            HistoryStoreConfig::Custom { factory, config } => {
                validate_custom("history store", factory, config)
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            HistoryStoreConfig::File { .. } => "file",
            HistoryStoreConfig::Memory => "memory",
            HistoryStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Where the per-domain configuration lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainsConfig {
    /// Fixed list, read once
    Static {
        /// Configured domains
        domains: Vec<DomainConfig>,
    },

    /// JSON array of [`DomainConfig`], re-read at the start of every run
    File {
        /// Path to the domains file
        path: String,
    },
}

impl DomainsConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DomainsConfig::Static { domains } => validate_domains(domains),
            DomainsConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Domains file path cannot be empty"))
            }
            DomainsConfig::File { .. } => Ok(()),
        }
    }
}

fn validate_custom(
    what: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {what} factory cannot be empty"
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {what} config cannot be null"
        )));
    }
    Ok(())
}

/// Validate a domain list: non-empty, each entry valid, no domain twice
pub fn validate_domains(domains: &[DomainConfig]) -> Result<(), crate::Error> {
    if domains.is_empty() {
        return Err(crate::Error::config("No domains configured"));
    }
    let mut seen = BTreeSet::new();
    for domain in domains {
        domain.validate()?;
        if !seen.insert(domain.name()) {
            return Err(crate::Error::config(format!(
                "Domain configured twice: {}",
                domain.name()
            )));
        }
    }
    Ok(())
}

/// Per-domain configuration.
///
/// Owned by the configuration store; the engine re-reads it at the start of
/// every run and never holds on to it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Zone name, e.g. `example.com`
    pub domain: String,

    /// Disabled domains never fire a timer
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Standard interval override (minutes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_minutes: Option<u64>,

    /// Fast-track interval override (minutes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_track_interval_minutes: Option<u64>,

    /// Per-type proxied flag, takes precedence over every global proxy setting
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub proxy_overrides: BTreeMap<RecordType, bool>,

    /// Source-side domain this zone is a pointer (alias) of
    ///
    /// When set, the source is asked for the alias zone through its base
    /// domain. Providers without pointer support fetch the zone directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<String>,
}

impl DomainConfig {
    /// Create an enabled domain with no overrides
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            enabled: true,
            sync_interval_minutes: None,
            fast_track_interval_minutes: None,
            proxy_overrides: BTreeMap::new(),
            base_domain: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sync_interval(mut self, minutes: u64) -> Self {
        self.sync_interval_minutes = Some(minutes);
        self
    }

    pub fn with_fast_track_interval(mut self, minutes: u64) -> Self {
        self.fast_track_interval_minutes = Some(minutes);
        self
    }

    pub fn with_proxy_override(mut self, record_type: RecordType, proxied: bool) -> Self {
        self.proxy_overrides.insert(record_type, proxied);
        self
    }

    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = Some(base_domain.into());
        self
    }

    /// Canonical base domain, `None` unless this zone is a pointer of another
    pub fn pointer_base(&self) -> Option<String> {
        self.base_domain
            .as_deref()
            .map(canonical_domain)
            .filter(|base| !base.is_empty() && *base != self.name())
    }

    /// Canonical zone name: lowercase, no trailing dot
    pub fn name(&self) -> String {
        canonical_domain(&self.domain)
    }

    /// Effective standard interval
    pub fn sync_interval(&self, engine: &EngineConfig) -> Duration {
        minutes(
            self.sync_interval_minutes
                .unwrap_or(engine.default_sync_interval_minutes),
        )
    }

    /// Effective fast-track interval, `None` when fast-track is disabled globally
    pub fn fast_track_interval(&self, engine: &EngineConfig) -> Option<Duration> {
        engine
            .fast_track_interval_minutes
            .map(|default| minutes(self.fast_track_interval_minutes.unwrap_or(default)))
    }

    /// Validate the domain entry
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.name())?;
        if self.sync_interval_minutes == Some(0) {
            return Err(crate::Error::policy(format!(
                "{}: sync interval must be > 0",
                self.domain
            )));
        }
        if self.fast_track_interval_minutes == Some(0) {
            return Err(crate::Error::policy(format!(
                "{}: fast-track interval must be > 0",
                self.domain
            )));
        }
        if let Some(base) = &self.base_domain {
            validate_domain_name(&canonical_domain(base))?;
        }
        Ok(())
    }
}

/// Lowercase a domain and strip any trailing dot
pub fn canonical_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn validate_domain_name(name: &str) -> Result<(), crate::Error> {
    if name.is_empty() || name.len() > 253 {
        return Err(crate::Error::config(format!("Invalid domain name: '{name}'")));
    }
    if !name.contains('.') {
        return Err(crate::Error::config(format!(
            "Domain name must have at least two labels: '{name}'"
        )));
    }
    for label in name.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(crate::Error::config(format!(
                "Invalid label '{label}' in domain name '{name}'"
            )));
        }
    }
    Ok(())
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

/// A glob matcher over record names.
///
/// `*` matches any run of characters (dots included), `?` exactly one; all
/// other characters match literally and case-insensitively.
#[derive(Clone)]
pub struct NamePattern {
    glob: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a glob pattern
    pub fn new(glob: impl Into<String>) -> Result<Self, crate::Error> {
        let glob = glob.into();
        let trimmed = glob.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::policy("name pattern cannot be empty"));
        }

        let mut expr = String::from("(?i)^");
        for c in trimmed.trim_end_matches('.').chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr)
            .map_err(|e| crate::Error::policy(format!("invalid name pattern '{glob}': {e}")))?;
        Ok(Self {
            glob: trimmed.to_string(),
            regex,
        })
    }

    /// Whether `name` matches the pattern
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamePattern").field(&self.glob).finish()
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl TryFrom<String> for NamePattern {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NamePattern> for String {
    fn from(value: NamePattern) -> Self {
        value.glob
    }
}

impl Serialize for NamePattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.glob)
    }
}

impl<'de> Deserialize<'de> for NamePattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let glob = String::deserialize(deserializer)?;
        Self::new(glob).map_err(serde::de::Error::custom)
    }
}

/// Proxied flag for names matching a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRule {
    pub pattern: NamePattern,
    pub proxied: bool,
}

impl ProxyRule {
    pub fn new(pattern: &str, proxied: bool) -> Result<Self, crate::Error> {
        Ok(Self {
            pattern: NamePattern::new(pattern)?,
            proxied,
        })
    }
}

/// The record subset reconciled by the fast-track timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastTrackScope {
    /// Record types in the subset
    #[serde(default = "default_fast_track_types")]
    pub types: BTreeSet<RecordType>,

    /// Names in the subset; empty means every name of those types
    #[serde(default = "default_fast_track_names")]
    pub name_patterns: Vec<NamePattern>,
}

impl Default for FastTrackScope {
    fn default() -> Self {
        Self {
            types: default_fast_track_types(),
            name_patterns: default_fast_track_names(),
        }
    }
}

/// Process-wide record policy.
///
/// Loaded once at startup and immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPolicy {
    /// Record types the engine is responsible for on the destination
    #[serde(default = "default_managed_types")]
    pub managed_types: BTreeSet<RecordType>,

    /// Names left untouched on both sides
    #[serde(default)]
    pub exclude_patterns: Vec<NamePattern>,

    /// Per-type proxied default
    #[serde(default)]
    pub proxy_defaults: BTreeMap<RecordType, bool>,

    /// Per-name proxied flags; first match wins, checked before `proxy_defaults`
    #[serde(default)]
    pub proxy_rules: Vec<ProxyRule>,

    /// Subset reconciled by fast-track runs
    #[serde(default)]
    pub fast_track: FastTrackScope,

    /// Whether a TTL mismatch alone warrants an update
    #[serde(default)]
    pub manage_ttl: bool,
}

impl Default for GlobalPolicy {
    fn default() -> Self {
        Self {
            managed_types: default_managed_types(),
            exclude_patterns: Vec::new(),
            proxy_defaults: BTreeMap::new(),
            proxy_rules: Vec::new(),
            fast_track: FastTrackScope::default(),
            manage_ttl: false,
        }
    }
}

impl GlobalPolicy {
    /// Validate the policy; every failure is a [`crate::Error::PolicyMisconfiguration`]
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.managed_types.is_empty() {
            return Err(crate::Error::policy("managed record types cannot be empty"));
        }
        if self.managed_types.contains(&RecordType::Soa) {
            return Err(crate::Error::policy("SOA records cannot be managed"));
        }
        for record_type in self.proxy_defaults.keys() {
            if !record_type.is_proxiable() {
                return Err(crate::Error::policy(format!(
                    "{record_type} records cannot be proxied"
                )));
            }
        }
        if let Some(stray) = self
            .fast_track
            .types
            .iter()
            .find(|t| !self.managed_types.contains(*t))
        {
            return Err(crate::Error::policy(format!(
                "fast-track type {stray} is not a managed type"
            )));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size: maximum concurrent runs across all domains
    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,

    /// Capacity of the pending-run queue
    ///
    /// When full, manual triggers are rejected and scheduled ticks are dropped
    /// (with a warning log).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Standard interval for domains without an override (minutes)
    #[serde(default = "default_sync_interval_minutes")]
    pub default_sync_interval_minutes: u64,

    /// Fast-track interval for domains without an override (minutes)
    ///
    /// `None` disables fast-track runs for every domain.
    #[serde(default = "default_fast_track_interval_minutes")]
    pub fast_track_interval_minutes: Option<u64>,

    /// Deadline for a single provider call (seconds)
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// History entries returned when the caller gives no limit
    #[serde(default = "default_history_limit")]
    pub history_limit_default: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Directory of per-domain lock files
    ///
    /// Processes sharing a lock directory (the daemon and one-shot CLI runs)
    /// never run the same domain at the same time. `None` only excludes runs
    /// within this process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_concurrency: default_sync_concurrency(),
            queue_capacity: default_queue_capacity(),
            default_sync_interval_minutes: default_sync_interval_minutes(),
            fast_track_interval_minutes: default_fast_track_interval_minutes(),
            provider_timeout_secs: default_provider_timeout_secs(),
            history_limit_default: default_history_limit(),
            event_channel_capacity: default_event_channel_capacity(),
            lock_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sync_concurrency == 0 {
            return Err(crate::Error::policy("sync concurrency must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(crate::Error::policy("queue capacity must be > 0"));
        }
        if self.default_sync_interval_minutes == 0 {
            return Err(crate::Error::policy("sync interval must be > 0"));
        }
        if self.fast_track_interval_minutes == Some(0) {
            return Err(crate::Error::policy("fast-track interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::policy("event channel capacity must be > 0"));
        }
        if self.provider_timeout_secs == 0 {
            return Err(crate::Error::policy("provider timeout must be > 0"));
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_managed_types() -> BTreeSet<RecordType> {
    [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Txt,
        RecordType::Mx,
        RecordType::Srv,
        RecordType::Caa,
    ]
    .into_iter()
    .collect()
}

fn default_fast_track_types() -> BTreeSet<RecordType> {
    BTreeSet::from([RecordType::Txt])
}

fn default_fast_track_names() -> Vec<NamePattern> {
    NamePattern::new("_acme-challenge*").into_iter().collect()
}

fn default_sync_concurrency() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    64
}

fn default_sync_interval_minutes() -> u64 {
    15
}

fn default_fast_track_interval_minutes() -> Option<u64> {
    Some(5)
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> usize {
    50
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns_match_case_insensitively() {
        let pattern = NamePattern::new("_acme-challenge*").unwrap();
        assert!(pattern.is_match("_acme-challenge"));
        assert!(pattern.is_match("_ACME-challenge.www"));
        assert!(!pattern.is_match("www._acme-challenge"));

        let single = NamePattern::new("host?").unwrap();
        assert!(single.is_match("host1"));
        assert!(!single.is_match("host12"));

        let literal = NamePattern::new("mail.example.com").unwrap();
        assert!(literal.is_match("mail.example.com"));
        assert!(!literal.is_match("mailxexample.com"));
    }

    #[test]
    fn default_policy_is_valid() {
        let policy = GlobalPolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.managed_types.len(), 7);
        assert!(!policy.manage_ttl);
    }

    #[test]
    fn policy_rejects_soa_and_empty_types() {
        let mut policy = GlobalPolicy::default();
        policy.managed_types.insert(RecordType::Soa);
        assert!(matches!(
            policy.validate(),
            Err(crate::Error::PolicyMisconfiguration(_))
        ));

        policy.managed_types.clear();
        assert!(matches!(
            policy.validate(),
            Err(crate::Error::PolicyMisconfiguration(_))
        ));
    }

    #[test]
    fn policy_rejects_unmanaged_fast_track_type() {
        let mut policy = GlobalPolicy::default();
        policy.managed_types.remove(&RecordType::Txt);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_rejects_proxy_default_for_txt() {
        let mut policy = GlobalPolicy::default();
        policy.proxy_defaults.insert(RecordType::Txt, true);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: GlobalPolicy = serde_json::from_str(
            r#"{"exclude_patterns": ["_domainkey*"], "proxy_defaults": {"A": true}}"#,
        )
        .unwrap();
        assert_eq!(policy.exclude_patterns[0].as_str(), "_domainkey*");
        assert_eq!(policy.proxy_defaults.get(&RecordType::A), Some(&true));
        assert_eq!(policy.fast_track, FastTrackScope::default());
    }

    #[test]
    fn invalid_pattern_fails_deserialization() {
        let result: Result<GlobalPolicy, _> =
            serde_json::from_str(r#"{"exclude_patterns": [""]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn domain_intervals_fall_back_to_engine_defaults() {
        let engine = EngineConfig::default();
        let plain = DomainConfig::new("example.com");
        assert_eq!(plain.sync_interval(&engine), Duration::from_secs(15 * 60));
        assert_eq!(plain.fast_track_interval(&engine), Some(Duration::from_secs(5 * 60)));

        let custom = DomainConfig::new("example.com")
            .with_sync_interval(60)
            .with_fast_track_interval(2);
        assert_eq!(custom.sync_interval(&engine), Duration::from_secs(3600));
        assert_eq!(custom.fast_track_interval(&engine), Some(Duration::from_secs(120)));

        let disabled = EngineConfig {
            fast_track_interval_minutes: None,
            ..EngineConfig::default()
        };
        assert_eq!(custom.fast_track_interval(&disabled), None);
    }

    #[test]
    fn domain_validation() {
        DomainConfig::new("Example.COM.").validate().unwrap();
        assert_eq!(DomainConfig::new("Example.COM.").name(), "example.com");
        assert!(DomainConfig::new("localhost").validate().is_err());
        assert!(DomainConfig::new("-bad.com").validate().is_err());
        assert!(DomainConfig::new("a..com").validate().is_err());
        assert!(DomainConfig::new("example.com")
            .with_sync_interval(0)
            .validate()
            .is_err());
        assert!(DomainConfig::new("alias.example")
            .with_base_domain("not a domain")
            .validate()
            .is_err());
    }

    #[test]
    fn pointer_base_is_canonical_and_ignores_self() {
        let alias: DomainConfig =
            serde_json::from_str(r#"{"domain": "alias.example", "base_domain": "Example.COM."}"#).unwrap();
        alias.validate().unwrap();
        assert_eq!(alias.pointer_base().as_deref(), Some("example.com"));

        assert_eq!(DomainConfig::new("example.com").pointer_base(), None);
        assert_eq!(
            DomainConfig::new("example.com").with_base_domain("EXAMPLE.com").pointer_base(),
            None
        );
    }

    #[test]
    fn engine_validation() {
        EngineConfig::default().validate().unwrap();
        let zero = EngineConfig {
            sync_concurrency: 0,
            ..EngineConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn provider_config_debug_hides_credentials() {
        let dest = DestinationConfig::Cloudflare {
            api_token: Some("cf-secret-token".into()),
            email: None,
            api_key: None,
            base_url: None,
        };
        let printed = format!("{dest:?}");
        assert!(!printed.contains("cf-secret-token"));
        assert!(printed.contains("<REDACTED>"));
    }

    #[test]
    fn config_collects_secrets() {
        let config = ZonesyncConfig {
            source: SourceConfig::DirectAdmin {
                url: "https://panel.example.net:2222".into(),
                username: "admin".into(),
                password: Some("hunter2".into()),
                token: None,
            },
            destination: DestinationConfig::Cloudflare {
                api_token: Some("cf-token".into()),
                email: None,
                api_key: None,
                base_url: None,
            },
            history: HistoryStoreConfig::Memory,
            domains: DomainsConfig::Static {
                domains: vec![DomainConfig::new("example.com")],
            },
            policy: GlobalPolicy::default(),
            engine: EngineConfig::default(),
        };
        config.validate().unwrap();
        assert_eq!(config.secrets(), vec!["hunter2".to_string(), "cf-token".to_string()]);
    }

    #[test]
    fn duplicate_domains_rejected() {
        let domains = DomainsConfig::Static {
            domains: vec![
                DomainConfig::new("example.com"),
                DomainConfig::new("EXAMPLE.com."),
            ],
        };
        assert!(domains.validate().is_err());
    }
}
