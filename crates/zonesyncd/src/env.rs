// Environment configuration for zonesyncd.
//
// Every setting comes from a `ZONESYNC_*` variable. Parsing goes through a
// lookup function so tests never touch the process environment.

use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;
use zonesync_core::config::{
    DestinationConfig, DomainConfig, DomainsConfig, EngineConfig, GlobalPolicy,
    HistoryStoreConfig, NamePattern, ProxyRule, SourceConfig,
};
use zonesync_core::{RecordType, ZonesyncConfig};

/// Fully parsed daemon settings
#[derive(Debug)]
pub struct DaemonConfig {
    pub zonesync: ZonesyncConfig,
    pub log_level: Level,
}

/// Read and validate the daemon configuration from the process environment
pub fn from_env() -> Result<DaemonConfig> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Read and validate the daemon configuration through `lookup`
pub fn from_lookup<F>(lookup: F) -> Result<DaemonConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let history = env.history();
    let mut engine = env.engine()?;
    engine.lock_dir = Some(env.lock_dir(&history));

    let zonesync = ZonesyncConfig {
        source: env.source()?,
        destination: env.destination()?,
        history,
        domains: env.domains()?,
        policy: env.policy()?,
        engine,
    };
    zonesync.validate().context("invalid configuration")?;

    let log_level = match env.get("ZONESYNC_LOG_LEVEL") {
        Some(level) => parse_level(&level)?,
        None => Level::INFO,
    };

    Ok(DaemonConfig {
        zonesync,
        log_level,
    })
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; unset and blank are the same
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| anyhow!("{name} is required. Set it via: export {name}=..."))
    }

    fn list(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|v| split_csv(&v))
    }

    fn number<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(name)
            .map(|v| {
                v.parse::<T>()
                    .with_context(|| format!("{name} must be a number. Got: {v}"))
            })
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<Option<bool>> {
        self.get(name)
            .map(|v| parse_bool(&v).with_context(|| format!("{name} is not a boolean")))
            .transpose()
    }

    fn source(&self) -> Result<SourceConfig> {
        let url = self.require("ZONESYNC_SOURCE_URL")?;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            bail!("ZONESYNC_SOURCE_URL must use HTTP or HTTPS scheme. Got: {url}");
        }

        let token = self.get("ZONESYNC_SOURCE_TOKEN");
        let password = self
            .get("ZONESYNC_SOURCE_PASSWORD")
            .or_else(|| self.get("ZONESYNC_SOURCE_LOGIN_KEY"));
        if token.is_none() && password.is_none() {
            bail!(
                "ZONESYNC_SOURCE_PASSWORD or ZONESYNC_SOURCE_LOGIN_KEY is required \
                 (or ZONESYNC_SOURCE_TOKEN for token auth)"
            );
        }

        Ok(SourceConfig::DirectAdmin {
            url,
            username: self.get("ZONESYNC_SOURCE_USERNAME").unwrap_or_default(),
            password,
            token,
        })
    }

    fn destination(&self) -> Result<DestinationConfig> {
        let api_token = self.get("ZONESYNC_CLOUDFLARE_API_TOKEN");
        let email = self.get("ZONESYNC_CLOUDFLARE_EMAIL");
        let api_key = self.get("ZONESYNC_CLOUDFLARE_API_KEY");

        if api_token.is_none() && (email.is_none() || api_key.is_none()) {
            bail!(
                "ZONESYNC_CLOUDFLARE_API_TOKEN is required \
                 (or both ZONESYNC_CLOUDFLARE_EMAIL and ZONESYNC_CLOUDFLARE_API_KEY)"
            );
        }

        Ok(DestinationConfig::Cloudflare {
            api_token,
            email,
            api_key,
            base_url: self.get("ZONESYNC_CLOUDFLARE_BASE_URL"),
        })
    }

    fn history(&self) -> HistoryStoreConfig {
        match self.get("ZONESYNC_HISTORY_PATH") {
            Some(path) => HistoryStoreConfig::File { path },
            None => HistoryStoreConfig::Memory,
        }
    }

    /// Shared by every zonesyncd process on the host, so CLI runs and the
    /// daemon exclude each other per domain
    fn lock_dir(&self, history: &HistoryStoreConfig) -> PathBuf {
        if let Some(dir) = self.get("ZONESYNC_LOCK_DIR") {
            return PathBuf::from(dir);
        }
        match history {
            HistoryStoreConfig::File { path } => Path::new(path)
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("locks"), |parent| parent.join("locks")),
            _ => std::env::temp_dir().join("zonesync").join("locks"),
        }
    }

    fn domains(&self) -> Result<DomainsConfig> {
        if let Some(path) = self.get("ZONESYNC_DOMAINS_FILE") {
            return Ok(DomainsConfig::File { path });
        }

        let domains: Vec<DomainConfig> = self
            .list("ZONESYNC_DOMAINS")
            .unwrap_or_default()
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((alias, base)) => DomainConfig::new(alias.trim()).with_base_domain(base.trim()),
                None => DomainConfig::new(entry),
            })
            .collect();
        if domains.is_empty() {
            bail!(
                "ZONESYNC_DOMAINS must contain at least one domain \
                 (or set ZONESYNC_DOMAINS_FILE). \
                 Set it via: export ZONESYNC_DOMAINS=example.com,example.org"
            );
        }
        Ok(DomainsConfig::Static { domains })
    }

    fn policy(&self) -> Result<GlobalPolicy> {
        let mut policy = GlobalPolicy::default();

        if let Some(types) = self.list("ZONESYNC_MANAGED_RECORD_TYPES") {
            policy.managed_types = parse_types("ZONESYNC_MANAGED_RECORD_TYPES", &types)?;
        }

        if let Some(names) = self.list("ZONESYNC_EXCLUDE_NAMES") {
            policy.exclude_patterns = parse_patterns("ZONESYNC_EXCLUDE_NAMES", &names)?;
        }

        for (name, record_type) in [
            ("ZONESYNC_PROXY_A", RecordType::A),
            ("ZONESYNC_PROXY_AAAA", RecordType::Aaaa),
            ("ZONESYNC_PROXY_CNAME", RecordType::Cname),
        ] {
            if let Some(proxied) = self.flag(name)? {
                policy.proxy_defaults.insert(record_type, proxied);
            }
        }

        if let Some(rules) = self.list("ZONESYNC_PROXY_RULES") {
            policy.proxy_rules = rules
                .iter()
                .map(|rule| parse_proxy_rule(rule))
                .collect::<Result<_>>()
                .context("ZONESYNC_PROXY_RULES")?;
        }

        if let Some(types) = self.list("ZONESYNC_FAST_TRACK_TYPES") {
            policy.fast_track.types = parse_types("ZONESYNC_FAST_TRACK_TYPES", &types)?;
        }

        if let Some(names) = self.get("ZONESYNC_FAST_TRACK_NAMES") {
            // "*" widens the subset to every name of the fast-track types
            policy.fast_track.name_patterns = if names == "*" {
                Vec::new()
            } else {
                parse_patterns("ZONESYNC_FAST_TRACK_NAMES", &split_csv(&names))?
            };
        }

        if let Some(manage_ttl) = self.flag("ZONESYNC_MANAGE_TTL")? {
            policy.manage_ttl = manage_ttl;
        }

        Ok(policy)
    }

    fn engine(&self) -> Result<EngineConfig> {
        let mut engine = EngineConfig::default();

        if let Some(minutes) = self.number("ZONESYNC_SYNC_INTERVAL_MINUTES")? {
            engine.default_sync_interval_minutes = minutes;
        }
        if let Some(value) = self.get("ZONESYNC_FAST_TRACK_INTERVAL_MINUTES") {
            engine.fast_track_interval_minutes = if value.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(value.parse().with_context(|| {
                    format!("ZONESYNC_FAST_TRACK_INTERVAL_MINUTES must be a number or \"off\". Got: {value}")
                })?)
            };
        }
        if let Some(workers) = self.number("ZONESYNC_SYNC_CONCURRENCY")? {
            engine.sync_concurrency = workers;
        }
        if let Some(capacity) = self.number("ZONESYNC_QUEUE_CAPACITY")? {
            engine.queue_capacity = capacity;
        }
        if let Some(secs) = self.number("ZONESYNC_PROVIDER_TIMEOUT_SECS")? {
            engine.provider_timeout_secs = secs;
        }

        Ok(engine)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("expected true or false, got {other:?}"),
    }
}

fn parse_level(value: &str) -> Result<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => bail!(
            "ZONESYNC_LOG_LEVEL '{value}' is not valid. \
             Valid levels: trace, debug, info, warn, error"
        ),
    }
}

fn parse_types(name: &str, values: &[String]) -> Result<BTreeSet<RecordType>> {
    values
        .iter()
        .map(|v| v.parse::<RecordType>().with_context(|| format!("{name}: {v}")))
        .collect()
}

fn parse_patterns(name: &str, values: &[String]) -> Result<Vec<NamePattern>> {
    values
        .iter()
        .map(|v| NamePattern::new(v.as_str()).with_context(|| format!("{name}: {v}")))
        .collect()
}

/// `pattern=bool`
fn parse_proxy_rule(rule: &str) -> Result<ProxyRule> {
    let (pattern, proxied) = rule
        .split_once('=')
        .ok_or_else(|| anyhow!("proxy rule {rule:?} must look like pattern=true|false"))?;
    let proxied = parse_bool(proxied.trim())
        .with_context(|| format!("proxy rule {rule:?}"))?;
    Ok(ProxyRule::new(pattern.trim(), proxied)?)
}
