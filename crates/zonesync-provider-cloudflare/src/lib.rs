// # Cloudflare Destination Provider
//
// `DestinationProvider` over the Cloudflare v4 REST API.
//
// ## Behaviour
//
// - One HTTP call per operation, plus a zone lookup the first time a domain
//   is seen (zone ids are cached for the provider's lifetime)
// - No retries, no backoff: a failed call becomes a failed action and the
//   next scheduled run converges
// - Listing is paginated (`per_page=100`) and follows `result_info`
// - Credentials never appear in logs, errors or `Debug` output
//
// ## Authentication
//
// - Scoped API token: `Authorization: Bearer <token>` (preferred)
// - Global API key: `X-Auth-Email` + `X-Auth-Key`
//
// ## API Reference
//
// - List zones: GET `/zones?name=...&status=active`
// - List DNS records: GET `/zones/:zone_id/dns_records?page=..&per_page=..`
// - Create: POST `/zones/:zone_id/dns_records`
// - Update: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use zonesync_core::config::DestinationConfig;
use zonesync_core::record::{NormalizedRecord, RawRecord, RecordType};
use zonesync_core::registry::ProviderRegistry;
use zonesync_core::traits::{DestinationProvider, DestinationProviderFactory};
use zonesync_core::{Error, Result};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for record listing
const PER_PAGE: usize = 100;

/// Cloudflare's "automatic" TTL
const AUTO_TTL: u32 = 1;

/// TXT character-string limit
const TXT_CHUNK: usize = 255;

const PROVIDER: &str = "cloudflare";

/// Cloudflare credentials
#[derive(Clone)]
pub enum CloudflareAuth {
    /// Scoped API token
    Token(String),
    /// Account email and global API key
    GlobalKey { email: String, api_key: String },
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for CloudflareAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudflareAuth::Token(_) => f.debug_tuple("Token").field(&"<REDACTED>").finish(),
            CloudflareAuth::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("email", email)
                .field("api_key", &"<REDACTED>")
                .finish(),
        }
    }
}

/// Cloudflare destination provider
///
/// # Security
///
/// The Debug implementation does NOT expose credentials, and error messages
/// are built from status codes and API error text only.
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    auth: CloudflareAuth,
    base_url: String,
    client: reqwest::Client,
    /// Domain → zone id
    zones: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// ============================================================
// API Types
// ============================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// A DNS record as the API returns it
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl From<DnsRecord> for RawRecord {
    fn from(record: DnsRecord) -> Self {
        RawRecord {
            id: Some(record.id),
            name: record.name,
            record_type: record.record_type,
            content: record.content,
            ttl: record.ttl,
            priority: record.priority,
            proxied: record.proxied,
            data: record.data,
        }
    }
}

/// Create/update request body
#[derive(Debug, PartialEq, Serialize)]
struct RecordPayload {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl RecordPayload {
    /// Translate a canonical record into the API's shape
    fn from_record(domain: &str, record: &NormalizedRecord) -> Result<Self> {
        let mut payload = RecordPayload {
            record_type: record.record_type.to_string(),
            name: record.fqdn(domain),
            content: Some(record.value.clone()),
            ttl: record.ttl.unwrap_or(AUTO_TTL),
            priority: None,
            proxied: record
                .record_type
                .is_proxiable()
                .then_some(record.proxied)
                .flatten(),
            data: None,
        };
        let malformed = || Error::apply(PROVIDER, format!("cannot encode {record}"));

        match record.record_type {
            RecordType::Txt => payload.content = Some(quote_txt(&record.value)),
            RecordType::Mx => {
                let (preference, target) = record.value.split_once(' ').ok_or_else(malformed)?;
                payload.priority = Some(preference.parse().map_err(|_| malformed())?);
                payload.content = Some(target.to_string());
            }
            RecordType::Srv => {
                let fields: Vec<&str> = record.value.split(' ').collect();
                let [priority, weight, port, target] = fields.as_slice() else {
                    return Err(malformed());
                };
                let number = |s: &str| s.parse::<u16>().map_err(|_| malformed());
                let priority = number(*priority)?;
                payload.priority = Some(priority);
                payload.content = None;
                payload.data = Some(serde_json::json!({
                    "priority": priority,
                    "weight": number(*weight)?,
                    "port": number(*port)?,
                    "target": *target,
                }));
            }
            RecordType::Caa => {
                let mut parts = record.value.splitn(3, ' ');
                let (Some(flags), Some(tag), Some(value)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(malformed());
                };
                payload.content = None;
                payload.data = Some(serde_json::json!({
                    "flags": flags.parse::<u8>().map_err(|_| malformed())?,
                    "tag": tag,
                    "value": value.trim_matches('"'),
                }));
            }
            _ => {}
        }
        Ok(payload)
    }
}

/// Quote TXT content, splitting it into 255-byte character-strings
fn quote_txt(value: &str) -> String {
    let mut chunks = vec![String::new()];
    for c in value.chars() {
        let escaped = match c {
            '"' => "\\\"".to_string(),
            '\\' => "\\\\".to_string(),
            c => c.to_string(),
        };
        let full = chunks
            .last()
            .is_some_and(|chunk| chunk.len() + escaped.len() > TXT_CHUNK);
        if full {
            chunks.push(String::new());
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push_str(&escaped);
        }
    }
    chunks
        .iter()
        .map(|chunk| format!("\"{chunk}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================
// Client Implementation
// ============================================================

impl CloudflareProvider {
    /// Create a new Cloudflare provider against the public API
    ///
    /// # Errors
    ///
    /// `Error::Config` when the credentials are empty or the HTTP client
    /// cannot be built.
    pub fn new(auth: CloudflareAuth) -> Result<Self> {
        let empty = match &auth {
            CloudflareAuth::Token(token) => token.is_empty(),
            CloudflareAuth::GlobalKey { email, api_key } => email.is_empty() || api_key.is_empty(),
        };
        if empty {
            return Err(Error::config("Cloudflare credentials cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            auth,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            zones: RwLock::new(HashMap::new()),
        })
    }

    /// Point the provider at another API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        match &self.auth {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::GlobalKey { email, api_key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", api_key),
        }
    }

    /// Send a request and unwrap the API envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<ApiResponse<T>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::http(format!("{what}: request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, what, &body));
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::http(format!("{what}: failed to parse response: {e}")))?;
        if !envelope.success {
            return Err(Error::http(format!("{what}: {}", api_errors(&envelope.errors))));
        }
        Ok(envelope)
    }

    /// Resolve (and cache) the zone id of `domain`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com&status=active
    /// ```
    async fn zone_id(&self, domain: &str) -> Result<String> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        if let Some(id) = self
            .zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&domain)
        {
            return Ok(id.clone());
        }

        tracing::debug!(domain = %domain, "Looking up Cloudflare zone id");
        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", domain.as_str()), ("status", "active")]);
        let zones: Vec<Zone> = self
            .send(request, "zone lookup")
            .await?
            .result
            .unwrap_or_default();

        let zone = zones
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("destination zone not found: {domain}")))?;

        tracing::debug!(domain = %domain, zone_id = %zone.id, "Found Cloudflare zone");
        self.zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain, zone.id.clone());
        Ok(zone.id)
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<RawRecord>> {
        let zone_id = self.zone_id(domain).await?;
        let url = format!("{}/zones/{zone_id}/dns_records", self.base_url);

        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self
                .client
                .get(&url)
                .query(&[("page", page.to_string()), ("per_page", PER_PAGE.to_string())]);
            let envelope: ApiResponse<Vec<DnsRecord>> = self.send(request, "record listing").await?;
            let rows = envelope.result.unwrap_or_default();
            let count = rows.len();
            records.extend(rows.into_iter().map(RawRecord::from));

            let last_page = match envelope.result_info {
                Some(info) => info.page >= info.total_pages,
                None => count < PER_PAGE,
            };
            if last_page || count == 0 {
                break;
            }
            page += 1;
        }

        tracing::debug!(domain = %domain, count = records.len(), pages = page, "Fetched Cloudflare records");
        Ok(records)
    }

    async fn create(&self, domain: &str, record: &NormalizedRecord) -> Result<()> {
        let payload = RecordPayload::from_record(domain, record)?;
        let zone_id = self.zone_id(domain).await?;
        let request = self
            .client
            .post(format!("{}/zones/{zone_id}/dns_records", self.base_url))
            .json(&payload);
        self.send::<serde_json::Value>(request, "create").await?;
        Ok(())
    }

    async fn update(&self, domain: &str, previous: &NormalizedRecord, desired: &NormalizedRecord) -> Result<()> {
        let record_id = record_id(previous).or_else(|_| record_id(desired))?;
        let payload = RecordPayload::from_record(domain, desired)?;
        let zone_id = self.zone_id(domain).await?;
        let request = self
            .client
            .put(format!("{}/zones/{zone_id}/dns_records/{record_id}", self.base_url))
            .json(&payload);
        self.send::<serde_json::Value>(request, "update").await?;
        Ok(())
    }

    async fn delete(&self, domain: &str, record: &NormalizedRecord) -> Result<()> {
        let record_id = record_id(record)?;
        let zone_id = self.zone_id(domain).await?;
        let request = self
            .client
            .delete(format!("{}/zones/{zone_id}/dns_records/{record_id}", self.base_url));
        self.send::<serde_json::Value>(request, "delete").await?;
        Ok(())
    }
}

fn record_id(record: &NormalizedRecord) -> Result<&str> {
    record
        .provider_id
        .as_deref()
        .ok_or_else(|| Error::apply(PROVIDER, format!("record {record} has no Cloudflare id")))
}

/// Map an HTTP failure to a specific error
fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    let detail = api_error_text(body);
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{what}: invalid credentials or insufficient permissions (HTTP {status})"
        )),
        404 => Error::not_found(format!("{what}: HTTP {status} {detail}")),
        429 => Error::rate_limited(format!("{what}: HTTP {status}")),
        500..=599 => Error::http(format!("{what}: Cloudflare server error (HTTP {status})")),
        _ => Error::http(format!("{what}: HTTP {status} {detail}")),
    }
}

/// Error text from a failure body, if it is a Cloudflare envelope
fn api_error_text(body: &str) -> String {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .map(|envelope| api_errors(&envelope.errors))
        .unwrap_or_default()
}

fn api_errors(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "unknown API error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl DestinationProvider for CloudflareProvider {
    async fn fetch_records(&self, domain: &str) -> Result<Vec<RawRecord>> {
        self.list_records(domain)
            .await
            .map_err(|e| Error::fetch(PROVIDER, e.to_string()))
    }

    async fn create_record(&self, domain: &str, record: &NormalizedRecord) -> Result<()> {
        tracing::debug!(domain = %domain, record = %record, "Creating Cloudflare record");
        self.create(domain, record).await.map_err(into_apply)
    }

    async fn update_record(
        &self,
        domain: &str,
        previous: &NormalizedRecord,
        desired: &NormalizedRecord,
    ) -> Result<()> {
        tracing::debug!(domain = %domain, record = %desired, "Updating Cloudflare record");
        self.update(domain, previous, desired).await.map_err(into_apply)
    }

    async fn delete_record(&self, domain: &str, record: &NormalizedRecord) -> Result<()> {
        tracing::debug!(domain = %domain, record = %record, "Deleting Cloudflare record");
        self.delete(domain, record).await.map_err(into_apply)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

fn into_apply(error: Error) -> Error {
    match error {
        e @ Error::Apply { .. } => e,
        e => Error::apply(PROVIDER, e.to_string()),
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DestinationProviderFactory for CloudflareFactory {
    fn create(&self, config: &DestinationConfig) -> Result<Box<dyn DestinationProvider>> {
        match config {
            DestinationConfig::Cloudflare {
                api_token,
                email,
                api_key,
                base_url,
            } => {
                let auth = match (api_token, email, api_key) {
                    (Some(token), _, _) if !token.is_empty() => CloudflareAuth::Token(token.clone()),
                    (_, Some(email), Some(api_key)) => CloudflareAuth::GlobalKey {
                        email: email.clone(),
                        api_key: api_key.clone(),
                    },
                    _ => {
                        return Err(Error::config(
                            "Cloudflare requires an API token or an email and API key",
                        ));
                    }
                };

                let mut provider = CloudflareProvider::new(auth)?;
                if let Some(base_url) = base_url {
                    provider = provider.with_base_url(base_url);
                }
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use zonesync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// zonesync_provider_cloudflare::register(&registry);
/// assert!(registry.has_destination("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_destination(PROVIDER, Box::new(CloudflareFactory));
}
