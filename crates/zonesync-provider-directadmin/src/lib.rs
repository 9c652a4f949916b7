// # DirectAdmin Source Provider
//
// `SourceProvider` over the DirectAdmin `CMD_API_DNS_CONTROL` API.
//
// ## Behaviour
//
// - One GET per fetch: `/CMD_API_DNS_CONTROL?domain=<zone>&json=yes`
// - Pointer (alias) domains are served by their base domain:
//   `/CMD_DNS_CONTROL?domain=<base>&ptr=<alias>&json=yes&ttl=yes`
// - Read-only: the source zone is never modified
// - Any HTTP failure, panel error, empty body or unrecognizable body is a
//   fetch error. An empty record list is only returned when the panel sends
//   an explicit empty JSON list, so a broken response can never plan a mass
//   delete.
//
// ## Pointer discovery
//
// A domain configured with a base domain is always fetched as a pointer. For
// the rest, the first fetch lists the panel's domains
// (`CMD_API_SHOW_DOMAINS`) and each domain's pointers (`CMD_API_DOMAIN_POINTER`
// and `CMD_API_SHOW_DOMAIN_POINTERS`). Discovery runs once per provider and is
// best-effort: when it fails every zone is fetched directly.
//
// ## Response formats
//
// Newer panels answer with JSON, the record rows under `records`, `list` or
// `dns`, each row carrying `name`/`host`, `type`, `value`/`data`/`content` and
// optional `ttl`/`priority` (numbers or digit strings).
//
// Older panels answer with one record per line:
//
// ```text
// # comment
// www     A     192.0.2.1   3600
// @       MX    mail        3600  10
// @       TXT   "v=spf1 -all"
// ```
//
// ## Authentication
//
// - Username + password or login key: HTTP basic auth
// - API token: `Authorization: Bearer <token>`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use zonesync_core::config::SourceConfig;
use zonesync_core::record::RawRecord;
use zonesync_core::registry::ProviderRegistry;
use zonesync_core::traits::{SourceProvider, SourceProviderFactory};
use zonesync_core::{Error, Result};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "directadmin";

/// Keys a JSON response may keep its record rows under
const ROW_KEYS: [&str; 3] = ["records", "list", "dns"];

/// Keys `CMD_API_SHOW_DOMAINS` lists domains under
const DOMAIN_LIST_KEYS: [&str; 3] = ["list[]", "list", "domains"];

/// Endpoints that list a domain's pointers; panels implement one or the other
const POINTER_ENDPOINTS: [&str; 2] = ["CMD_API_DOMAIN_POINTER", "CMD_API_SHOW_DOMAIN_POINTERS"];

/// Pointer domain -> base domain
pub type PointerMap = HashMap<String, String>;

/// DirectAdmin credentials
#[derive(Clone)]
pub enum DirectAdminAuth {
    /// Panel user with password or login key
    Basic { username: String, password: String },
    /// API token
    Token(String),
}

impl std::fmt::Debug for DirectAdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectAdminAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<REDACTED>")
                .finish(),
            DirectAdminAuth::Token(_) => f.debug_tuple("Token").field(&"<REDACTED>").finish(),
        }
    }
}

/// DirectAdmin source provider
pub struct DirectAdminProvider {
    base_url: String,
    /// ⚠️ NEVER log this value
    auth: DirectAdminAuth,
    client: reqwest::Client,
    /// `None` until a discovery pass has listed the panel's domains
    pointers: RwLock<Option<PointerMap>>,
}

impl std::fmt::Debug for DirectAdminProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectAdminProvider")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl DirectAdminProvider {
    /// Create a provider for the panel at `base_url`
    /// (e.g. `https://panel.example.net:2222`)
    ///
    /// # Errors
    ///
    /// `Error::Config` for an empty URL or empty credentials.
    pub fn new(base_url: impl Into<String>, auth: DirectAdminAuth) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("DirectAdmin URL cannot be empty"));
        }
        let empty = match &auth {
            DirectAdminAuth::Basic { username, password } => username.is_empty() || password.is_empty(),
            DirectAdminAuth::Token(token) => token.is_empty(),
        };
        if empty {
            return Err(Error::config("DirectAdmin credentials cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            auth,
            client,
            pointers: RwLock::new(None),
        })
    }

    /// Map every pointer domain on the panel to its base domain, replacing
    /// the map later fetches consult
    ///
    /// # Errors
    ///
    /// Only when the domain listing itself fails. A base domain whose pointer
    /// endpoints fail contributes no pointers.
    pub async fn discover_pointers(&self) -> Result<PointerMap> {
        let body = self.get("CMD_API_SHOW_DOMAINS", &[]).await?;
        let bases = parse_domain_list(&body)?;

        let mut pointers = PointerMap::new();
        for base in &bases {
            for endpoint in POINTER_ENDPOINTS {
                match self.get(endpoint, &[("domain", base.as_str())]).await {
                    Ok(body) => {
                        for alias in parse_pointer_list(&body) {
                            if alias != *base {
                                pointers.insert(alias, base.clone());
                            }
                        }
                    }
                    Err(e) => tracing::debug!(domain = %base, endpoint, error = %e, "Pointer listing unavailable"),
                }
            }
        }
        tracing::info!(domains = bases.len(), pointers = pointers.len(), "Discovered DirectAdmin domain pointers");
        *self.pointers.write().unwrap_or_else(PoisonError::into_inner) = Some(pointers.clone());
        Ok(pointers)
    }

    /// Base domain of `domain` when the panel lists it as a pointer
    async fn discovered_base(&self, domain: &str) -> Option<String> {
        {
            let cached = self.pointers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(map) = cached.as_ref() {
                return map.get(domain).cloned();
            }
        }

        match self.discover_pointers().await {
            Ok(map) => map.get(domain).cloned(),
            Err(e) => {
                tracing::warn!(error = %e, "DirectAdmin pointer discovery failed, fetching zones directly");
                *self.pointers.write().unwrap_or_else(PoisonError::into_inner) = Some(PointerMap::new());
                None
            }
        }
    }

    async fn dns_control(&self, domain: &str) -> Result<String> {
        self.get("CMD_API_DNS_CONTROL", &[("domain", domain), ("json", "yes")]).await
    }

    async fn pointer_dns_control(&self, alias: &str, base: &str) -> Result<String> {
        self.get(
            "CMD_DNS_CONTROL",
            &[("domain", base), ("ptr", alias), ("json", "yes"), ("ttl", "yes")],
        )
        .await
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String> {
        let request = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(query);
        let request = match &self.auth {
            DirectAdminAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            DirectAdminAuth::Token(token) => request.bearer_auth(token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        response
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read response: {e}")))
    }
}

fn status_error(status: StatusCode) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!("panel rejected the credentials (HTTP {status})")),
        404 => Error::not_found(format!("DNS control endpoint or zone not found (HTTP {status})")),
        429 => Error::rate_limited(format!("HTTP {status}")),
        500..=599 => Error::http(format!("DirectAdmin server error (HTTP {status})")),
        _ => Error::http(format!("HTTP {status}")),
    }
}

/// Parse a `CMD_API_DNS_CONTROL` body in either response format
pub fn parse_records(body: &str) -> Result<Vec<RawRecord>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Err(Error::http("panel answered with HTML instead of DNS records"));
    }
    if trimmed.starts_with("error=1") {
        let detail = trimmed
            .split('&')
            .find_map(|pair| pair.strip_prefix("text="))
            .map(|text| text.replace('+', " "))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(Error::http(format!("panel reported an error: {detail}")));
    }

    if trimmed.is_empty() {
        return Err(Error::http("panel returned an empty response"));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => parse_json(&json),
        Err(_) => parse_legacy(trimmed),
    }
}

fn parse_json(json: &Value) -> Result<Vec<RawRecord>> {
    let rows = ROW_KEYS
        .iter()
        .find_map(|key| json.get(key).and_then(Value::as_array))
        .ok_or_else(|| Error::http("JSON response has no record list"))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match record_from_row(row) {
            Some(record) => records.push(record),
            None => tracing::debug!(row = %row, "Ignoring DirectAdmin row without name or type"),
        }
    }
    Ok(records)
}

fn record_from_row(row: &Value) -> Option<RawRecord> {
    let text = |keys: &[&str]| {
        keys.iter().find_map(|key| match row.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    let number = |key: &str| match row.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    let record_type = text(&["type", "record_type"])?;
    let name = text(&["name", "host"])?;
    Some(RawRecord {
        id: None,
        name,
        record_type,
        content: text(&["value", "data", "content"]).unwrap_or_default(),
        ttl: number("ttl").and_then(|ttl| u32::try_from(ttl).ok()),
        priority: number("priority").and_then(|p| u16::try_from(p).ok()),
        proxied: None,
        data: None,
    })
}

/// Legacy one-record-per-line format: `name type content [ttl] [priority]`
///
/// A body without a single parsable line is not a zone.
fn parse_legacy(body: &str) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = tokenize(line);
        let [name, record_type, content, rest @ ..] = tokens.as_slice() else {
            tracing::debug!(line = %line, "Ignoring short DirectAdmin line");
            continue;
        };
        let digits = |index: usize| {
            rest.get(index)
                .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
                .and_then(|t| t.parse().ok())
        };
        let mut record = RawRecord::new(name.as_str(), record_type.as_str(), content.as_str());
        record.ttl = digits(0);
        record.priority = digits(1).and_then(|p: u32| u16::try_from(p).ok());
        records.push(record);
    }
    if records.is_empty() {
        return Err(Error::http("response contains no DNS records"));
    }
    Ok(records)
}

/// Domains from a `CMD_API_SHOW_DOMAINS` body (`list[]=a.com&list[]=b.org`)
fn parse_domain_list(body: &str) -> Result<BTreeSet<String>> {
    let pairs = form_pairs(body)?;
    Ok(pairs
        .into_iter()
        .filter(|(key, _)| DOMAIN_LIST_KEYS.contains(&key.as_str()))
        .filter_map(|(_, value)| domain_token(&value))
        .collect())
}

/// Pointer domains from a pointer-listing body.
///
/// Panels put the pointer in the key (`alias_example_com=alias`) or in the
/// value (`list[]=alias.example.com`); both are accepted.
fn parse_pointer_list(body: &str) -> BTreeSet<String> {
    let Ok(pairs) = form_pairs(body) else {
        return BTreeSet::new();
    };
    pairs
        .iter()
        .flat_map(|(key, value)| [domain_token(key), domain_token(value)])
        .flatten()
        .collect()
}

fn form_pairs(body: &str) -> Result<Vec<(String, String)>> {
    let trimmed = body.trim();
    if trimmed.starts_with("error=1") {
        return Err(Error::http("panel reported an error"));
    }
    serde_urlencoded::from_str(trimmed).map_err(|e| Error::http(format!("unreadable panel response: {e}")))
}

/// The panel encodes dots in keys as underscores
fn domain_token(token: &str) -> Option<String> {
    let domain = token.trim().replace('_', ".").to_ascii_lowercase();
    let plausible = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    plausible.then_some(domain)
}

/// Split on whitespace, keeping a double-quoted token (with its quotes) whole
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[async_trait]
impl SourceProvider for DirectAdminProvider {
    async fn fetch_records(&self, domain: &str) -> Result<Vec<RawRecord>> {
        if let Some(base) = self.discovered_base(domain).await {
            return self.fetch_pointer_records(domain, &base).await;
        }

        let records = self
            .dns_control(domain)
            .await
            .and_then(|body| parse_records(&body))
            .map_err(|e| Error::fetch(PROVIDER, e.to_string()))?;

        tracing::debug!(domain = %domain, count = records.len(), "Fetched DirectAdmin records");
        Ok(records)
    }

    async fn fetch_pointer_records(&self, alias: &str, base: &str) -> Result<Vec<RawRecord>> {
        let records = self
            .pointer_dns_control(alias, base)
            .await
            .and_then(|body| parse_records(&body))
            .map_err(|e| Error::fetch(PROVIDER, e.to_string()))?;

        tracing::debug!(domain = %alias, base = %base, count = records.len(), "Fetched DirectAdmin pointer records");
        Ok(records)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating DirectAdmin providers
pub struct DirectAdminFactory;

impl SourceProviderFactory for DirectAdminFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn SourceProvider>> {
        match config {
            SourceConfig::DirectAdmin {
                url,
                username,
                password,
                token,
            } => {
                let auth = match (token, password) {
                    (Some(token), _) if !token.is_empty() => DirectAdminAuth::Token(token.clone()),
                    (_, Some(password)) => DirectAdminAuth::Basic {
                        username: username.clone(),
                        password: password.clone(),
                    },
                    _ => {
                        return Err(Error::config(
                            "DirectAdmin requires a password, login key or token",
                        ));
                    }
                };
                Ok(Box::new(DirectAdminProvider::new(url.clone(), auth)?))
            }
            _ => Err(Error::config("Invalid config for DirectAdmin provider")),
        }
    }
}

/// Register the DirectAdmin provider with a registry
///
/// # Example
///
/// ```rust
/// use zonesync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// zonesync_provider_directadmin::register(&registry);
/// assert!(registry.has_source("directadmin"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_source(PROVIDER, Box::new(DirectAdminFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zonesync_core::record::{RecordOrigin, normalize_all};

    fn basic(server: &MockServer) -> DirectAdminProvider {
        DirectAdminProvider::new(
            server.uri(),
            DirectAdminAuth::Basic {
                username: "user".into(),
                password: "hunter2".into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_json_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .and(query_param("domain", "example.com"))
            .and(query_param("json", "yes"))
            // base64("user:hunter2")
            .and(header("Authorization", "Basic dXNlcjpodW50ZXIy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    { "name": "www", "type": "A", "value": "192.0.2.1", "ttl": "3600" },
                    { "name": "example.com.", "type": "MX", "value": "mail", "ttl": 3600, "priority": "10" },
                    { "host": "@", "type": "TXT", "data": "\"v=spf1 -all\"" },
                    { "type": "A", "value": "192.0.2.2" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = basic(&server).fetch_records("example.com").await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ttl, Some(3600));
        assert_eq!(records[1].priority, Some(10));
        assert_eq!(records[2].content, "\"v=spf1 -all\"");

        let (normalized, malformed) = normalize_all(&records, "example.com", RecordOrigin::Source);
        assert!(malformed.is_empty());
        assert_eq!(normalized[1].name, "@");
        assert_eq!(normalized[1].value, "10 mail.example.com");
        assert_eq!(normalized[2].value, "v=spf1 -all");
    }

    #[tokio::test]
    async fn test_fetch_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .and(header("Authorization", "Bearer da-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [] })))
            .mount(&server)
            .await;

        let provider = DirectAdminProvider::new(server.uri(), DirectAdminAuth::Token("da-token".into())).unwrap();
        assert!(provider.fetch_records("example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_legacy_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "# zone dump\nwww A 1.2.3.4 300\n@\tTXT\t\"hello world\" 300\n@ MX mail 3600 10\nbroken line\n",
            ))
            .mount(&server)
            .await;

        let records = basic(&server).fetch_records("example.com").await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ttl, Some(300));
        assert_eq!(records[1].content, "\"hello world\"");
        assert_eq!(records[1].ttl, Some(300));
        assert_eq!(records[2].priority, Some(10));
    }

    #[tokio::test]
    async fn test_http_errors_are_fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("domain", "denied.example"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("domain", "broken.example"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = basic(&server);

        let denied = provider.fetch_records("denied.example").await.unwrap_err();
        assert!(matches!(denied, Error::Fetch { .. }));
        assert!(denied.to_string().contains("Authentication failed"));
        assert!(!denied.to_string().contains("hunter2"));

        // A server error never reads as an empty zone
        let broken = provider.fetch_records("broken.example").await.unwrap_err();
        assert!(matches!(broken, Error::Fetch { .. }));
    }

    #[test]
    fn test_unrecognized_bodies_are_errors() {
        assert!(parse_records("<html><body>Login</body></html>").is_err());
        assert!(parse_records(r#"{"result": "ok"}"#).is_err());

        let err = parse_records("error=1&text=Cannot+find+domain&details=").unwrap_err();
        assert!(err.to_string().contains("Cannot find domain"));
    }

    #[test]
    fn test_empty_and_junk_bodies_are_errors() {
        for body in ["", "   \n", "OK\n", "# zone dump\n# nothing else\n", "short line\n"] {
            assert!(parse_records(body).is_err(), "{body:?} must not read as an empty zone");
        }

        // Only an explicit empty list means an empty zone
        assert!(parse_records(r#"{"records": []}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_response_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let err = basic(&server).fetch_records("example.com").await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn test_fetch_pointer_records_through_base_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_DNS_CONTROL"))
            .and(query_param("domain", "example.com"))
            .and(query_param("ptr", "alias.example"))
            .and(query_param("json", "yes"))
            .and(query_param("ttl", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{ "name": "www", "type": "A", "value": "192.0.2.7", "ttl": 300 }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let records = basic(&server)
            .fetch_pointer_records("alias.example", "example.com")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "192.0.2.7");
    }

    #[tokio::test]
    async fn test_discovered_pointer_is_fetched_through_its_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(ResponseTemplate::new(200).set_body_string("list[]=example.com&list[]=other.org"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DOMAIN_POINTER"))
            .and(query_param("domain", "example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alias_example=alias"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DOMAIN_POINTER"))
            .and(query_param("domain", "other.org"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_DNS_CONTROL"))
            .and(query_param("domain", "example.com"))
            .and(query_param("ptr", "alias.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{ "name": "@", "type": "A", "value": "192.0.2.8" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_DNS_CONTROL"))
            .and(query_param("domain", "other.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{ "name": "@", "type": "A", "value": "192.0.2.9" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = basic(&server);
        let map = provider.discover_pointers().await.unwrap();
        assert_eq!(map.get("alias.example").map(String::as_str), Some("example.com"));
        assert_eq!(map.len(), 1);

        // The provider's own discovery runs once and is cached
        let alias = provider.fetch_records("alias.example").await.unwrap();
        assert_eq!(alias[0].content, "192.0.2.8");
        let other = provider.fetch_records("other.org").await.unwrap();
        assert_eq!(other[0].content, "192.0.2.9");
    }

    #[test]
    fn test_pointer_list_parsing() {
        assert_eq!(
            parse_pointer_list("alias_example_com=alias&list[]=second.example.net&error=0"),
            BTreeSet::from(["alias.example.com".to_string(), "second.example.net".to_string()])
        );
        assert!(parse_pointer_list("error=1&text=Not+supported").is_empty());
        assert_eq!(
            parse_domain_list("list%5B%5D=Example.com&list%5B%5D=other.org&count=2").unwrap(),
            BTreeSet::from(["example.com".to_string(), "other.org".to_string()])
        );
    }

    #[test]
    fn test_alternative_row_keys() {
        let records = parse_records(r#"{"dns": [{"name": "a", "type": "A", "content": "192.0.2.3"}]}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "192.0.2.3");
    }

    #[test]
    fn test_tokenize_keeps_quoted_strings() {
        assert_eq!(
            tokenize(r#"@ TXT "say \"hi\" there" 60"#),
            [r"@", "TXT", r#""say \"hi\" there""#, "60"]
        );
        assert_eq!(tokenize("  www   A  192.0.2.1 "), ["www", "A", "192.0.2.1"]);
    }

    #[test]
    fn test_factory() {
        let factory = DirectAdminFactory;
        let config = SourceConfig::DirectAdmin {
            url: "https://panel.example.net:2222".into(),
            username: "user".into(),
            password: Some("secret".into()),
            token: None,
        };
        assert!(factory.create(&config).is_ok());

        let missing = SourceConfig::DirectAdmin {
            url: "https://panel.example.net:2222".into(),
            username: "user".into(),
            password: None,
            token: Some(String::new()),
        };
        assert!(matches!(factory.create(&missing), Err(Error::Config(_))));

        let registry = ProviderRegistry::new();
        register(&registry);
        assert_eq!(registry.list_sources(), ["directadmin"]);
    }

    #[test]
    fn test_credentials_not_exposed_in_debug() {
        let provider = DirectAdminProvider::new(
            "https://panel.example.net:2222",
            DirectAdminAuth::Basic {
                username: "user".into(),
                password: "hunter2".into(),
            },
        )
        .unwrap();
        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("user"));
    }
}
