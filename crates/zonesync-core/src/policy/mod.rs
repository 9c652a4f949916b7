// # Policy Engine
//
// Decides which normalized records the engine is responsible for and which
// destination attributes they must carry.
//
// ## Scope
//
// A record is in scope iff:
// - its type is in `managed_types`
// - its name matches no exclude pattern (relative name or FQDN)
// - it is not SOA, and not an NS record at the apex (delegation belongs to the
//   destination provider)
//
// Everything out of scope is invisible to the differ on both sides, which is
// what keeps unmanaged destination records untouched.
//
// ## Proxied flag
//
// Only A/AAAA/CNAME carry a proxied attribute. Precedence, highest first:
// 1. the domain's per-type override
// 2. the first matching global proxy rule
// 3. the global per-type default
// 4. `false`

use crate::config::{DomainConfig, GlobalPolicy, NamePattern};
use crate::record::{NormalizedRecord, RecordType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the zone a run reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    /// Every in-scope record
    Full,
    /// Only the fast-track subset of in-scope records
    FastTrack,
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Full => f.write_str("full"),
            SyncScope::FastTrack => f.write_str("fast_track"),
        }
    }
}

/// Destination attributes a record must end up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DesiredAttributes {
    /// `None` for types that carry no proxied attribute
    pub proxied: Option<bool>,
}

/// Policy decisions for one domain.
///
/// Borrowing view over the process-wide [`GlobalPolicy`] and the domain's
/// [`DomainConfig`] as read at the start of a run.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEngine<'a> {
    global: &'a GlobalPolicy,
    domain: &'a DomainConfig,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(global: &'a GlobalPolicy, domain: &'a DomainConfig) -> Self {
        Self { global, domain }
    }

    pub fn global(&self) -> &'a GlobalPolicy {
        self.global
    }

    /// Whether the engine is responsible for `record`
    pub fn is_in_scope(&self, record: &NormalizedRecord) -> bool {
        is_in_scope(record, self.global, self.domain)
    }

    /// Whether `record` belongs to a run of the given scope
    pub fn is_in_run_scope(&self, record: &NormalizedRecord, scope: SyncScope) -> bool {
        self.is_in_scope(record)
            && match scope {
                SyncScope::Full => true,
                SyncScope::FastTrack => self.is_fast_track(record),
            }
    }

    /// Whether `record` belongs to the fast-track subset
    pub fn is_fast_track(&self, record: &NormalizedRecord) -> bool {
        let fast_track = &self.global.fast_track;
        fast_track.types.contains(&record.record_type)
            && (fast_track.name_patterns.is_empty()
                || matches_any(&fast_track.name_patterns, record, &self.domain.name()))
    }

    /// Attributes the destination copy of `record` must carry
    pub fn desired_attributes(&self, record: &NormalizedRecord) -> DesiredAttributes {
        desired_attributes(record, self.global, self.domain)
    }

    /// `record` with its desired attributes applied
    pub fn with_desired_attributes(&self, record: &NormalizedRecord) -> NormalizedRecord {
        let mut desired = record.clone();
        desired.proxied = self.desired_attributes(record).proxied;
        desired
    }

    /// Whether a destination record of this type may be deleted by a plan
    pub fn is_managed_type(&self, record_type: &RecordType) -> bool {
        self.global.managed_types.contains(record_type)
    }
}

/// A record is in scope iff its type is managed and its name is not excluded.
///
/// SOA and apex NS records are never in scope.
pub fn is_in_scope(record: &NormalizedRecord, global: &GlobalPolicy, domain: &DomainConfig) -> bool {
    if record.record_type == RecordType::Soa {
        return false;
    }
    if record.record_type == RecordType::Ns && record.is_apex() {
        return false;
    }
    if !global.managed_types.contains(&record.record_type) {
        return false;
    }
    !matches_any(&global.exclude_patterns, record, &domain.name())
}

/// Destination attributes for `record` under the given policy
pub fn desired_attributes(
    record: &NormalizedRecord,
    global: &GlobalPolicy,
    domain: &DomainConfig,
) -> DesiredAttributes {
    if !record.record_type.is_proxiable() {
        return DesiredAttributes { proxied: None };
    }

    let zone = domain.name();
    let proxied = domain
        .proxy_overrides
        .get(&record.record_type)
        .copied()
        .or_else(|| {
            global
                .proxy_rules
                .iter()
                .find(|rule| matches_record(&rule.pattern, record, &zone))
                .map(|rule| rule.proxied)
        })
        .or_else(|| global.proxy_defaults.get(&record.record_type).copied())
        .unwrap_or(false);

    DesiredAttributes {
        proxied: Some(proxied),
    }
}

fn matches_record(pattern: &NamePattern, record: &NormalizedRecord, zone: &str) -> bool {
    pattern.is_match(&record.name) || pattern.is_match(&record.fqdn(zone))
}

fn matches_any(patterns: &[NamePattern], record: &NormalizedRecord, zone: &str) -> bool {
    patterns.iter().any(|p| matches_record(p, record, zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyRule;

    fn record(name: &str, record_type: RecordType, value: &str) -> NormalizedRecord {
        NormalizedRecord::new(name, record_type, value)
    }

    fn policy() -> GlobalPolicy {
        GlobalPolicy {
            exclude_patterns: vec![
                NamePattern::new("_domainkey*").unwrap(),
                NamePattern::new("internal.example.com").unwrap(),
            ],
            ..GlobalPolicy::default()
        }
    }

    #[test]
    fn scope_requires_managed_type() {
        let global = policy();
        let domain = DomainConfig::new("example.com");
        assert!(is_in_scope(&record("www", RecordType::A, "1.2.3.4"), &global, &domain));
        assert!(!is_in_scope(&record("www", RecordType::Ptr, "host.example.com"), &global, &domain));
        assert!(!is_in_scope(&record("@", RecordType::Soa, "ns1 hostmaster 1"), &global, &domain));
    }

    #[test]
    fn exclude_patterns_match_relative_and_fqdn() {
        let global = policy();
        let domain = DomainConfig::new("example.com");
        assert!(!is_in_scope(&record("_domainkey.mail", RecordType::Txt, "k=rsa"), &global, &domain));
        assert!(!is_in_scope(&record("internal", RecordType::A, "10.0.0.1"), &global, &domain));
        assert!(is_in_scope(&record("external", RecordType::A, "1.1.1.1"), &global, &domain));
    }

    #[test]
    fn apex_ns_is_never_in_scope() {
        let mut global = policy();
        global.managed_types.insert(RecordType::Ns);
        let domain = DomainConfig::new("example.com");
        assert!(!is_in_scope(&record("@", RecordType::Ns, "ns1.example.net"), &global, &domain));
        assert!(is_in_scope(&record("sub", RecordType::Ns, "ns1.example.net"), &global, &domain));
    }

    #[test]
    fn proxy_precedence() {
        let mut global = GlobalPolicy::default();
        global.proxy_defaults.insert(RecordType::A, true);
        global.proxy_rules.push(ProxyRule::new("mail*", false).unwrap());
        let plain = DomainConfig::new("example.com");

        let www = record("www", RecordType::A, "1.2.3.4");
        let mail = record("mail", RecordType::A, "1.2.3.5");
        let cname = record("api", RecordType::Cname, "lb.example.com");

        assert_eq!(desired_attributes(&www, &global, &plain).proxied, Some(true));
        assert_eq!(desired_attributes(&mail, &global, &plain).proxied, Some(false));
        assert_eq!(desired_attributes(&cname, &global, &plain).proxied, Some(false));

        let overridden = DomainConfig::new("example.com").with_proxy_override(RecordType::A, false);
        assert_eq!(desired_attributes(&www, &global, &overridden).proxied, Some(false));

        let forced = DomainConfig::new("example.com").with_proxy_override(RecordType::A, true);
        assert_eq!(desired_attributes(&mail, &global, &forced).proxied, Some(true));
    }

    #[test]
    fn non_proxiable_types_have_no_proxied_attribute() {
        let mut global = GlobalPolicy::default();
        global.proxy_defaults.insert(RecordType::A, true);
        let domain = DomainConfig::new("example.com");
        let txt = record("@", RecordType::Txt, "v=spf1 -all");
        assert_eq!(desired_attributes(&txt, &global, &domain).proxied, None);
    }

    #[test]
    fn fast_track_subset() {
        let global = GlobalPolicy::default();
        let domain = DomainConfig::new("example.com");
        let engine = PolicyEngine::new(&global, &domain);

        let challenge = record("_acme-challenge.www", RecordType::Txt, "token");
        let spf = record("@", RecordType::Txt, "v=spf1 -all");
        let www = record("www", RecordType::A, "1.2.3.4");

        assert!(engine.is_in_run_scope(&challenge, SyncScope::FastTrack));
        assert!(!engine.is_in_run_scope(&spf, SyncScope::FastTrack));
        assert!(!engine.is_in_run_scope(&www, SyncScope::FastTrack));
        assert!(engine.is_in_run_scope(&www, SyncScope::Full));
    }

    #[test]
    fn fast_track_still_honours_excludes() {
        let mut global = GlobalPolicy::default();
        global
            .exclude_patterns
            .push(NamePattern::new("_acme-challenge.legacy").unwrap());
        let domain = DomainConfig::new("example.com");
        let engine = PolicyEngine::new(&global, &domain);

        let excluded = record("_acme-challenge.legacy", RecordType::Txt, "token");
        assert!(!engine.is_in_run_scope(&excluded, SyncScope::FastTrack));
    }
}
