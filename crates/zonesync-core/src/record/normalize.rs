// # Record Normalizer
//
// Converts provider-neutral raw records into their canonical comparison form.
//
// ## Canonicalization rules
//
// - Names: lowercase, trailing dot stripped, made relative to the zone apex
//   (`@` for the apex itself)
// - A / AAAA: parsed and re-printed, so `2001:DB8:0::1` equals `2001:db8::1`
// - CNAME / NS / PTR / MX / SRV targets: lowercase, fully qualified, no
//   trailing dot
// - TXT: surrounding quotes removed, multi-string segments joined, runs of
//   whitespace collapsed
// - MX: `<preference> <target>`
// - SRV: `<priority> <weight> <port> <target>`
// - CAA: `<flags> <tag> "<value>"`
//
// The functions here are pure: no I/O, no logging.

use std::net::{Ipv4Addr, Ipv6Addr};

use super::{NormalizedRecord, RawRecord, RecordOrigin, RecordType};
use crate::error::MalformedRecordError;

/// Normalize a single raw record fetched from `origin` for `zone`.
///
/// # Returns
///
/// - `Ok(NormalizedRecord)`: The canonical record
/// - `Err(MalformedRecordError)`: The payload cannot be interpreted; the error
///   carries the raw record so the caller can report it as skipped
pub fn normalize(
    raw: &RawRecord,
    zone: &str,
    origin: RecordOrigin,
) -> Result<NormalizedRecord, MalformedRecordError> {
    let zone = canonical_zone(zone);

    let record_type: RecordType = raw
        .record_type
        .parse()
        .map_err(|_| MalformedRecordError::new(raw, "missing or invalid record type"))?;

    let name = relative_name(&raw.name, &zone).map_err(|reason| MalformedRecordError::new(raw, reason))?;

    let value = canonical_value(raw, &record_type, &zone)
        .map_err(|reason| MalformedRecordError::new(raw, reason))?;

    // 0 means unset; Cloudflare's 1 ("automatic") is kept as a real value
    let ttl = raw.ttl.filter(|ttl| *ttl > 0);

    let proxied = match origin {
        RecordOrigin::Destination if record_type.is_proxiable() => raw.proxied,
        _ => None,
    };

    Ok(NormalizedRecord {
        name,
        record_type,
        value,
        ttl,
        proxied,
        provider_id: raw.id.clone(),
    })
}

/// Normalize a batch, splitting successes from malformed payloads.
///
/// Input order is preserved in the successful output, which matters for the
/// differ's "first encountered wins" duplicate rule.
pub fn normalize_all(
    raws: &[RawRecord],
    zone: &str,
    origin: RecordOrigin,
) -> (Vec<NormalizedRecord>, Vec<MalformedRecordError>) {
    let mut records = Vec::with_capacity(raws.len());
    let mut malformed = Vec::new();

    for raw in raws {
        match normalize(raw, zone, origin) {
            Ok(record) => records.push(record),
            Err(e) => malformed.push(e),
        }
    }

    (records, malformed)
}

/// The `(name, type)` a malformed record would have occupied in `zone`.
///
/// `None` when not even the name resolves. The type is `None` when only the
/// type failed to parse.
pub fn malformed_slot(raw: &RawRecord, zone: &str) -> Option<(String, Option<RecordType>)> {
    let name = relative_name(&raw.name, &canonical_zone(zone)).ok()?;
    Some((name, raw.record_type.parse().ok()))
}

fn canonical_zone(zone: &str) -> String {
    zone.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Turn a provider name (relative or absolute) into a zone-relative name.
fn relative_name(raw_name: &str, zone: &str) -> Result<String, String> {
    let trimmed = raw_name.trim();
    let absolute = trimmed.ends_with('.') && trimmed != ".";
    let name = trimmed.trim_end_matches('.').to_ascii_lowercase();

    if name.is_empty() || name == "@" || name == zone {
        return Ok("@".to_string());
    }

    let suffix = format!(".{zone}");
    let relative = if let Some(stripped) = name.strip_suffix(&suffix) {
        stripped.to_string()
    } else if absolute {
        return Err(format!("name '{trimmed}' is outside zone '{zone}'"));
    } else {
        name
    };

    for label in relative.split('.') {
        if label.is_empty() {
            return Err(format!("name '{trimmed}' has an empty label"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '*'))
        {
            return Err(format!("name '{trimmed}' contains invalid characters"));
        }
    }

    Ok(relative)
}

/// Qualify a target host name against the zone.
///
/// `@` and empty targets mean the apex; names containing a dot are taken as
/// already fully qualified; single labels are relative to the zone. A lone `.`
/// is the root (SRV "no service" target) and is kept as is.
fn qualify_target(target: &str, zone: &str) -> Result<String, String> {
    let target = target.trim().to_ascii_lowercase();
    if target == "." {
        return Ok(target);
    }
    let stripped = target.trim_end_matches('.');
    if stripped.is_empty() || stripped == "@" {
        return Ok(zone.to_string());
    }
    if stripped.chars().any(char::is_whitespace) {
        return Err(format!("target '{target}' contains whitespace"));
    }
    if target.ends_with('.') || stripped.contains('.') {
        Ok(stripped.to_string())
    } else {
        Ok(format!("{stripped}.{zone}"))
    }
}

fn canonical_value(raw: &RawRecord, record_type: &RecordType, zone: &str) -> Result<String, String> {
    let content = raw.content.trim();

    let value = match record_type {
        RecordType::A => content
            .parse::<Ipv4Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| format!("'{content}' is not an IPv4 address"))?,
        RecordType::Aaaa => content
            .parse::<Ipv6Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| format!("'{content}' is not an IPv6 address"))?,
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => {
            if content.is_empty() {
                return Err("empty target".to_string());
            }
            qualify_target(content, zone)?
        }
        RecordType::Txt => normalize_txt(content),
        RecordType::Mx => canonical_mx(raw, content, zone)?,
        RecordType::Srv => canonical_srv(raw, content, zone)?,
        RecordType::Caa => canonical_caa(raw, content)?,
        RecordType::Soa | RecordType::Other(_) => {
            content.split_whitespace().collect::<Vec<_>>().join(" ")
        }
    };

    if value.is_empty() {
        return Err("empty value".to_string());
    }
    Ok(value)
}

/// Normalize TXT content so differently-quoted storage compares equal.
///
/// `"v=spf1 -all"`, `v=spf1 -all` and `"v=spf1" " -all"` all become
/// `v=spf1 -all`.
pub fn normalize_txt(content: &str) -> String {
    let trimmed = content.trim();
    let joined = if trimmed.starts_with('"') {
        join_quoted_segments(trimmed)
    } else {
        trimmed.to_string()
    };
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_quoted_segments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_quotes = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => in_quotes = !in_quotes,
            c if in_quotes => out.push(c),
            c if c.is_whitespace() => {}
            // Unquoted text between segments is kept verbatim
            c => out.push(c),
        }
    }

    out
}

fn canonical_mx(raw: &RawRecord, content: &str, zone: &str) -> Result<String, String> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    let (preference, target) = match fields.as_slice() {
        [preference, target] => {
            let preference = preference
                .parse::<u16>()
                .map_err(|_| format!("invalid MX preference '{preference}'"))?;
            (preference, *target)
        }
        [target] => {
            let preference = raw
                .priority
                .ok_or_else(|| "MX record without preference".to_string())?;
            (preference, *target)
        }
        _ => return Err(format!("cannot parse MX content '{content}'")),
    };
    Ok(format!("{preference} {}", qualify_target(target, zone)?))
}

fn canonical_srv(raw: &RawRecord, content: &str, zone: &str) -> Result<String, String> {
    if let Some(data) = raw.data.as_ref().filter(|d| d.get("target").is_some()) {
        let field = |key: &str| -> Result<u16, String> {
            data.get(key)
                .and_then(serde_json::Value::as_u64)
                .or_else(|| (key == "priority").then(|| raw.priority.map(u64::from)).flatten())
                .and_then(|v| u16::try_from(v).ok())
                .ok_or_else(|| format!("SRV data missing '{key}'"))
        };
        let target = data
            .get("target")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| "SRV target is not a string".to_string())?;
        return Ok(format!(
            "{} {} {} {}",
            field("priority")?,
            field("weight")?,
            field("port")?,
            qualify_target(target, zone)?
        ));
    }

    let fields: Vec<&str> = content.split_whitespace().collect();
    let parse = |s: &str, what: &str| -> Result<u16, String> {
        s.parse::<u16>().map_err(|_| format!("invalid SRV {what} '{s}'"))
    };
    let (priority, weight, port, target) = match fields.as_slice() {
        [priority, weight, port, target] => (
            parse(priority, "priority")?,
            parse(weight, "weight")?,
            parse(port, "port")?,
            *target,
        ),
        [weight, port, target] => (
            raw.priority
                .ok_or_else(|| "SRV record without priority".to_string())?,
            parse(weight, "weight")?,
            parse(port, "port")?,
            *target,
        ),
        _ => return Err(format!("cannot parse SRV content '{content}'")),
    };
    Ok(format!(
        "{priority} {weight} {port} {}",
        qualify_target(target, zone)?
    ))
}

fn canonical_caa(raw: &RawRecord, content: &str) -> Result<String, String> {
    if let Some(data) = raw.data.as_ref().filter(|d| d.get("tag").is_some()) {
        let flags = data
            .get("flags")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| "CAA data missing 'flags'".to_string())?;
        let tag = data
            .get("tag")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| "CAA data missing 'tag'".to_string())?;
        let value = data
            .get("value")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| "CAA data missing 'value'".to_string())?;
        return Ok(format_caa(flags, tag, value));
    }

    let mut parts = content.splitn(3, char::is_whitespace);
    let flags = parts
        .next()
        .and_then(|f| f.parse::<u8>().ok())
        .ok_or_else(|| format!("invalid CAA flags in '{content}'"))?;
    let tag = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| format!("missing CAA tag in '{content}'"))?;
    let value = parts
        .next()
        .ok_or_else(|| format!("missing CAA value in '{content}'"))?;
    Ok(format_caa(flags, tag, value))
}

fn format_caa(flags: u8, tag: &str, value: &str) -> String {
    let value = value.trim().trim_matches('"');
    format!("{flags} {} \"{value}\"", tag.trim().to_ascii_lowercase())
}
