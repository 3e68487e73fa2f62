// ── Canonical forms for attribute comparison ──
//
// Applied to desired and live definitions alike, so that formatting
// differences never show up as updates.

use std::collections::BTreeSet;
use std::net::IpAddr;

/// Trimmed text; blank becomes `None`.
pub fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Trimmed, non-blank set entries.
pub fn set(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn lowercase(value: Option<String>) -> Option<String> {
    text(value).map(|v| v.to_lowercase())
}

/// Parse and re-render an address literal.
///
/// Handles plain addresses, `addr/prefix` and `start-end` ranges. Host
/// prefixes (`/32`, `/128`) are dropped. Anything unparseable is only trimmed.
pub fn address(raw: &str) -> String {
    let raw = raw.trim();
    if let Some((start, end)) = raw.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.trim().parse::<IpAddr>(), end.trim().parse::<IpAddr>())
        {
            return format!("{start}-{end}");
        }
        return raw.to_owned();
    }
    match parse_cidr(raw) {
        Some((addr, None)) => addr.to_string(),
        Some((addr, Some(prefix))) if prefix == host_prefix(addr) => addr.to_string(),
        Some((addr, Some(prefix))) => format!("{addr}/{prefix}"),
        None => raw.to_owned(),
    }
}

/// `true` for IP addresses, CIDR networks and address ranges.
pub fn is_address_literal(raw: &str) -> bool {
    let raw = raw.trim();
    if let Some((start, end)) = raw.split_once('-') {
        return start.trim().parse::<IpAddr>().is_ok() && end.trim().parse::<IpAddr>().is_ok();
    }
    parse_cidr(raw).is_some()
}

fn parse_cidr(raw: &str) -> Option<(IpAddr, Option<u8>)> {
    match raw.split_once('/') {
        Some((addr, prefix)) => {
            let addr: IpAddr = addr.trim().parse().ok()?;
            let prefix: u8 = prefix.trim().parse().ok()?;
            (prefix <= host_prefix(addr)).then_some((addr, Some(prefix)))
        }
        None => raw.parse().ok().map(|addr| (addr, None)),
    }
}

fn host_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Normalize a port list such as `"443, 80,8080-8090,80"`.
///
/// Entries are split, trimmed, degenerate ranges collapsed, reversed ranges
/// swapped, then sorted numerically and de-duplicated. Non-numeric entries
/// sort after the numeric ones.
pub fn ports(raw: &str) -> String {
    let mut numeric: BTreeSet<(u32, u32)> = BTreeSet::new();
    let mut other: BTreeSet<String> = BTreeSet::new();

    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match parse_port_range(token) {
            Some(range) => {
                numeric.insert(range);
            }
            None => {
                other.insert(token.to_lowercase());
            }
        }
    }

    numeric
        .into_iter()
        .map(|(lo, hi)| {
            if lo == hi {
                lo.to_string()
            } else {
                format!("{lo}-{hi}")
            }
        })
        .chain(other)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_port_range(token: &str) -> Option<(u32, u32)> {
    match token.split_once('-') {
        Some((lo, hi)) => {
            let lo: u32 = lo.trim().parse().ok()?;
            let hi: u32 = hi.trim().parse().ok()?;
            Some((lo.min(hi), lo.max(hi)))
        }
        None => token.parse().ok().map(|p| (p, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_trims_and_drops_blank() {
        assert_eq!(text(Some("  web tier ".into())), Some("web tier".into()));
        assert_eq!(text(Some("   ".into())), None);
        assert_eq!(text(None), None);
    }

    #[test]
    fn addresses_are_reformatted() {
        assert_eq!(address(" 10.0.0.0/8 "), "10.0.0.0/8");
        assert_eq!(address("10.0.0.1/32"), "10.0.0.1");
        assert_eq!(address("2001:DB8:0:0::1/128"), "2001:db8::1");
        assert_eq!(address("10.0.0.1 - 10.0.0.9"), "10.0.0.1-10.0.0.9");
        assert_eq!(address("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn address_literals_are_recognized() {
        assert!(is_address_literal("192.168.1.0/24"));
        assert!(is_address_literal("fe80::1"));
        assert!(is_address_literal("10.0.0.1-10.0.0.20"));
        assert!(!is_address_literal("10.0.0.0/33"));
        assert!(!is_address_literal("web-servers"));
    }

    #[test]
    fn ports_are_sorted_and_deduplicated() {
        assert_eq!(ports("443, 80,8080-8090,80"), "80,443,8080-8090");
        assert_eq!(ports("22-22"), "22");
        assert_eq!(ports("9000-8000"), "8000-9000");
        assert_eq!(ports(""), "");
    }
}
