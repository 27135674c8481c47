//! Caller address normalization and allow-list matching.
//!
//! Allow-list entries are authored once, in IPv4 form, even when the listener
//! is dual-stack: callers reaching an IPv6 socket over IPv4 show up as
//! `::ffff:a.b.c.d` and are mapped back before any comparison.
//!
//! Supported pattern forms:
//! - exact address: `10.0.0.5`, `2001:db8::1`
//! - CIDR network: `10.0.0.0/24`, `2001:db8::/32`, `::ffff:10.0.0.0/120`
//! - IPv4 wildcard octets: `10.0.*.*`
//! - inclusive range: `10.0.0.10-10.0.0.20`

use ipnetwork::{IpNetwork, Ipv4Network};
use std::{net::IpAddr, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address pattern: {0}")]
pub struct PatternError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPattern {
    Exact(IpAddr),
    Network(IpNetwork),
    Wildcard([Option<u8>; 4]),
    Range(IpAddr, IpAddr),
}

/// Map an IPv4-mapped IPv6 address to plain IPv4; other addresses pass through.
#[must_use]
pub fn normalize(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(address, IpAddr::V4),
        IpAddr::V4(_) => address,
    }
}

/// Returns true when `address` matches at least one pattern.
///
/// Blank or unparsable patterns never match. An empty pattern list matches
/// nothing; callers treat "no restriction" before reaching this function.
#[must_use]
pub fn matches<S: AsRef<str>>(address: IpAddr, patterns: &[S]) -> bool {
    let address = normalize(address);
    patterns
        .iter()
        .filter_map(|pattern| pattern.as_ref().parse::<AddressPattern>().ok())
        .any(|pattern| pattern.contains(address))
}

impl AddressPattern {
    /// Returns true when the (already normalized) address falls inside this pattern.
    #[must_use]
    pub fn contains(&self, address: IpAddr) -> bool {
        match self {
            Self::Exact(exact) => *exact == address,
            Self::Network(network) => network.contains(address),
            Self::Wildcard(octets) => match address {
                IpAddr::V4(v4) => octets
                    .iter()
                    .zip(v4.octets())
                    .all(|(expected, actual)| expected.map_or(true, |octet| octet == actual)),
                IpAddr::V6(_) => false,
            },
            Self::Range(start, end) => {
                same_family(*start, address) && *start <= address && address <= *end
            }
        }
    }
}

impl FromStr for AddressPattern {
    type Err = PatternError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = value.trim();
        if pattern.is_empty() {
            return Err(PatternError(value.to_string()));
        }

        if let Ok(address) = pattern.parse::<IpAddr>() {
            return Ok(Self::Exact(normalize(address)));
        }

        if pattern.contains('/') {
            return pattern
                .parse::<IpNetwork>()
                .ok()
                .and_then(normalize_network)
                .map(Self::Network)
                .ok_or_else(|| PatternError(value.to_string()));
        }

        if pattern.contains('*') {
            return parse_wildcard(pattern)
                .map(Self::Wildcard)
                .ok_or_else(|| PatternError(value.to_string()));
        }

        if let Some((start, end)) = pattern.split_once('-') {
            let start = start.trim().parse::<IpAddr>().map(normalize);
            let end = end.trim().parse::<IpAddr>().map(normalize);
            if let (Ok(start), Ok(end)) = (start, end) {
                if same_family(start, end) && start <= end {
                    return Ok(Self::Range(start, end));
                }
            }
        }

        Err(PatternError(value.to_string()))
    }
}

/// Rewrite a network inside `::ffff:0:0/96` as the IPv4 network it covers.
fn normalize_network(network: IpNetwork) -> Option<IpNetwork> {
    match network {
        IpNetwork::V6(v6) if v6.prefix() >= 96 => match v6.ip().to_ipv4_mapped() {
            Some(v4) => Ipv4Network::new(v4, v6.prefix() - 96)
                .ok()
                .map(IpNetwork::V4),
            None => Some(network),
        },
        _ => Some(network),
    }
}

fn parse_wildcard(pattern: &str) -> Option<[Option<u8>; 4]> {
    let mut octets = [None; 4];
    let mut parts = pattern.split('.');
    for slot in &mut octets {
        let part = parts.next()?;
        *slot = match part {
            "*" => None,
            digits => Some(digits.parse::<u8>().ok()?),
        };
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

const fn same_family(a: IpAddr, b: IpAddr) -> bool {
    matches!(
        (a, b),
        (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
    )
}
