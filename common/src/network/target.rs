//! # Scan targets
//!
//! A [`ScanTarget`] is one candidate address handed to exactly one host probe.
//!
//! This module also parses explicit target lists, which replace live interface
//! enumeration when given:
//! * A single IPv4 address (`192.168.1.5`).
//! * An IPv4 range (`192.168.1.1-100`, `192.168.1.1-192.168.2.10`).
//! * A CIDR block (`192.168.1.0/24`).
//! * Any comma separated mix of the above.

use std::net::Ipv4Addr;

use crate::error::TargetParseError;
use crate::network::range::{self, Ipv4Range};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTarget {
    pub addr: Ipv4Addr,
    /// Interface the address was derived from, if any.
    pub interface: Option<String>,
    /// Subnet or explicit range the address belongs to.
    pub subnet: Ipv4Range,
}

impl ScanTarget {
    pub fn new(addr: Ipv4Addr, interface: Option<String>, subnet: Ipv4Range) -> Self {
        Self {
            addr,
            interface,
            subnet,
        }
    }

    /// A target outside of any known subnet.
    pub fn standalone(addr: Ipv4Addr) -> Self {
        Self::new(addr, None, Ipv4Range::single(addr))
    }
}

/// Parses a comma separated target list into ranges.
pub fn parse_targets(s: &str) -> Result<Vec<Ipv4Range>, TargetParseError> {
    let mut ranges = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        ranges.push(parse_target(part)?);
    }
    if ranges.is_empty() {
        return Err(TargetParseError::Invalid(s.to_string()));
    }
    Ok(ranges)
}

fn parse_target(s: &str) -> Result<Ipv4Range, TargetParseError> {
    if let Ok(addr) = s.parse::<Ipv4Addr>() {
        return Ok(Ipv4Range::single(addr));
    }
    if let Some((ip_str, prefix_str)) = s.split_once('/') {
        return parse_cidr(ip_str, prefix_str, s);
    }
    if let Some((start_str, end_str)) = s.split_once('-') {
        return parse_range(start_str, end_str);
    }
    Err(TargetParseError::Invalid(s.to_string()))
}

fn parse_cidr(ip_str: &str, prefix_str: &str, original: &str) -> Result<Ipv4Range, TargetParseError> {
    let addr = ip_str
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetParseError::Cidr(original.to_string()))?;
    let prefix = prefix_str
        .trim()
        .parse::<u8>()
        .map_err(|_| TargetParseError::Cidr(original.to_string()))?;
    range::cidr_range(addr, prefix).map_err(|_| TargetParseError::Cidr(original.to_string()))
}

fn parse_range(start_str: &str, end_str: &str) -> Result<Ipv4Range, TargetParseError> {
    let start_addr = start_str
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetParseError::RangeStart(start_str.to_string()))?;
    let end_addr = parse_range_end(end_str.trim(), start_addr)?;
    if end_addr < start_addr {
        return Err(TargetParseError::RangeOrder {
            start: start_addr,
            end: end_addr,
        });
    }
    Ok(Ipv4Range::new(start_addr, end_addr))
}

/// Accepts a full address or trailing octets that replace the tail of
/// `start` (`192.168.1.1-50` ends at `192.168.1.50`).
fn parse_range_end(end_str: &str, start: Ipv4Addr) -> Result<Ipv4Addr, TargetParseError> {
    if let Ok(full) = end_str.parse::<Ipv4Addr>() {
        return Ok(full);
    }

    let tail: Vec<u8> = end_str
        .split('.')
        .map(str::parse::<u8>)
        .collect::<Result<_, _>>()
        .map_err(|_| TargetParseError::RangeEnd(end_str.to_string()))?;
    if tail.is_empty() || tail.len() > 4 {
        return Err(TargetParseError::RangeEnd(end_str.to_string()));
    }

    let mut octets = start.octets();
    octets[4 - tail.len()..].copy_from_slice(&tail);
    Ok(Ipv4Addr::from(octets))
}
