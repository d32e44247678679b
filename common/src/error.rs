//! Error taxonomy shared by the discovery engine.
//!
//! None of these ever cross the discovery façade. Probe errors are attached to
//! a [`ProbeOutcome`](crate::models::ProbeOutcome) as diagnostics, enumeration
//! errors are logged and the offending interface is skipped.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::models::{ProbeKind, ScanState};

/// Why a probe produced no evidence for reasons other than plain silence.
///
/// Timeouts and refused connections are **not** errors: they are ordinary
/// non-reachability and map to `reachable = false` without an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The strategy cannot run on this system (missing tool, no raw socket
    /// permission). Sticky for the remainder of the process.
    #[error("{kind} probing unavailable: {reason}")]
    Unavailable { kind: ProbeKind, reason: String },
    /// An unexpected I/O failure while probing a single address.
    #[error("{kind} probe of {addr} failed: {reason}")]
    Io {
        kind: ProbeKind,
        addr: Ipv4Addr,
        reason: String,
    },
    /// The strategy panicked; the host task absorbed it.
    #[error("{kind} probe panicked")]
    Panicked { kind: ProbeKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnumerationError {
    #[error("failed to query network interfaces: {0}")]
    Source(String),
    #[error("interface {name} has no IPv4 network")]
    NoIpv4 { name: String },
    #[error("interface {name} is down or loopback")]
    NotScannable { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid scan session transition {from:?} -> {to:?}")]
    InvalidTransition { from: ScanState, to: ScanState },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetParseError {
    #[error("invalid target: {0}")]
    Invalid(String),
    #[error("invalid start IP in range '{0}'")]
    RangeStart(String),
    #[error("invalid end range '{0}'")]
    RangeEnd(String),
    #[error("range end {end} precedes start {start}")]
    RangeOrder { start: Ipv4Addr, end: Ipv4Addr },
    #[error("invalid CIDR '{0}'")]
    Cidr(String),
}
