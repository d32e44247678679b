use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pnet::util::MacAddr;

use crate::error::ProbeError;

/// The detection strategies a host can be probed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeKind {
    /// ICMP echo request/reply.
    Reachability,
    /// ARP resolution on the local segment.
    LinkLayer,
    /// TCP connect to a list of candidate ports.
    Port,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 3] = [ProbeKind::Reachability, ProbeKind::LinkLayer, ProbeKind::Port];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Reachability => "icmp",
            ProbeKind::LinkLayer => "arp",
            ProbeKind::Port => "tcp",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" | "ping" | "reachability" => Ok(ProbeKind::Reachability),
            "arp" | "arping" | "link-layer" => Ok(ProbeKind::LinkLayer),
            "tcp" | "port" => Ok(ProbeKind::Port),
            _ => Err(format!("unknown probe kind: {s}")),
        }
    }
}

/// A single piece of evidence that a strategy gathered about a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    EchoReply { rtt: Duration },
    LinkLayer { mac: Option<MacAddr>, rtt: Duration },
    OpenPort { port: u16, rtt: Duration },
}

impl Evidence {
    /// Port number for service-bound evidence.
    pub fn port(&self) -> Option<u16> {
        match self {
            Evidence::OpenPort { port, .. } => Some(*port),
            _ => None,
        }
    }

    pub fn rtt(&self) -> Duration {
        match self {
            Evidence::EchoReply { rtt }
            | Evidence::LinkLayer { rtt, .. }
            | Evidence::OpenPort { rtt, .. } => *rtt,
        }
    }
}

/// Result of one strategy against one address.
///
/// `reachable` is true exactly when `evidence` is non-empty; the constructors
/// keep the two in step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub kind: ProbeKind,
    pub reachable: bool,
    pub evidence: Vec<Evidence>,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    /// Silence: timeout, refusal or an unreachable host.
    pub fn no_evidence(kind: ProbeKind) -> Self {
        Self {
            kind,
            reachable: false,
            evidence: Vec::new(),
            error: None,
        }
    }

    pub fn with_evidence(kind: ProbeKind, evidence: Vec<Evidence>) -> Self {
        Self {
            kind,
            reachable: !evidence.is_empty(),
            evidence,
            error: None,
        }
    }

    pub fn failed(kind: ProbeKind, error: ProbeError) -> Self {
        Self {
            kind,
            reachable: false,
            evidence: Vec::new(),
            error: Some(error),
        }
    }
}
