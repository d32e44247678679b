use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Stable identity of a discovery.
///
/// Presence evidence is keyed by address alone, service evidence by
/// address and port, so one host can own several records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveryKey {
    pub addr: Ipv4Addr,
    pub port: Option<u16>,
}

impl DiscoveryKey {
    pub fn host(addr: Ipv4Addr) -> Self {
        Self { addr, port: None }
    }

    pub fn service(addr: Ipv4Addr, port: u16) -> Self {
        Self {
            addr,
            port: Some(port),
        }
    }
}

impl fmt::Display for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.addr, port),
            None => write!(f, "{}", self.addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub key: DiscoveryKey,
    pub label: String,
    pub properties: BTreeMap<String, String>,
    pub ttl: Duration,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

impl DiscoveryRecord {
    pub fn new(
        key: DiscoveryKey,
        properties: BTreeMap<String, String>,
        ttl: Duration,
        seen: Instant,
    ) -> Self {
        let label = match key.port {
            Some(port) => format!("Network Service {}:{}", key.addr, port),
            None => format!("Network Device {}", key.addr),
        };
        Self {
            key,
            label,
            properties,
            ttl,
            first_seen: seen,
            last_seen: seen,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.last_seen + self.ttl
    }

    /// A record is stale once `now` reaches `last_seen + ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// Applies a repeat sighting. `last_seen` never moves backwards.
    pub fn refresh(&mut self, seen: Instant, ttl: Duration, properties: BTreeMap<String, String>) {
        self.last_seen = self.last_seen.max(seen);
        self.ttl = ttl;
        self.properties.extend(properties);
    }
}

/// Message sent to the registry collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Discovered(DiscoveryRecord),
    Removed(DiscoveryKey),
}
