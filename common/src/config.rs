use std::path::PathBuf;
use std::time::Duration;

use crate::models::ProbeKind;
use crate::network::range::Ipv4Range;

/// Candidate TCP ports probed when none are configured.
pub const DEFAULT_PORTS: &[u16] = &[80, 548, 554, 1025];

/// A value configured separately for each probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerKind<T> {
    pub reachability: T,
    pub link_layer: T,
    pub port: T,
}

impl<T: Copy> PerKind<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            reachability: value,
            link_layer: value,
            port: value,
        }
    }

    pub fn get(&self, kind: ProbeKind) -> T {
        match kind {
            ProbeKind::Reachability => self.reachability,
            ProbeKind::LinkLayer => self.link_layer,
            ProbeKind::Port => self.port,
        }
    }
}

/// How link-layer presence is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkLayerBackend {
    /// Shell out to an `arping` executable.
    #[default]
    ArpingTool,
    /// Read the kernel neighbour table after nudging the address.
    ArpTable,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Strategies run against every target.
    pub strategies: Vec<ProbeKind>,
    /// Per-probe timeout of each strategy.
    pub timeouts: PerKind<Duration>,
    /// Lifetime of a record without a refresh, by the kind of evidence.
    pub ttls: PerKind<Duration>,
    /// Whole-scan deadline.
    pub scan_deadline: Duration,
    /// Worker pool size as a multiple of the available parallelism.
    pub pool_multiplier: usize,
    /// Fixed worker pool size, overriding the multiplier.
    pub pool_size: Option<usize>,
    pub ports: Vec<u16>,
    pub background_interval: Duration,
    pub expiry_sweep_interval: Duration,
    pub ping_path: PathBuf,
    pub arping_path: PathBuf,
    pub link_layer_backend: LinkLayerBackend,
    /// Target count above which a warning is logged.
    pub target_ceiling: usize,
    /// Explicit targets. Empty means "enumerate local interfaces".
    pub targets: Vec<Ipv4Range>,
    pub exclude_network_broadcast: bool,
    /// Remove records not refreshed by the latest completed scan.
    pub prune_after_scan: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategies: ProbeKind::ALL.to_vec(),
            timeouts: PerKind::uniform(Duration::from_millis(1_000)),
            ttls: PerKind {
                reachability: Duration::from_secs(120),
                link_layer: Duration::from_secs(120),
                port: Duration::from_secs(600),
            },
            scan_deadline: Duration::from_secs(60),
            pool_multiplier: 2,
            pool_size: None,
            ports: DEFAULT_PORTS.to_vec(),
            background_interval: Duration::from_secs(300),
            expiry_sweep_interval: Duration::from_secs(30),
            ping_path: PathBuf::from("ping"),
            arping_path: PathBuf::from("arping"),
            link_layer_backend: LinkLayerBackend::default(),
            target_ceiling: 65_536,
            targets: Vec::new(),
            exclude_network_broadcast: false,
            prune_after_scan: false,
        }
    }
}

impl Config {
    /// Number of hosts probed concurrently. Never zero.
    pub fn worker_pool_size(&self) -> usize {
        if let Some(size) = self.pool_size {
            return size.max(1);
        }
        let parallelism = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        parallelism.saturating_mul(self.pool_multiplier).max(1)
    }

    /// Upper bound on a single host task: the sum of the enabled
    /// strategies' timeouts.
    pub fn per_host_timeout(&self) -> Duration {
        self.strategies
            .iter()
            .map(|kind| self.timeouts.get(*kind))
            .sum()
    }
}
