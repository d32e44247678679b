//! # Address space enumeration
//!
//! Turns the local interface table (or an explicit target list) into the set
//! of candidate addresses for one scan.
//!
//! Enumeration never fails a scan: an interface that cannot be used is
//! logged and skipped, and a source that cannot be queried at all yields an
//! empty target set.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use netsweep_common::config::Config;
use netsweep_common::error::EnumerationError;
use netsweep_common::network::interface::NetworkInterfaceDescriptor;
use netsweep_common::network::range::Ipv4Range;
use netsweep_common::network::target::ScanTarget;
use tracing::{debug, info, warn};

/// Where interface snapshots come from.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> anyhow::Result<Vec<NetworkInterfaceDescriptor>>;
}

/// The operating system's interface table, via `pnet`.
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> anyhow::Result<Vec<NetworkInterfaceDescriptor>> {
        Ok(pnet::datalink::interfaces()
            .iter()
            .map(NetworkInterfaceDescriptor::from)
            .collect())
    }
}

/// A fixed interface list, for callers that already hold a snapshot.
pub struct StaticInterfaces(pub Vec<NetworkInterfaceDescriptor>);

impl InterfaceSource for StaticInterfaces {
    fn interfaces(&self) -> anyhow::Result<Vec<NetworkInterfaceDescriptor>> {
        Ok(self.0.clone())
    }
}

pub struct AddressSpaceEnumerator {
    source: Box<dyn InterfaceSource>,
    explicit: Vec<Ipv4Range>,
    exclude_network_broadcast: bool,
    ceiling: usize,
}

impl AddressSpaceEnumerator {
    pub fn new(source: Box<dyn InterfaceSource>, cfg: &Config) -> Self {
        Self {
            source,
            explicit: cfg.targets.clone(),
            exclude_network_broadcast: cfg.exclude_network_broadcast,
            ceiling: cfg.target_ceiling,
        }
    }

    /// Produces the deduplicated, address-ordered candidate set.
    ///
    /// When an address is reachable through several interfaces the first
    /// interface listed wins.
    pub fn enumerate(&self) -> Vec<ScanTarget> {
        let mut targets: BTreeMap<Ipv4Addr, ScanTarget> = BTreeMap::new();

        if self.explicit.is_empty() {
            for descriptor in self.snapshot() {
                match self.expand_interface(&descriptor) {
                    Ok(expanded) => {
                        for target in expanded {
                            targets.entry(target.addr).or_insert(target);
                        }
                    }
                    Err(e) => debug!("Skipping interface: {e}"),
                }
            }
        } else {
            for range in &self.explicit {
                for addr in range.to_iter() {
                    targets
                        .entry(addr)
                        .or_insert_with(|| ScanTarget::new(addr, None, *range));
                }
            }
        }

        if targets.len() > self.ceiling {
            warn!(
                targets = targets.len(),
                ceiling = self.ceiling,
                "Target count exceeds the configured ceiling, scan time is bounded by the worker pool only"
            );
        }
        info!(targets = targets.len(), "Enumerated scan targets");

        targets.into_values().collect()
    }

    /// The interfaces as seen by this enumerator, for display.
    pub fn snapshot(&self) -> Vec<NetworkInterfaceDescriptor> {
        match self.source.interfaces() {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("{}", EnumerationError::Source(e.to_string()));
                Vec::new()
            }
        }
    }

    fn expand_interface(
        &self,
        descriptor: &NetworkInterfaceDescriptor,
    ) -> Result<Vec<ScanTarget>, EnumerationError> {
        if !descriptor.is_scannable() {
            return Err(EnumerationError::NotScannable {
                name: descriptor.name.clone(),
            });
        }
        let networks = descriptor.ipv4_networks();
        if networks.is_empty() {
            return Err(EnumerationError::NoIpv4 {
                name: descriptor.name.clone(),
            });
        }

        let mut expanded = Vec::new();
        for network in networks {
            let mut range = Ipv4Range::from_network(network);
            if self.exclude_network_broadcast {
                range = range.without_network_broadcast();
            }
            debug!(interface = %descriptor.name, %network, hosts = range.len(), "Expanding prefix");
            expanded.extend(
                range
                    .to_iter()
                    .map(|addr| ScanTarget::new(addr, Some(descriptor.name.clone()), range)),
            );
        }
        Ok(expanded)
    }
}
