use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::{IpNetwork, Ipv4Network};

/// Snapshot of one interface, taken once per scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceDescriptor {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    pub networks: Vec<IpNetwork>,
}

impl NetworkInterfaceDescriptor {
    pub fn new(name: impl Into<String>, is_up: bool, is_loopback: bool, networks: Vec<IpNetwork>) -> Self {
        Self {
            name: name.into(),
            is_up,
            is_loopback,
            networks,
        }
    }

    /// Up and not loopback.
    pub fn is_scannable(&self) -> bool {
        self.is_up && !self.is_loopback
    }

    pub fn ipv4_networks(&self) -> Vec<Ipv4Network> {
        self.networks
            .iter()
            .filter_map(|net| match net {
                IpNetwork::V4(v4) if !v4.ip().is_loopback() => Some(*v4),
                _ => None,
            })
            .collect()
    }
}

impl From<&NetworkInterface> for NetworkInterfaceDescriptor {
    fn from(intf: &NetworkInterface) -> Self {
        Self {
            name: intf.name.clone(),
            is_up: intf.is_up(),
            is_loopback: intf.is_loopback(),
            networks: intf.ips.clone(),
        }
    }
}
