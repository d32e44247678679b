use std::net::Ipv4Addr;

use pnet::ipnetwork::Ipv4Network;

/// An inclusive range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn single(addr: Ipv4Addr) -> Self {
        Self::new(addr, addr)
    }

    /// Every address of the prefix, network and broadcast included.
    pub fn from_network(network: Ipv4Network) -> Self {
        Self::new(network.network(), network.broadcast())
    }

    pub fn len(&self) -> u64 {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        if end < start {
            0
        } else {
            u64::from(end - start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strips the first and last address, unless the range is too small to
    /// have a distinct network and broadcast address.
    pub fn without_network_broadcast(&self) -> Self {
        if self.len() <= 2 {
            return *self;
        }
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        Self::new(Ipv4Addr::from(start + 1), Ipv4Addr::from(end - 1))
    }

    pub fn to_iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(Ipv4Addr::from)
    }
}

impl std::fmt::Display for Ipv4Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start_addr == self.end_addr {
            write!(f, "{}", self.start_addr)
        } else {
            write!(f, "{}-{}", self.start_addr, self.end_addr)
        }
    }
}

pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = Ipv4Network::new(ip, prefix)?;
    Ok(Ipv4Range::from_network(network))
}
