use netsweep_common::config::Config;
use netsweep_common::network::interface::NetworkInterfaceDescriptor;
use netsweep_core::enumerator::{AddressSpaceEnumerator, StaticInterfaces};
use pnet::datalink::{MacAddr, NetworkInterface};
use std::net::Ipv4Addr;

use crate::support::{IFF_LOOPBACK, IFF_UP, ni, v4, v6};

/*************************************************************
              Enumeration over mock interface tables
**************************************************************/

fn enumerate(interfaces: Vec<NetworkInterface>, cfg: &Config) -> Vec<Ipv4Addr> {
    let descriptors = interfaces.iter().map(NetworkInterfaceDescriptor::from).collect();
    AddressSpaceEnumerator::new(Box::new(StaticInterfaces(descriptors)), cfg)
        .enumerate()
        .into_iter()
        .map(|target| target.addr)
        .collect()
}

#[test]
fn only_up_non_loopback_ipv4_networks_are_expanded() {
    let targets = enumerate(iface_all(), &Config::default());
    // enp9s0 /30 and wlan0 /29; tun0 is down, lo is loopback, the rest is IPv6.
    assert_eq!(targets.len(), 4 + 8);
    assert!(targets.contains(&Ipv4Addr::new(192, 168, 178, 2)));
    assert!(targets.contains(&Ipv4Addr::new(10, 0, 0, 7)));
    assert!(!targets.iter().any(|addr| addr.is_loopback()));
}

#[test]
fn overlapping_interfaces_yield_each_address_once() {
    let targets = enumerate(vec![enp9s0(), enp9s0_alias()], &Config::default());
    assert_eq!(targets.len(), 4);
}

#[test]
fn network_and_broadcast_are_dropped_on_request() {
    let cfg = Config {
        exclude_network_broadcast: true,
        ..Config::default()
    };
    let targets = enumerate(vec![wlan0()], &cfg);
    assert_eq!(targets.first(), Some(&Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(targets.last(), Some(&Ipv4Addr::new(10, 0, 0, 6)));
}

#[test]
fn no_usable_interface_means_no_targets() {
    let targets = enumerate(vec![lo(), tun0(), ipv6leakintrf0()], &Config::default());
    assert!(targets.is_empty());
}

/*************************************************************
                  Mock interfaces for testing
**************************************************************/

fn iface_all() -> Vec<NetworkInterface> {
    vec![lo(), enp9s0(), wlan0(), tun0(), ipv6leakintrf0()]
}

fn lo() -> NetworkInterface {
    ni("lo", 1, None, &[v4(127, 0, 0, 1, 8), v6("::1", 128)], IFF_UP | IFF_LOOPBACK)
}

fn enp9s0() -> NetworkInterface {
    ni(
        "enp9s0",
        2,
        Some(MacAddr(0x3c, 0x7c, 0x3f, 0x1a, 0x2b, 0x3c)),
        &[v4(192, 168, 178, 1, 30), v6("fe80::3e7c:3fff:fe1a:2b3c", 64)],
        IFF_UP,
    )
}

fn enp9s0_alias() -> NetworkInterface {
    ni("enp9s0:1", 3, None, &[v4(192, 168, 178, 2, 30)], IFF_UP)
}

fn wlan0() -> NetworkInterface {
    ni(
        "wlan0",
        4,
        Some(MacAddr(0xa4, 0x5e, 0x60, 0x01, 0x02, 0x03)),
        &[v4(10, 0, 0, 4, 29)],
        IFF_UP,
    )
}

fn tun0() -> NetworkInterface {
    ni("tun0", 5, None, &[v4(10, 8, 0, 2, 24)], 0)
}

fn ipv6leakintrf0() -> NetworkInterface {
    ni("ipv6leakintrf0", 6, None, &[v6("fdeb:446c:912d:8da::", 64)], IFF_UP)
}
