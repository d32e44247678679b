use colored::*;
use netsweep_common::models::DiscoveryRecord;
use netsweep_common::network::interface::NetworkInterfaceDescriptor;
use netsweep_common::network::range::Ipv4Range;
use pnet::ipnetwork::IpNetwork;

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

/// Tree rows for one record, in a fixed display order.
pub fn record_to_details(record: &DiscoveryRecord) -> Vec<Detail> {
    let mut details: Vec<Detail> = Vec::new();
    let props = &record.properties;

    if let Some(addr) = props.get("address") {
        details.push(("IPv4".to_string(), addr.color(colors::IPV4_ADDR)));
    }
    if let Some(port) = props.get("port") {
        details.push(("Port".to_string(), port.color(colors::PORT)));
    }
    if let Some(mac) = props.get("mac") {
        details.push(("MAC".to_string(), mac.color(colors::MAC_ADDR)));
    }
    if let Some(vendor) = props.get("vendor") {
        details.push(("Vendor".to_string(), vendor.normal()));
    }
    if let Some(detected_by) = props.get("detectedBy") {
        details.push(("Via".to_string(), detected_by.normal()));
    }
    if let Some(latency) = props.get("latencyMs") {
        details.push(("Latency".to_string(), format!("{latency} ms").normal()));
    }
    if let Some(interface) = props.get("interface") {
        details.push(("Iface".to_string(), interface.normal()));
    }
    details.push(("TTL".to_string(), format!("{}s", record.ttl.as_secs()).dimmed()));
    details
}

pub fn interface_to_details(interface: &NetworkInterfaceDescriptor) -> Vec<Detail> {
    let mut details: Vec<Detail> = interface
        .networks
        .iter()
        .map(|network| match network {
            IpNetwork::V4(v4) => {
                let address: ColoredString = v4.ip().to_string().color(colors::IPV4_ADDR);
                let prefix: ColoredString = v4.prefix().to_string().color(colors::IPV4_PREFIX);
                let hosts = Ipv4Range::from_network(*v4).len();
                let value = format!("{address}/{prefix} ({hosts} targets)").color(colors::SEPARATOR);
                ("IPv4".to_string(), value)
            }
            IpNetwork::V6(v6) => ("IPv6".to_string(), format!("{v6} (skipped)").dimmed()),
        })
        .collect();

    let state = match (interface.is_up, interface.is_loopback) {
        (_, true) => "loopback".dimmed(),
        (true, false) => "up".green(),
        (false, false) => "down".red(),
    };
    details.push(("State".to_string(), state));
    details
}
