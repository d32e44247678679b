use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netsweep_common::config::{Config, PerKind};
use netsweep_common::models::{Evidence, ProbeKind, ProbeOutcome, RegistryEvent};
use netsweep_common::network::interface::NetworkInterfaceDescriptor;
use netsweep_common::network::target::ScanTarget;
use netsweep_core::discovery::DiscoveryService;
use netsweep_core::enumerator::StaticInterfaces;
use netsweep_core::probe::ProbeStrategy;
use netsweep_core::sink::ResultSink;
use pnet::datalink::{MacAddr, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use tokio::sync::mpsc::UnboundedReceiver;

pub const IFF_UP: u32 = 1;
pub const IFF_LOOPBACK: u32 = 1 << 3;

pub fn ni(name: &str, index: u32, mac: Option<MacAddr>, ips: &[IpNetwork], flags: u32) -> NetworkInterface {
    NetworkInterface {
        name: name.into(),
        description: "".into(),
        index,
        mac,
        ips: ips.to_vec(),
        flags,
    }
}

pub fn v4(a: u8, b: u8, c: u8, d: u8, p: u8) -> IpNetwork {
    IpNetwork::V4(Ipv4Network::new(Ipv4Addr::new(a, b, c, d), p).unwrap())
}

pub fn v6(s: &str, p: u8) -> IpNetwork {
    IpNetwork::V6(Ipv6Network::new(s.parse().unwrap(), p).unwrap())
}

/// One up, non-loopback interface carrying `networks`.
pub fn lan(networks: &[IpNetwork]) -> StaticInterfaces {
    StaticInterfaces(vec![NetworkInterfaceDescriptor::new("eth0", true, false, networks.to_vec())])
}

pub type Responder = fn(Ipv4Addr) -> Vec<Evidence>;

/// A strategy whose answer is a pure function of the address, delivered
/// after a fixed delay.
pub struct Scripted {
    kind: ProbeKind,
    delay: Duration,
    responder: Responder,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(kind: ProbeKind, delay: Duration, responder: Responder) -> Self {
        Self {
            kind,
            delay,
            responder,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn shared(self) -> Arc<dyn ProbeStrategy> {
        Arc::new(self)
    }
}

#[async_trait]
impl ProbeStrategy for Scripted {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    async fn probe(&self, target: &ScanTarget, _timeout: Duration) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        ProbeOutcome::with_evidence(self.kind, (self.responder)(target.addr))
    }
}

pub fn silent(_: Ipv4Addr) -> Vec<Evidence> {
    Vec::new()
}

pub fn echo(_: Ipv4Addr) -> Vec<Evidence> {
    vec![Evidence::EchoReply {
        rtt: Duration::from_millis(3),
    }]
}

pub fn port_80_on_dot_two(addr: Ipv4Addr) -> Vec<Evidence> {
    if addr.octets()[3] == 2 {
        vec![Evidence::OpenPort {
            port: 80,
            rtt: Duration::from_millis(1),
        }]
    } else {
        Vec::new()
    }
}

pub fn ports_80_and_554(_: Ipv4Addr) -> Vec<Evidence> {
    [80, 554]
        .into_iter()
        .map(|port| Evidence::OpenPort {
            port,
            rtt: Duration::from_millis(1),
        })
        .collect()
}

pub fn config(pool: usize) -> Config {
    Config {
        pool_size: Some(pool),
        timeouts: PerKind::uniform(Duration::from_secs(5)),
        ..Config::default()
    }
}

pub fn service(
    cfg: Config,
    interfaces: StaticInterfaces,
    strategies: Vec<Arc<dyn ProbeStrategy>>,
) -> (DiscoveryService, UnboundedReceiver<RegistryEvent>) {
    let (sink, registry) = ResultSink::channel(cfg.ttls);
    (DiscoveryService::new(cfg, Box::new(interfaces), strategies, sink), registry)
}

pub fn drain(registry: &mut UnboundedReceiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = registry.try_recv() {
        events.push(event);
    }
    events
}
