//! ARP based presence on the local broadcast segment.
//!
//! Resolution itself is delegated to an [`ArpBackend`] so the external
//! `arping` tool can be swapped for the kernel neighbour table without the
//! host task or coordinator noticing.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netsweep_common::error::ProbeError;
use netsweep_common::models::{Evidence, ProbeKind, ProbeOutcome};
use netsweep_common::network::target::ScanTarget;
use pnet::util::MacAddr;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tracing::debug;

use super::{Availability, ProbeStrategy};

const ARP_TABLE_PATH: &str = "/proc/net/arp";
const ARP_FLAG_COMPLETE: u32 = 0x2;
const DISCARD_PORT: u16 = 9;
const TABLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A completed address resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpReply {
    pub mac: Option<MacAddr>,
    pub rtt: Duration,
}

#[async_trait]
pub trait ArpBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means no reply within `timeout`. `NotFound` and
    /// `PermissionDenied` errors disable the backend.
    async fn resolve(&self, target: &ScanTarget, timeout: Duration) -> io::Result<Option<ArpReply>>;
}

pub struct LinkLayerProbe {
    backend: Box<dyn ArpBackend>,
    availability: Availability,
}

impl LinkLayerProbe {
    pub fn new(backend: Box<dyn ArpBackend>) -> Self {
        let availability = Availability::new(ProbeKind::LinkLayer, backend.name());
        Self {
            backend,
            availability,
        }
    }
}

#[async_trait]
impl ProbeStrategy for LinkLayerProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::LinkLayer
    }

    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome {
        if !self.availability.is_available() {
            return ProbeOutcome::failed(ProbeKind::LinkLayer, self.availability.error());
        }

        match self.backend.resolve(target, timeout).await {
            Ok(Some(reply)) => ProbeOutcome::with_evidence(
                ProbeKind::LinkLayer,
                vec![Evidence::LinkLayer {
                    mac: reply.mac,
                    rtt: reply.rtt,
                }],
            ),
            Ok(None) => ProbeOutcome::no_evidence(ProbeKind::LinkLayer),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                self.availability.mark_unavailable(e.to_string());
                ProbeOutcome::failed(ProbeKind::LinkLayer, self.availability.error())
            }
            Err(e) => ProbeOutcome::failed(
                ProbeKind::LinkLayer,
                ProbeError::Io {
                    kind: ProbeKind::LinkLayer,
                    addr: target.addr,
                    reason: e.to_string(),
                },
            ),
        }
    }
}

/// iputils style `arping -c 1 -w <secs> [-I <iface>] <addr>`.
pub struct ArpingTool {
    path: PathBuf,
}

impl ArpingTool {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ArpBackend for ArpingTool {
    fn name(&self) -> &'static str {
        "arping"
    }

    async fn resolve(&self, target: &ScanTarget, timeout: Duration) -> io::Result<Option<ArpReply>> {
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let mut cmd = Command::new(&self.path);
        cmd.arg("-c").arg("1").arg("-w").arg(wait_secs.to_string());
        if let Some(interface) = &target.interface {
            cmd.arg("-I").arg(interface);
        }
        cmd.arg(target.addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", self.path.display())))?,
            Err(_) => return Ok(None),
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Ok(Some(ArpReply {
                mac: parse_reply_mac(&stdout),
                rtt: started.elapsed(),
            }));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not permitted") || stderr.contains("Permission denied") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, stderr.trim().to_string()));
        }
        debug!(addr = %target.addr, code = ?output.status.code(), "No ARP reply");
        Ok(None)
    }
}

/// Extracts the MAC from a line like
/// `Unicast reply from 192.168.1.2 [AA:BB:CC:DD:EE:FF]  0.712ms`.
fn parse_reply_mac(stdout: &str) -> Option<MacAddr> {
    stdout
        .lines()
        .filter(|line| line.contains("reply from"))
        .find_map(|line| {
            let open = line.find('[')?;
            let close = line[open..].find(']')? + open;
            MacAddr::from_str(line[open + 1..close].trim()).ok()
        })
}

/// Kernel neighbour table lookup.
///
/// A datagram to the discard port makes the kernel resolve the address,
/// then the table is polled until a complete entry shows up.
pub struct ArpTable {
    path: PathBuf,
}

impl Default for ArpTable {
    fn default() -> Self {
        Self {
            path: PathBuf::from(ARP_TABLE_PATH),
        }
    }
}

impl ArpTable {
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    async fn nudge(addr: Ipv4Addr) {
        if let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            let _ = socket.send_to(&[0u8], (addr, DISCARD_PORT)).await;
        }
    }
}

#[async_trait]
impl ArpBackend for ArpTable {
    fn name(&self) -> &'static str {
        "arp table"
    }

    async fn resolve(&self, target: &ScanTarget, timeout: Duration) -> io::Result<Option<ArpReply>> {
        let started = Instant::now();
        let contents = tokio::fs::read_to_string(&self.path).await?;
        if let Some(mac) = parse_arp_table(&contents, target.addr) {
            return Ok(Some(ArpReply {
                mac: Some(mac),
                rtt: started.elapsed(),
            }));
        }

        Self::nudge(target.addr).await;
        while started.elapsed() + TABLE_POLL_INTERVAL < timeout {
            tokio::time::sleep(TABLE_POLL_INTERVAL).await;
            let contents = tokio::fs::read_to_string(&self.path).await?;
            if let Some(mac) = parse_arp_table(&contents, target.addr) {
                return Ok(Some(ArpReply {
                    mac: Some(mac),
                    rtt: started.elapsed(),
                }));
            }
        }
        Ok(None)
    }
}

/// Finds a complete entry for `addr` in `/proc/net/arp` formatted text.
fn parse_arp_table(contents: &str, addr: Ipv4Addr) -> Option<MacAddr> {
    contents.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let ip = fields.next()?.parse::<Ipv4Addr>().ok()?;
        let _hw_type = fields.next()?;
        let flags = u32::from_str_radix(fields.next()?.trim_start_matches("0x"), 16).ok()?;
        let mac = MacAddr::from_str(fields.next()?).ok()?;
        (ip == addr && flags & ARP_FLAG_COMPLETE != 0 && mac != MacAddr::zero()).then_some(mac)
    })
}
