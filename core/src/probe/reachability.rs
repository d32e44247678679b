//! ICMP echo reachability.
//!
//! Raw ICMP sockets are used when the process may open them. Without that
//! privilege the probe falls back to the system `ping` executable, and
//! without either it reports no evidence.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netsweep_common::error::ProbeError;
use netsweep_common::models::{Evidence, ProbeKind, ProbeOutcome};
use netsweep_common::network::target::ScanTarget;
use pnet::packet::Packet;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::transport::{self, TransportChannelType, TransportProtocol};
use tokio::process::Command;
use tracing::trace;

use super::{Availability, ProbeStrategy};

const TRANSPORT_BUFFER_SIZE: usize = 1024;
const ECHO_PACKET_SIZE: usize = 16;
const CHANNEL_TYPE_ICMP: TransportChannelType =
    TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp));

pub struct ReachabilityProbe {
    raw: Availability,
    tool: Availability,
    ping_path: PathBuf,
}

impl ReachabilityProbe {
    pub fn new(ping_path: PathBuf) -> Self {
        Self {
            raw: Availability::new(ProbeKind::Reachability, "raw icmp"),
            tool: Availability::new(ProbeKind::Reachability, "ping"),
            ping_path,
        }
    }

    async fn raw_echo(&self, addr: Ipv4Addr, timeout: Duration) -> Option<ProbeOutcome> {
        let identifier: u16 = rand::random();
        let joined = tokio::task::spawn_blocking(move || echo(addr, identifier, timeout)).await;

        match joined {
            Ok(Ok(Some(rtt))) => Some(ProbeOutcome::with_evidence(
                ProbeKind::Reachability,
                vec![Evidence::EchoReply { rtt }],
            )),
            Ok(Ok(None)) => Some(ProbeOutcome::no_evidence(ProbeKind::Reachability)),
            Ok(Err(e)) if is_capability_error(&e) => {
                self.raw.mark_unavailable(e.to_string());
                None
            }
            Ok(Err(e)) => Some(ProbeOutcome::failed(
                ProbeKind::Reachability,
                ProbeError::Io {
                    kind: ProbeKind::Reachability,
                    addr,
                    reason: e.to_string(),
                },
            )),
            Err(_) => Some(ProbeOutcome::failed(
                ProbeKind::Reachability,
                ProbeError::Panicked {
                    kind: ProbeKind::Reachability,
                },
            )),
        }
    }

    async fn tool_echo(&self, addr: Ipv4Addr, timeout: Duration) -> ProbeOutcome {
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let mut cmd = Command::new(&self.ping_path);
        cmd.arg("-n")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let started = Instant::now();
        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => ProbeOutcome::with_evidence(
                ProbeKind::Reachability,
                vec![Evidence::EchoReply {
                    rtt: started.elapsed(),
                }],
            ),
            Ok(Ok(_)) | Err(_) => ProbeOutcome::no_evidence(ProbeKind::Reachability),
            Ok(Err(e)) => {
                self.tool.mark_unavailable(format!("{}: {e}", self.ping_path.display()));
                ProbeOutcome::failed(ProbeKind::Reachability, self.tool.error())
            }
        }
    }
}

#[async_trait]
impl ProbeStrategy for ReachabilityProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Reachability
    }

    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome {
        if self.raw.is_available() {
            if let Some(outcome) = self.raw_echo(target.addr, timeout).await {
                return outcome;
            }
        }
        if self.tool.is_available() {
            return self.tool_echo(target.addr, timeout).await;
        }
        ProbeOutcome::failed(ProbeKind::Reachability, self.tool.error())
    }
}

fn is_capability_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported
    )
}

/// Sends one echo request and waits for the matching reply.
///
/// Blocking. Returns `Ok(None)` when no reply arrived within `timeout`.
fn echo(addr: Ipv4Addr, identifier: u16, timeout: Duration) -> io::Result<Option<Duration>> {
    let (mut tx, mut rx) = transport::transport_channel(TRANSPORT_BUFFER_SIZE, CHANNEL_TYPE_ICMP)?;

    let mut buffer = [0u8; ECHO_PACKET_SIZE];
    let request = build_echo_request(&mut buffer, identifier)?;

    let started = Instant::now();
    tx.send_to(request, IpAddr::V4(addr))?;

    let mut replies = transport::icmp_packet_iter(&mut rx);
    loop {
        let Some(remaining) = timeout
            .checked_sub(started.elapsed())
            .filter(|remaining| !remaining.is_zero())
        else {
            return Ok(None);
        };
        let Some((packet, source)) = replies.next_with_timeout(remaining)? else {
            return Ok(None);
        };
        if source != IpAddr::V4(addr) || packet.get_icmp_type() != IcmpTypes::EchoReply {
            continue;
        }
        let matches = EchoReplyPacket::new(packet.packet())
            .map(|reply| reply.get_identifier() == identifier)
            .unwrap_or(false);
        if matches {
            trace!(%addr, "Echo reply");
            return Ok(Some(started.elapsed()));
        }
    }
}

fn build_echo_request(buffer: &mut [u8], identifier: u16) -> io::Result<MutableEchoRequestPacket<'_>> {
    let mut request = MutableEchoRequestPacket::new(buffer)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "echo buffer too small"))?;
    request.set_icmp_type(IcmpTypes::EchoRequest);
    request.set_identifier(identifier);
    request.set_sequence_number(1);
    let checksum = pnet::util::checksum(request.packet(), 1);
    request.set_checksum(checksum);
    Ok(request)
}
