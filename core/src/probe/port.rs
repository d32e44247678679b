//! TCP connect probing of candidate service ports.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netsweep_common::models::{Evidence, ProbeKind, ProbeOutcome};
use netsweep_common::network::target::ScanTarget;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::trace;

use super::ProbeStrategy;

/// Connects to every configured port concurrently. Each open port is its
/// own piece of evidence; only an accepted connection counts, a refusal is
/// silence.
pub struct PortProbe {
    ports: Vec<u16>,
}

impl PortProbe {
    pub fn new(mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        Self { ports }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

#[async_trait]
impl ProbeStrategy for PortProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Port
    }

    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome {
        let mut connects = JoinSet::new();
        for &port in &self.ports {
            connects.spawn(connect(target.addr, port, timeout));
        }

        let mut evidence = Vec::new();
        while let Some(joined) = connects.join_next().await {
            if let Ok(Some(found)) = joined {
                evidence.push(found);
            }
        }
        evidence.sort_by_key(|e| e.port());

        ProbeOutcome::with_evidence(ProbeKind::Port, evidence)
    }
}

async fn connect(addr: Ipv4Addr, port: u16, timeout: Duration) -> Option<Evidence> {
    let socket_addr = SocketAddr::from((addr, port));
    let started = Instant::now();

    match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(_stream)) => Some(Evidence::OpenPort {
            port,
            rtt: started.elapsed(),
        }),
        Ok(Err(e)) => {
            trace!(%socket_addr, "Connect failed: {e}");
            None
        }
        Err(_elapsed) => None,
    }
}
