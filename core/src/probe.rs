//! # Probe strategies
//!
//! A strategy answers "is anything at this address?" for one detection
//! method. Every strategy shares the same contract:
//!
//! * It never fails for ordinary silence. Timeouts, refused connections and
//!   unreachable hosts map to `reachable = false` without an error.
//! * It returns within the timeout it was given.
//! * When the method cannot work on this system at all (missing tool, no raw
//!   socket permission) it latches itself unavailable, logs that once, and
//!   reports no evidence for the rest of its lifetime.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use netsweep_common::config::{Config, LinkLayerBackend};
use netsweep_common::error::ProbeError;
use netsweep_common::models::{ProbeKind, ProbeOutcome};
use netsweep_common::network::target::ScanTarget;
use tracing::warn;

pub mod link_layer;
pub mod port;
pub mod reachability;

pub use link_layer::{ArpBackend, ArpTable, ArpingTool, LinkLayerProbe};
pub use port::PortProbe;
pub use reachability::ReachabilityProbe;

#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    fn kind(&self) -> ProbeKind;

    async fn probe(&self, target: &ScanTarget, timeout: Duration) -> ProbeOutcome;
}

/// Builds the strategies enabled in `cfg`, in configuration order.
pub fn build_strategies(cfg: &Config) -> Vec<Arc<dyn ProbeStrategy>> {
    let mut strategies: Vec<Arc<dyn ProbeStrategy>> = Vec::new();
    for kind in &cfg.strategies {
        if strategies.iter().any(|s| s.kind() == *kind) {
            continue;
        }
        let strategy: Arc<dyn ProbeStrategy> = match kind {
            ProbeKind::Reachability => Arc::new(ReachabilityProbe::new(cfg.ping_path.clone())),
            ProbeKind::LinkLayer => {
                let backend: Box<dyn ArpBackend> = match cfg.link_layer_backend {
                    LinkLayerBackend::ArpingTool => Box::new(ArpingTool::new(cfg.arping_path.clone())),
                    LinkLayerBackend::ArpTable => Box::new(ArpTable::default()),
                };
                Arc::new(LinkLayerProbe::new(backend))
            }
            ProbeKind::Port => Arc::new(PortProbe::new(cfg.ports.clone())),
        };
        strategies.push(strategy);
    }
    strategies
}

/// Sticky "this method cannot work here" flag.
pub(crate) struct Availability {
    kind: ProbeKind,
    method: &'static str,
    unavailable: OnceLock<String>,
}

impl Availability {
    pub(crate) fn new(kind: ProbeKind, method: &'static str) -> Self {
        Self {
            kind,
            method,
            unavailable: OnceLock::new(),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.unavailable.get().is_none()
    }

    /// Latches the method off. Only the first call logs.
    pub(crate) fn mark_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.unavailable.set(reason.clone()).is_ok() {
            warn!(kind = %self.kind, method = self.method, "Probe method disabled: {reason}");
        }
    }

    pub(crate) fn error(&self) -> ProbeError {
        let reason = self
            .unavailable
            .get()
            .map(|r| format!("{}: {r}", self.method))
            .unwrap_or_else(|| self.method.to_string());
        ProbeError::Unavailable {
            kind: self.kind,
            reason,
        }
    }
}
