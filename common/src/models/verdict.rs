use std::net::Ipv4Addr;

use crate::network::target::ScanTarget;

use super::ProbeOutcome;

/// Consolidated result of every strategy run against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostVerdict {
    pub target: ScanTarget,
    pub outcomes: Vec<ProbeOutcome>,
    /// Logical OR of the outcomes. Strategies are independent evidence
    /// sources, a failing one never makes a host absent.
    pub present: bool,
}

impl HostVerdict {
    pub fn new(target: ScanTarget, outcomes: Vec<ProbeOutcome>) -> Self {
        let present = outcomes.iter().any(|outcome| outcome.reachable);
        Self {
            target,
            outcomes,
            present,
        }
    }

    /// Verdict for a task that never produced outcomes (panic, host timeout).
    pub fn absent(target: ScanTarget) -> Self {
        Self::new(target, Vec::new())
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.target.addr
    }
}
