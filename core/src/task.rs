//! Per-host probing: every configured strategy against one target, folded
//! into a single [`HostVerdict`].

use std::sync::Arc;
use std::time::Duration;

use netsweep_common::config::PerKind;
use netsweep_common::error::ProbeError;
use netsweep_common::models::{HostVerdict, ProbeKind, ProbeOutcome};
use netsweep_common::network::target::ScanTarget;
use tracing::{debug, trace};

use crate::coordinator::Completion;
use crate::probe::ProbeStrategy;

pub struct HostProbeTask {
    strategies: Vec<Arc<dyn ProbeStrategy>>,
    timeouts: PerKind<Duration>,
}

impl HostProbeTask {
    pub fn new(strategies: Vec<Arc<dyn ProbeStrategy>>, timeouts: PerKind<Duration>) -> Self {
        Self {
            strategies,
            timeouts,
        }
    }

    /// Runs all strategies concurrently and aggregates their outcomes.
    ///
    /// Each strategy is cut off at its own timeout, so the task never takes
    /// longer than the slowest configured timeout. A panicking strategy
    /// yields a failed outcome instead of taking the task down.
    pub async fn run(&self, target: ScanTarget) -> HostVerdict {
        let mut running = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let kind = strategy.kind();
            let timeout = self.timeouts.get(kind);
            let strategy = Arc::clone(strategy);
            let target = target.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, strategy.probe(&target, timeout)).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => ProbeOutcome::no_evidence(kind),
                }
            });
            running.push((kind, handle));
        }

        let mut outcomes = Vec::with_capacity(running.len());
        for (kind, handle) in running {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    debug!(addr = %target.addr, %kind, "Strategy task failed: {e}");
                    outcomes.push(ProbeOutcome::failed(kind, ProbeError::Panicked { kind }));
                }
            }
        }

        let verdict = HostVerdict::new(target, outcomes);
        trace!(addr = %verdict.addr(), present = verdict.present, "Host verdict");
        verdict
    }

    /// Runs the task under a whole-host cap and reports to the coordinator.
    ///
    /// Completion is reported exactly once: explicitly with the verdict, or
    /// by the guard's drop if this future panics or is aborted.
    pub(crate) async fn run_reporting(&self, target: ScanTarget, cap: Duration, completion: Completion) {
        let verdict = match tokio::time::timeout(cap, self.run(target.clone())).await {
            Ok(verdict) => verdict,
            Err(_elapsed) => {
                debug!(addr = %target.addr, "Host task exceeded its time cap");
                HostVerdict::absent(target)
            }
        };
        completion.report(verdict);
    }

    pub fn kinds(&self) -> Vec<ProbeKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }
}
