//! Coordinator-level properties: verdict counts, deadlines and the pool.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use netsweep_common::config::PerKind;
use netsweep_common::models::{ProbeKind, ScanState};
use netsweep_common::network::range::Ipv4Range;
use netsweep_common::network::target::ScanTarget;
use netsweep_core::coordinator::{ScanCoordinator, ScanHandle};
use netsweep_core::probe::ProbeStrategy;
use netsweep_core::task::HostProbeTask;

use crate::support::{Scripted, echo, silent};

fn targets(n: u32) -> Vec<ScanTarget> {
    let start = u32::from(Ipv4Addr::new(10, 1, 0, 1));
    let range = Ipv4Range::new(Ipv4Addr::from(start), Ipv4Addr::from(start + n.saturating_sub(1)));
    (0..n)
        .map(|i| ScanTarget::new(Ipv4Addr::from(start + i), None, range))
        .collect()
}

fn coordinator(strategies: Vec<Arc<dyn ProbeStrategy>>, pool: usize) -> ScanCoordinator {
    let task = HostProbeTask::new(strategies, PerKind::uniform(Duration::from_secs(60)));
    ScanCoordinator::new(task, pool)
}

async fn collect(mut handle: ScanHandle) -> usize {
    let mut seen = 0;
    while handle.next_verdict().await.is_some() {
        seen += 1;
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn completed_scan_reports_exactly_one_verdict_per_host() {
    for (n, pool) in [(1, 1), (7, 3), (32, 4), (5, 16)] {
        let strategies = vec![
            Scripted::new(ProbeKind::Reachability, Duration::from_millis(30), echo).shared(),
            Scripted::new(ProbeKind::Port, Duration::from_millis(10), silent).shared(),
        ];
        let coordinator = coordinator(strategies, pool);
        let handle = coordinator
            .start_scan(targets(n), Duration::from_secs(10), Duration::from_secs(600))
            .into_handle();

        assert_eq!(collect(handle.clone()).await, n as usize, "n={n} pool={pool}");
        let summary = handle.wait().await;
        assert_eq!(summary.state, ScanState::Completed);
        assert_eq!(summary.completed, n as usize);
        assert_eq!(summary.present, n as usize);
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_yields_partial_results_and_ignores_late_completions() {
    let strategy = Scripted::new(ProbeKind::Reachability, Duration::from_secs(10), echo);
    let coordinator = coordinator(vec![strategy.shared()], 2);

    // Pool of 2 with 10s probes: two waves finish before 25s, the third never does.
    let handle = coordinator
        .start_scan(targets(6), Duration::from_secs(30), Duration::from_secs(25))
        .into_handle();
    let seen = collect(handle.clone()).await;
    let summary = handle.wait().await;

    assert_eq!(seen, 4);
    assert_eq!(summary.completed, 4);
    assert!(summary.cut_short());

    // The third wave finishes in the background after the session closed.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let after = handle.summary();
    assert_eq!(after.completed, 4);
    assert_eq!(after.state, ScanState::Completed);
    assert!(after.completed <= after.expected);
}

#[tokio::test(start_paused = true)]
async fn stopping_mid_scan_completes_without_further_verdicts() {
    let strategy = Scripted::new(ProbeKind::Reachability, Duration::from_secs(10), echo);
    let coordinator = coordinator(vec![strategy.shared()], 1);
    let mut handle = coordinator
        .start_scan(targets(3), Duration::from_secs(30), Duration::from_secs(600))
        .into_handle();

    assert!(handle.next_verdict().await.is_some());
    assert!(coordinator.stop_scan());
    assert!(handle.next_verdict().await.is_none());

    let summary = handle.wait().await;
    assert_eq!(summary.completed, 1);
    assert!(coordinator.active().is_none());
}

#[tokio::test(start_paused = true)]
async fn silent_hosts_still_produce_verdicts() {
    let strategy = Scripted::new(ProbeKind::Reachability, Duration::from_millis(10), silent);
    let coordinator = coordinator(vec![strategy.shared()], 4);
    let handle = coordinator
        .start_scan(targets(9), Duration::from_secs(10), Duration::from_secs(600))
        .into_handle();

    assert_eq!(collect(handle.clone()).await, 9);
    assert_eq!(handle.wait().await.present, 0);
}
