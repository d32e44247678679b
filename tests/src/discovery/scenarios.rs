//! End-to-end runs through the discovery service.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use netsweep_common::config::{Config, PerKind};
use netsweep_common::models::{DiscoveryKey, HostVerdict, ProbeKind, RegistryEvent};
use netsweep_common::network::range::Ipv4Range;
use netsweep_common::network::target::ScanTarget;
use netsweep_core::enumerator::StaticInterfaces;
use netsweep_core::probe::{PortProbe, ProbeStrategy, ReachabilityProbe};
use netsweep_core::task::HostProbeTask;
use tokio::net::TcpListener;

use crate::support::{
    Scripted, config, drain, echo, lan, port_80_on_dot_two, ports_80_and_554, service, silent, v4,
};

const DOT_TWO: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

fn keys(events: &[RegistryEvent]) -> Vec<DiscoveryKey> {
    events
        .iter()
        .filter_map(|event| match event {
            RegistryEvent::Discovered(record) => Some(record.key),
            RegistryEvent::Removed(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn slash_30_with_one_web_server_yields_one_service_record() {
    let cfg = Config {
        strategies: vec![ProbeKind::Port],
        ports: vec![80],
        ..config(4)
    };
    let port = Scripted::new(ProbeKind::Port, Duration::from_millis(5), port_80_on_dot_two);
    let calls = port.calls();
    let (svc, mut registry) = service(cfg, lan(&[v4(192, 168, 1, 0, 30)]), vec![port.shared()]);

    let summary = svc.scan().await;

    assert_eq!(summary.expected, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let records = svc.sink().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, DiscoveryKey::service(DOT_TWO, 80));
    assert_eq!(keys(&drain(&mut registry)), vec![DiscoveryKey::service(DOT_TWO, 80)]);
}

#[tokio::test]
async fn hosts_with_no_reaching_strategy_never_become_records() {
    let strategies = vec![
        Scripted::new(ProbeKind::Reachability, Duration::from_millis(1), silent).shared(),
        Scripted::new(ProbeKind::Port, Duration::from_millis(1), silent).shared(),
    ];
    let (svc, mut registry) = service(config(4), lan(&[v4(192, 168, 1, 0, 29)]), strategies);

    let summary = svc.scan().await;

    assert_eq!(summary.completed, 8);
    assert!(svc.sink().is_empty());
    assert!(drain(&mut registry).is_empty());
}

#[tokio::test]
async fn presence_plus_service_yields_two_keys() {
    let strategies = vec![
        Scripted::new(ProbeKind::Reachability, Duration::from_millis(1), echo).shared(),
        Scripted::new(ProbeKind::Port, Duration::from_millis(1), port_80_on_dot_two).shared(),
    ];
    let cfg = Config {
        targets: vec![Ipv4Range::single(DOT_TWO)],
        ..config(2)
    };
    let (svc, _registry) = service(cfg, StaticInterfaces(Vec::new()), strategies);

    svc.scan().await;

    let keys: Vec<DiscoveryKey> = svc.sink().records().iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![DiscoveryKey::host(DOT_TWO), DiscoveryKey::service(DOT_TWO, 80)]);
}

#[tokio::test]
async fn two_open_ports_yield_two_keys() {
    let port = Scripted::new(ProbeKind::Port, Duration::from_millis(1), ports_80_and_554);
    let cfg = Config {
        targets: vec![Ipv4Range::single(DOT_TWO)],
        ..config(2)
    };
    let (svc, _registry) = service(cfg, StaticInterfaces(Vec::new()), vec![port.shared()]);

    svc.scan().await;

    let keys: Vec<DiscoveryKey> = svc.sink().records().iter().map(|r| r.key).collect();
    assert_eq!(
        keys,
        vec![DiscoveryKey::service(DOT_TWO, 80), DiscoveryKey::service(DOT_TWO, 554)]
    );
}

#[tokio::test]
async fn rescan_within_ttl_does_not_rediscover() {
    let port = Scripted::new(ProbeKind::Port, Duration::from_millis(1), port_80_on_dot_two);
    let (svc, mut registry) = service(config(4), lan(&[v4(192, 168, 1, 0, 30)]), vec![port.shared()]);

    svc.scan().await;
    let first_seen = svc.sink().records()[0].first_seen;
    assert_eq!(drain(&mut registry).len(), 1);

    svc.scan().await;
    assert!(drain(&mut registry).is_empty());
    let record = &svc.sink().records()[0];
    assert_eq!(record.first_seen, first_seen);
    assert!(record.last_seen > first_seen);
}

#[tokio::test]
async fn rescan_after_ttl_rediscovers() {
    let cfg = Config {
        ttls: PerKind::uniform(Duration::from_millis(150)),
        ..config(4)
    };
    let port = Scripted::new(ProbeKind::Port, Duration::from_millis(1), port_80_on_dot_two);
    let (svc, mut registry) = service(cfg, lan(&[v4(192, 168, 1, 0, 30)]), vec![port.shared()]);

    svc.scan().await;
    assert_eq!(drain(&mut registry).len(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    svc.scan().await;

    let key = DiscoveryKey::service(DOT_TWO, 80);
    let events = drain(&mut registry);
    assert_eq!(events.first(), Some(&RegistryEvent::Removed(key)));
    assert_eq!(keys(&events), vec![key]);
}

#[tokio::test]
async fn expiry_sweep_announces_removal() {
    let cfg = Config {
        ttls: PerKind::uniform(Duration::from_millis(100)),
        ..config(4)
    };
    let port = Scripted::new(ProbeKind::Port, Duration::from_millis(1), port_80_on_dot_two);
    let (svc, mut registry) = service(cfg, lan(&[v4(192, 168, 1, 0, 30)]), vec![port.shared()]);

    svc.scan().await;
    drain(&mut registry);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(svc.expire_stale(), 1);
    assert_eq!(
        drain(&mut registry),
        vec![RegistryEvent::Removed(DiscoveryKey::service(DOT_TWO, 80))]
    );
    assert!(svc.sink().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registry_tracks_sink_while_sweeps_overlap_rescans() {
    let strategies = vec![
        Scripted::new(ProbeKind::Reachability, Duration::from_millis(1), echo).shared(),
        Scripted::new(ProbeKind::Port, Duration::from_millis(1), ports_80_and_554).shared(),
    ];
    let cfg = Config {
        ttls: PerKind::uniform(Duration::from_millis(2)),
        background_interval: Duration::from_millis(3),
        expiry_sweep_interval: Duration::from_millis(1),
        prune_after_scan: false,
        ..config(8)
    };
    let (svc, mut registry) = service(cfg, lan(&[v4(192, 168, 1, 0, 28)]), strategies);

    assert!(svc.start_background_discovery());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(svc.stop_background_discovery());
    svc.stop_scan();
    tokio::time::sleep(Duration::from_millis(20)).await;
    svc.settled().await;

    let mut live = HashSet::new();
    for event in drain(&mut registry) {
        match event {
            RegistryEvent::Discovered(record) => {
                assert!(live.insert(record.key), "{} announced twice", record.key);
            }
            RegistryEvent::Removed(key) => {
                assert!(live.remove(&key), "{key} removed while unknown");
            }
        }
    }
    let held: HashSet<DiscoveryKey> = svc.sink().records().iter().map(|r| r.key).collect();
    assert_eq!(live, held);
}

#[tokio::test(start_paused = true)]
async fn repeated_start_while_running_dispatches_each_host_once() {
    let port = Scripted::new(ProbeKind::Port, Duration::from_secs(2), silent);
    let calls = port.calls();
    let (svc, _registry) = service(config(2), lan(&[v4(192, 168, 1, 0, 29)]), vec![port.shared()]);

    let handles: Vec<_> = (0..5).map(|_| svc.start_scan()).collect();
    for handle in &handles {
        handle.wait().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(svc.coordinator().dispatched(), 8);
}

#[tokio::test(start_paused = true)]
async fn silent_host_verdict_arrives_at_its_reachability_timeout() {
    struct NeverReplies;

    #[async_trait::async_trait]
    impl ProbeStrategy for NeverReplies {
        fn kind(&self) -> ProbeKind {
            ProbeKind::Reachability
        }

        async fn probe(&self, _target: &ScanTarget, _timeout: Duration) -> netsweep_common::models::ProbeOutcome {
            std::future::pending().await
        }
    }

    let task = HostProbeTask::new(
        vec![std::sync::Arc::new(NeverReplies)],
        PerKind::uniform(Duration::from_millis(200)),
    );
    let started = tokio::time::Instant::now();
    let verdict: HostVerdict = task.run(ScanTarget::standalone(Ipv4Addr::new(192, 0, 2, 1))).await;
    let elapsed = started.elapsed();

    assert!(!verdict.present);
    assert!(!verdict.outcomes[0].reachable);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(250));
}

#[tokio::test]
async fn real_reachability_probe_gives_up_on_unroutable_host() {
    let task = HostProbeTask::new(
        vec![std::sync::Arc::new(ReachabilityProbe::new("ping".into()))],
        PerKind::uniform(Duration::from_millis(200)),
    );

    let started = Instant::now();
    let verdict = task.run(ScanTarget::standalone(Ipv4Addr::new(203, 0, 113, 7))).await;

    assert!(!verdict.present);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn real_port_probe_finds_loopback_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cfg = Config {
        strategies: vec![ProbeKind::Port],
        ports: vec![port],
        timeouts: PerKind::uniform(Duration::from_millis(500)),
        targets: vec![Ipv4Range::single(Ipv4Addr::LOCALHOST)],
        ..config(2)
    };
    let strategies: Vec<std::sync::Arc<dyn ProbeStrategy>> =
        vec![std::sync::Arc::new(PortProbe::new(cfg.ports.clone()))];
    let (svc, _registry) = service(cfg, StaticInterfaces(Vec::new()), strategies);

    svc.scan().await;

    let record = svc
        .sink()
        .get(&DiscoveryKey::service(Ipv4Addr::LOCALHOST, port))
        .expect("listener should be discovered");
    assert_eq!(record.properties["detectedBy"], "tcp");
    assert_eq!(record.label, format!("Network Service 127.0.0.1:{port}"));
}
