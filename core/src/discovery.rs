//! # Discovery service
//!
//! The externally visible entry point. Wires the enumerator, coordinator
//! and sink together:
//!
//! ```text
//! enumerate() -> ScanCoordinator -> HostProbeTask -> strategies
//!                      |
//!                      +-> verdicts -> ResultSink -> registry events
//! ```
//!
//! Nothing here returns an error. A scan over zero targets is a completed
//! scan with zero results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use netsweep_common::config::Config;
use netsweep_common::models::{ProbeKind, RegistryEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::coordinator::{ScanCoordinator, ScanHandle, ScanStart, ScanSummary};
use crate::enumerator::{AddressSpaceEnumerator, InterfaceSource, SystemInterfaces};
use crate::probe::{self, ProbeStrategy};
use crate::sink::ResultSink;
use crate::task::HostProbeTask;
use crate::vendors;

struct Inner {
    config: Config,
    enumerator: AddressSpaceEnumerator,
    coordinator: ScanCoordinator,
    sink: Arc<ResultSink>,
    /// Sessions started through this service.
    started: AtomicUsize,
    /// Sessions whose verdicts have all reached the sink.
    settled: watch::Sender<usize>,
}

struct Background {
    scans: JoinHandle<()>,
    sweeps: JoinHandle<()>,
}

impl Background {
    fn abort(&self) {
        self.scans.abort();
        self.sweeps.abort();
    }
}

pub struct DiscoveryService {
    inner: Arc<Inner>,
    background: Mutex<Option<Background>>,
}

impl DiscoveryService {
    pub fn new(
        config: Config,
        source: Box<dyn InterfaceSource>,
        strategies: Vec<Arc<dyn ProbeStrategy>>,
        sink: Arc<ResultSink>,
    ) -> Self {
        let enumerator = AddressSpaceEnumerator::new(source, &config);
        let task = HostProbeTask::new(strategies, config.timeouts);
        let coordinator = ScanCoordinator::new(task, config.worker_pool_size());
        Self {
            inner: Arc::new(Inner {
                config,
                enumerator,
                coordinator,
                sink,
                started: AtomicUsize::new(0),
                settled: watch::Sender::new(0),
            }),
            background: Mutex::new(None),
        }
    }

    /// A service over the live interface table with the configured
    /// strategies, plus the registry end of its sink.
    pub fn with_system_defaults(config: Config) -> (Self, UnboundedReceiver<RegistryEvent>) {
        let (sink, registry) = ResultSink::channel(config.ttls);
        let strategies = probe::build_strategies(&config);
        if strategies.iter().any(|s| s.kind() == ProbeKind::LinkLayer) {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn_blocking(vendors::preload);
            }
        }
        let service = Self::new(config, Box::new(SystemInterfaces), strategies, sink);
        (service, registry)
    }

    /// Starts a scan, or returns a handle to the one already running.
    pub fn start_scan(&self) -> ScanHandle {
        Inner::start_scan(&self.inner)
    }

    /// Requests cancellation of the running scan. A no-op when idle.
    pub fn stop_scan(&self) {
        if !self.inner.coordinator.stop_scan() {
            debug!("No scan to stop");
        }
    }

    /// Runs a scan (or joins the running one) and resolves once its
    /// verdicts are all applied to the sink.
    pub async fn scan(&self) -> ScanSummary {
        let summary = self.start_scan().wait().await;
        self.settled().await;
        summary
    }

    /// Resolves once every session started so far has been fed into the
    /// sink in full.
    pub async fn settled(&self) {
        let target = self.inner.started.load(Ordering::SeqCst);
        let mut settled = self.inner.settled.subscribe();
        let _ = settled.wait_for(|done| *done >= target).await;
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.coordinator.active().is_some()
    }

    /// Periodically starts scans at the configured interval, beginning
    /// immediately, and sweeps expired records. Returns `false` if already
    /// running.
    pub fn start_background_discovery(&self) -> bool {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        if background.is_some() {
            return false;
        }

        let scan_every = self.inner.config.background_interval;
        let sweep_every = self.inner.config.expiry_sweep_interval;
        info!(
            interval_s = scan_every.as_secs(),
            sweep_s = sweep_every.as_secs(),
            "Starting background discovery"
        );

        let inner = Arc::clone(&self.inner);
        let scans = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scan_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                Inner::start_scan(&inner).wait().await;
            }
        });

        let inner = Arc::clone(&self.inner);
        let sweeps = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.sink.expire();
            }
        });

        *background = Some(Background { scans, sweeps });
        true
    }

    /// Stops scheduling scans and sweeps. A scan already running is left to
    /// finish, use [`stop_scan`](Self::stop_scan) to cut it short.
    pub fn stop_background_discovery(&self) -> bool {
        let stopped = self.background.lock().unwrap_or_else(PoisonError::into_inner).take();
        match stopped {
            Some(background) => {
                background.abort();
                info!("Stopped background discovery");
                true
            }
            None => false,
        }
    }

    pub fn is_background_running(&self) -> bool {
        self.background.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Runs one expiry sweep now.
    pub fn expire_stale(&self) -> usize {
        self.inner.sink.expire().len()
    }

    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.inner.sink
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.inner.coordinator
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        if let Some(background) = self.background.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            background.abort();
        }
    }
}

impl Inner {
    fn start_scan(inner: &Arc<Self>) -> ScanHandle {
        if let Some(handle) = inner.coordinator.active() {
            debug!("Scan already running");
            return handle;
        }

        let started_at = Instant::now();
        let targets = inner.enumerator.enumerate();
        let start = inner.coordinator.start_scan(
            targets,
            inner.config.per_host_timeout(),
            inner.config.scan_deadline,
        );

        match start {
            ScanStart::Started { handle, feed } => {
                inner.started.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(Self::forward(Arc::clone(inner), feed, started_at));
                handle
            }
            ScanStart::Joined(handle) => handle,
        }
    }

    /// Feeds every verdict of one session into the sink.
    async fn forward(inner: Arc<Self>, mut handle: ScanHandle, started_at: Instant) {
        while let Some(verdict) = handle.next_verdict().await {
            inner.sink.accept(&verdict);
        }

        let summary = handle.wait().await;
        if inner.config.prune_after_scan && !summary.cut_short() {
            let pruned = inner.sink.remove_older_than(started_at);
            if !pruned.is_empty() {
                info!(pruned = pruned.len(), "Pruned records not seen in the last scan");
            }
        }
        info!(
            present = summary.present,
            records = inner.sink.len(),
            "Discovery pass finished"
        );
        inner.settled.send_modify(|done| *done += 1);
    }
}
