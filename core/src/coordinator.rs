//! # Scan coordination
//!
//! Fans one [`HostProbeTask`] per target out over a bounded worker pool and
//! streams verdicts back in completion order.
//!
//! The pool is a semaphore sized once per coordinator: targets are only
//! pulled and spawned as permits free up, so a /16 never means 65 536 live
//! tasks. A session ends when every expected completion arrived, or when the
//! deadline or a stop request fires first. In the latter case in-flight
//! tasks are detached rather than killed (their blocking I/O may not be
//! interruptible) and whatever they report afterwards is ignored.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use netsweep_common::models::{HostVerdict, ScanSession, ScanState};
use netsweep_common::network::target::ScanTarget;
use tokio::sync::{Semaphore, broadcast, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task::HostProbeTask;

/// Final figures of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub state: ScanState,
    pub expected: usize,
    pub completed: usize,
    /// Verdicts with at least one reaching strategy.
    pub present: usize,
    pub elapsed: Duration,
}

impl ScanSummary {
    /// True when the deadline or a stop request ended the scan early.
    pub fn cut_short(&self) -> bool {
        self.completed < self.expected
    }
}

/// Outcome of a `start_scan` request.
pub enum ScanStart {
    /// A new session was created. `feed` is a second subscription taken
    /// before any host was dispatched, for a consumer other than the caller.
    Started { handle: ScanHandle, feed: ScanHandle },
    /// A session was already running; the handle observes it.
    Joined(ScanHandle),
}

impl ScanStart {
    pub fn into_handle(self) -> ScanHandle {
        match self {
            ScanStart::Started { handle, .. } | ScanStart::Joined(handle) => handle,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, ScanStart::Started { .. })
    }
}

struct SessionInner {
    session: ScanSession,
    present: usize,
    finished: Option<Instant>,
    /// Dropped when the session completes, closing every subscriber.
    verdicts: Option<broadcast::Sender<HostVerdict>>,
}

pub(crate) struct SessionShared {
    inner: Mutex<SessionInner>,
    state: watch::Sender<ScanState>,
    cancel: CancellationToken,
    started: Instant,
}

impl SessionShared {
    fn new(expected: usize) -> Self {
        let (verdicts, _) = broadcast::channel(expected.max(1));
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            inner: Mutex::new(SessionInner {
                session: ScanSession::new(expected),
                present: 0,
                finished: None,
                verdicts: Some(verdicts),
            }),
            state,
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        let mut inner = self.lock();
        if let Err(e) = inner.session.begin() {
            warn!("{e}");
        }
        self.publish(&mut inner);
    }

    /// Counts one finished host. Late or excess signals are dropped.
    fn complete(&self, verdict: HostVerdict) -> bool {
        let mut inner = self.lock();
        if !inner.session.record_completion() {
            debug!(addr = %verdict.addr(), "Ignoring completion outside of a running session");
            return false;
        }
        if verdict.present {
            inner.present += 1;
        }
        if let Some(tx) = &inner.verdicts {
            let _ = tx.send(verdict);
        }
        self.publish(&mut inner);
        true
    }

    fn request_cancel(&self) -> bool {
        let cancelled = {
            let mut inner = self.lock();
            let cancelled = inner.session.cancel();
            self.publish(&mut inner);
            cancelled
        };
        self.cancel.cancel();
        cancelled
    }

    fn finish(&self) {
        let mut inner = self.lock();
        inner.session.finish();
        self.publish(&mut inner);
    }

    fn publish(&self, inner: &mut SessionInner) {
        let state = inner.session.state();
        if state == ScanState::Completed {
            inner.verdicts = None;
            inner.finished.get_or_insert_with(Instant::now);
        }
        self.state.send_replace(state);
    }

    fn subscribe(&self) -> broadcast::Receiver<HostVerdict> {
        match &self.lock().verdicts {
            Some(tx) => tx.subscribe(),
            None => {
                let (closed, rx) = broadcast::channel(1);
                drop(closed);
                rx
            }
        }
    }

    fn summary(&self) -> ScanSummary {
        let inner = self.lock();
        ScanSummary {
            state: inner.session.state(),
            expected: inner.session.expected(),
            completed: inner.session.completed(),
            present: inner.present,
            elapsed: inner
                .finished
                .map(|finished| finished.duration_since(self.started))
                .unwrap_or_else(|| self.started.elapsed()),
        }
    }
}

/// Reports a host's completion exactly once.
///
/// Dropping the guard unreported (panic, abort) reports an absent verdict so
/// the session's count still reaches its expected total.
pub(crate) struct Completion {
    shared: Option<Arc<SessionShared>>,
    target: ScanTarget,
}

impl Completion {
    fn new(shared: Arc<SessionShared>, target: ScanTarget) -> Self {
        Self {
            shared: Some(shared),
            target,
        }
    }

    pub(crate) fn report(mut self, verdict: HostVerdict) {
        if let Some(shared) = self.shared.take() {
            shared.complete(verdict);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.complete(HostVerdict::absent(self.target.clone()));
        }
    }
}

/// Observer of one session: a verdict stream plus progress and summary.
///
/// A handle sees the verdicts produced after it subscribed.
pub struct ScanHandle {
    shared: Arc<SessionShared>,
    verdicts: broadcast::Receiver<HostVerdict>,
}

impl ScanHandle {
    fn new(shared: Arc<SessionShared>) -> Self {
        let verdicts = shared.subscribe();
        Self { shared, verdicts }
    }

    /// Next verdict in completion order, `None` once the session ended and
    /// the buffered verdicts are drained.
    pub async fn next_verdict(&mut self) -> Option<HostVerdict> {
        loop {
            match self.verdicts.recv().await {
                Ok(verdict) => return Some(verdict),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Verdict subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Resolves once the session is `Completed`.
    pub async fn wait(&self) -> ScanSummary {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == ScanState::Completed).await;
        self.shared.summary()
    }

    pub fn state(&self) -> ScanState {
        *self.shared.state.borrow()
    }

    /// `(completed, expected)` so far.
    pub fn progress(&self) -> (usize, usize) {
        let summary = self.shared.summary();
        (summary.completed, summary.expected)
    }

    pub fn summary(&self) -> ScanSummary {
        self.shared.summary()
    }

    /// Requests cancellation of the observed session.
    pub fn cancel(&self) {
        self.shared.request_cancel();
    }
}

impl Clone for ScanHandle {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            verdicts: self.verdicts.resubscribe(),
        }
    }
}

pub struct ScanCoordinator {
    task: Arc<HostProbeTask>,
    pool_size: usize,
    current: Mutex<Option<Arc<SessionShared>>>,
    dispatched: Arc<AtomicUsize>,
}

impl ScanCoordinator {
    pub fn new(task: HostProbeTask, pool_size: usize) -> Self {
        Self {
            task: Arc::new(task),
            pool_size: pool_size.max(1),
            current: Mutex::new(None),
            dispatched: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Host tasks dispatched over the coordinator's lifetime.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Starts a session over `targets`, or joins the one already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_scan(
        &self,
        targets: Vec<ScanTarget>,
        per_host_timeout: Duration,
        overall_deadline: Duration,
    ) -> ScanStart {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = current.as_ref().filter(|s| s.summary().state.is_active()) {
            debug!("Scan already running, joining it");
            return ScanStart::Joined(ScanHandle::new(Arc::clone(active)));
        }

        let expected = targets.len();
        let shared = Arc::new(SessionShared::new(expected));
        let handle = ScanHandle::new(Arc::clone(&shared));
        let feed = ScanHandle::new(Arc::clone(&shared));
        shared.begin();
        *current = Some(Arc::clone(&shared));
        drop(current);

        info!(
            targets = expected,
            pool = self.pool_size,
            strategies = ?self.task.kinds(),
            deadline_ms = overall_deadline.as_millis() as u64,
            "Starting scan"
        );

        if expected > 0 {
            let driver = Driver {
                shared,
                task: Arc::clone(&self.task),
                pool_size: self.pool_size,
                per_host_timeout,
                deadline: tokio::time::Instant::now() + overall_deadline,
                dispatched: Arc::clone(&self.dispatched),
            };
            tokio::spawn(driver.run(targets));
        } else {
            info!("No targets, scan completed immediately");
        }

        ScanStart::Started { handle, feed }
    }

    /// Handle to the running session, if any.
    pub fn active(&self) -> Option<ScanHandle> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .filter(|s| s.summary().state.is_active())
            .map(|s| ScanHandle::new(Arc::clone(s)))
    }

    /// Requests cancellation of the running session. Safe when idle.
    pub fn stop_scan(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(shared) => shared.request_cancel(),
            None => false,
        }
    }
}

struct Driver {
    shared: Arc<SessionShared>,
    task: Arc<HostProbeTask>,
    pool_size: usize,
    per_host_timeout: Duration,
    deadline: tokio::time::Instant,
    dispatched: Arc<AtomicUsize>,
}

enum Ending {
    Drained,
    Deadline,
    Cancelled,
}

impl Driver {
    async fn run(self, targets: Vec<ScanTarget>) {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut pending = targets.into_iter();
        let mut exhausted = false;
        let mut workers = JoinSet::new();

        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);

        let ending = loop {
            if exhausted && workers.is_empty() {
                break Ending::Drained;
            }

            tokio::select! {
                biased;

                _ = self.shared.cancel.cancelled() => break Ending::Cancelled,

                _ = &mut deadline => break Ending::Deadline,

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        debug!("Host task ended abnormally: {e}");
                    }
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if !exhausted => {
                    let Ok(permit) = permit else {
                        exhausted = true;
                        continue;
                    };
                    let Some(target) = pending.next() else {
                        exhausted = true;
                        continue;
                    };

                    self.dispatched.fetch_add(1, Ordering::SeqCst);
                    let completion = Completion::new(Arc::clone(&self.shared), target.clone());
                    let task = Arc::clone(&self.task);
                    let cap = self.per_host_timeout;
                    workers.spawn(async move {
                        let _permit = permit;
                        task.run_reporting(target, cap, completion).await;
                    });
                    exhausted = pending.len() == 0;
                }
            }
        };

        semaphore.close();
        match ending {
            Ending::Drained => {}
            Ending::Deadline | Ending::Cancelled => {
                self.shared.request_cancel();
                workers.detach_all();
            }
        }
        self.shared.finish();

        let summary = self.shared.summary();
        match ending {
            Ending::Drained => info!(
                hosts = summary.completed,
                present = summary.present,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Scan completed"
            ),
            Ending::Deadline => warn!(
                unfinished = summary.expected - summary.completed,
                present = summary.present,
                "Scan deadline reached, probes never finished"
            ),
            Ending::Cancelled => info!(
                unfinished = summary.expected - summary.completed,
                present = summary.present,
                "Scan stopped, probes never finished"
            ),
        }
    }
}
