use crate::error::SessionError;

/// Lifecycle of a scan session.
///
/// Valid edges: `Idle -> Running`, `Running -> Completed`,
/// `Running -> Cancelling`, `Cancelling -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    Idle,
    Running,
    Cancelling,
    Completed,
}

impl ScanState {
    pub fn can_transition_to(self, next: ScanState) -> bool {
        matches!(
            (self, next),
            (ScanState::Idle, ScanState::Running)
                | (ScanState::Running, ScanState::Completed)
                | (ScanState::Running, ScanState::Cancelling)
                | (ScanState::Cancelling, ScanState::Completed)
        )
    }

    /// Running or cancelling: the session still owns the coordinator.
    pub fn is_active(self) -> bool {
        matches!(self, ScanState::Running | ScanState::Cancelling)
    }
}

/// Bookkeeping of one bounded scan over a target set.
#[derive(Debug, Clone)]
pub struct ScanSession {
    state: ScanState,
    expected: usize,
    completed: usize,
}

impl ScanSession {
    pub fn new(expected: usize) -> Self {
        Self {
            state: ScanState::Idle,
            expected,
            completed: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Probes that were expected but have not reported.
    pub fn outstanding(&self) -> usize {
        self.expected - self.completed
    }

    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.transition(ScanState::Running)?;
        if self.expected == 0 {
            self.transition(ScanState::Completed)?;
        }
        Ok(())
    }

    /// Counts one finished probe.
    ///
    /// Returns `false` when the signal is ignored: the session is no longer
    /// running or the expected count was already reached. The session
    /// completes itself on the final expected signal.
    pub fn record_completion(&mut self) -> bool {
        if self.state != ScanState::Running || self.completed >= self.expected {
            return false;
        }
        self.completed += 1;
        if self.completed == self.expected {
            self.state = ScanState::Completed;
        }
        true
    }

    /// Requests cancellation. Only a running session can be cancelled.
    pub fn cancel(&mut self) -> bool {
        self.transition(ScanState::Cancelling).is_ok()
    }

    /// Moves an active session to `Completed`, passing through `Cancelling`
    /// when probes are still outstanding.
    pub fn finish(&mut self) {
        if self.state == ScanState::Running && self.completed < self.expected {
            self.state = ScanState::Cancelling;
        }
        if self.state.is_active() {
            self.state = ScanState::Completed;
        }
    }

    fn transition(&mut self, next: ScanState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
