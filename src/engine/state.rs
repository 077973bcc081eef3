use crate::plan::UpdatePlan;
use crate::sync::SyncReport;

// Coarse phase of a run, sent to whoever displays it.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncState {
    Fetching { folder: String },
    Computing,
    Applying { plan: UpdatePlan },
    UpToDate,
    Completed(SyncReport),
    Error(String),
}

/// Terminal result of one run.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    UpToDate,
    Updated(SyncReport),
    Failed(String),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncOutcome::Failed(_))
    }
}

/// Per-process session flags, threaded through the calling flow.
///
/// `try_begin` is the one-shot guard that keeps a second run from starting while
/// one is in flight. `allow_continue` is granted once by a successful run and
/// consumed by whatever screen or step comes next.
#[derive(Debug, Default)]
pub struct SyncSession {
    initial_check_done: bool,
    running: bool,
    allow_continue: bool,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the automatic first check. Returns `false` once it has been claimed.
    pub fn begin_initial_check(&mut self) -> bool {
        if self.initial_check_done {
            return false;
        }
        let started = self.try_begin();
        if started {
            self.initial_check_done = true;
        }
        started
    }

    pub fn try_begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.allow_continue = false;
        true
    }

    pub fn finish(&mut self, outcome: &SyncOutcome) {
        self.running = false;
        self.allow_continue = outcome.is_success();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn initial_check_done(&self) -> bool {
        self.initial_check_done
    }

    pub fn take_allow_continue(&mut self) -> bool {
        std::mem::take(&mut self.allow_continue)
    }
}
