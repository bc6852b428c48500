//! Shared pause/cancel state for a running wipe.
//!
//! The flags and the job state live behind one mutex paired with a
//! condition variable. Workers call [`JobControl::checkpoint`] between
//! units of work; it blocks while paused and reports cancellation.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Lifecycle of a wipe job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Flags {
    paused: bool,
    cancelled: bool,
    /// Set once the job is past its last cancellation point.
    committed: bool,
    state: JobState,
}

/// Pause/cancel flags shared between the engine, its workers and handles.
#[derive(Debug)]
pub(crate) struct JobControl {
    flags: Mutex<Flags>,
    resumed: Condvar,
}

impl JobControl {
    pub(crate) fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                paused: false,
                cancelled: false,
                committed: false,
                state: JobState::Pending,
            }),
            resumed: Condvar::new(),
        }
    }

    /// Block while paused. Returns `false` once the job is cancelled.
    pub(crate) fn checkpoint(&self) -> bool {
        let mut flags = self.flags.lock();
        while flags.paused && !flags.cancelled {
            self.resumed.wait(&mut flags);
        }
        !flags.cancelled
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flags.lock().cancelled
    }

    /// Close the job to further pause and cancel requests, waiting out a
    /// pause first. Returns `false` if a cancellation got in first.
    pub(crate) fn commit(&self) -> bool {
        let mut flags = self.flags.lock();
        while flags.paused && !flags.cancelled {
            self.resumed.wait(&mut flags);
        }
        if flags.cancelled {
            return false;
        }
        flags.committed = true;
        true
    }

    pub(crate) fn set_state(&self, state: JobState) {
        let mut flags = self.flags.lock();
        // A pause requested before the job started still applies.
        flags.state = if state == JobState::Running && flags.paused {
            JobState::Paused
        } else {
            state
        };
    }

    pub(crate) fn state(&self) -> JobState {
        self.flags.lock().state
    }

    fn set_paused(&self, paused: bool) -> bool {
        let mut flags = self.flags.lock();
        if flags.cancelled
            || flags.committed
            || flags.state.is_terminal()
            || flags.paused == paused
        {
            return false;
        }
        flags.paused = paused;
        match flags.state {
            JobState::Running if paused => flags.state = JobState::Paused,
            JobState::Paused if !paused => flags.state = JobState::Running,
            _ => {}
        }
        if !paused {
            self.resumed.notify_all();
        }
        true
    }

    fn cancel(&self) -> bool {
        let mut flags = self.flags.lock();
        if flags.cancelled || flags.committed || flags.state.is_terminal() {
            return false;
        }
        flags.cancelled = true;
        flags.paused = false;
        self.resumed.notify_all();
        true
    }
}

/// Cloneable remote control for a wipe job.
///
/// Every method may be called from any thread while
/// [`WipeEngine::run`](crate::WipeEngine::run) executes elsewhere.
#[derive(Clone)]
pub struct WipeHandle {
    control: Arc<JobControl>,
}

impl WipeHandle {
    pub(crate) fn new(control: Arc<JobControl>) -> Self {
        Self { control }
    }

    /// Pause the job at its next checkpoint.
    ///
    /// Returns `false` if the job was already paused, cancelled or finished.
    pub fn pause(&self) -> bool {
        let changed = self.control.set_paused(true);
        if changed {
            info!("Wipe paused");
        }
        changed
    }

    /// Resume a paused job.
    pub fn resume(&self) -> bool {
        let changed = self.control.set_paused(false);
        if changed {
            info!("Wipe resumed");
        }
        changed
    }

    /// Pause if running, resume if paused. Returns the state afterwards.
    pub fn toggle_pause(&self) -> JobState {
        if self.state() == JobState::Paused {
            self.resume();
        } else {
            self.pause();
        }
        self.state()
    }

    /// Request cancellation. Paused workers are woken so they can stop.
    ///
    /// Returns `false` once the job has started deleting its target or has
    /// finished; such a job runs to completion.
    pub fn cancel(&self) -> bool {
        let changed = self.control.cancel();
        if changed {
            info!("Wipe cancellation requested");
        } else {
            debug!("Cancel ignored; job already stopping or finished");
        }
        changed
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Current job state.
    pub fn state(&self) -> JobState {
        self.control.state()
    }
}

impl fmt::Debug for WipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WipeHandle")
            .field("state", &self.state())
            .finish()
    }
}
