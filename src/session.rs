//! Capture session state shared by the capture, delivery and caller threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Process-wide `{Stopped, Running}` flag.
///
/// Reads are a single atomic load. Transitions and result publication both take the
/// boundary lock, so a publication either completes before a transition to
/// `Stopped` or observes `Stopped` and is skipped.
#[derive(Debug)]
pub struct SessionFlag {
    running: AtomicBool,
    boundary: Mutex<()>,
}

impl SessionFlag {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            boundary: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.is_running() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Move to `to`. Returns false when already in that state.
    pub(crate) fn transition(&self, to: SessionState) -> bool {
        let _boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        let target = to == SessionState::Running;
        self.running.swap(target, Ordering::AcqRel) != target
    }

    /// Run `f` only while the session is running, holding off concurrent transitions.
    pub fn run_if_running<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let _boundary = self.boundary.lock().unwrap_or_else(PoisonError::into_inner);
        if self.running.load(Ordering::Acquire) {
            Some(f())
        } else {
            None
        }
    }
}

impl Default for SessionFlag {
    fn default() -> Self {
        Self::new()
    }
}
