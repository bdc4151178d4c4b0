//! Latest-wins hand-off of classification results to the presentation layer.
//!
//! `ResultSink::publish` never waits on the reader: it overwrites a single slot and
//! wakes any waiting `ResultReceiver`. A reader that falls behind skips straight to
//! the newest result; results it never saw are counted as coalesced.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::classify::ClassificationResult;

#[derive(Debug, Default)]
struct Slot {
    latest: Option<ClassificationResult>,
    /// Number of results published so far; the latest has this sequence.
    sequence: u64,
    coalesced: u64,
    /// Highest sequence any receiver has consumed through `try_recv`/`recv_timeout`.
    consumed: u64,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    updated: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half, held by the processing thread.
#[derive(Clone, Debug)]
pub struct ResultSink {
    shared: Arc<Shared>,
}

/// Consumer half, held by the presentation layer.
#[derive(Clone, Debug)]
pub struct ResultReceiver {
    shared: Arc<Shared>,
    seen: u64,
}

/// Create a connected sink/receiver pair.
pub fn result_channel() -> (ResultSink, ResultReceiver) {
    let shared = Arc::new(Shared::default());
    (
        ResultSink {
            shared: shared.clone(),
        },
        ResultReceiver { shared, seen: 0 },
    )
}

impl ResultSink {
    /// Replace the current result. Returns the publish sequence number.
    pub fn publish(&self, result: ClassificationResult) -> u64 {
        let mut slot = self.shared.lock();
        if slot.latest.is_some() && slot.consumed < slot.sequence {
            slot.coalesced += 1;
        }
        slot.sequence += 1;
        slot.latest = Some(result);
        let sequence = slot.sequence;
        drop(slot);
        self.shared.updated.notify_all();
        sequence
    }

    /// A new receiver sharing this sink; it starts with nothing seen.
    pub fn subscribe(&self) -> ResultReceiver {
        ResultReceiver {
            shared: self.shared.clone(),
            seen: 0,
        }
    }

    /// Results replaced before any receiver consumed them.
    pub fn coalesced(&self) -> u64 {
        self.shared.lock().coalesced
    }
}

impl ResultReceiver {
    /// The current result, whether or not it was seen before.
    pub fn latest(&self) -> Option<ClassificationResult> {
        self.shared.lock().latest.clone()
    }

    /// The current result if it is newer than the last one this receiver returned.
    pub fn try_recv(&mut self) -> Option<ClassificationResult> {
        let shared = Arc::clone(&self.shared);
        let mut slot = shared.lock();
        self.take_newer(&mut slot)
    }

    /// Wait up to `timeout` for a result newer than the last one returned.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ClassificationResult> {
        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.shared);
        let mut slot = shared.lock();
        loop {
            if let Some(result) = self.take_newer(&mut slot) {
                return Some(result);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = shared
                .updated
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Publish sequence of the last result this receiver returned.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    fn take_newer(&mut self, slot: &mut Slot) -> Option<ClassificationResult> {
        if slot.sequence <= self.seen {
            return None;
        }
        let result = slot.latest.clone()?;
        self.seen = slot.sequence;
        slot.consumed = slot.consumed.max(slot.sequence);
        Some(result)
    }
}
