use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the capture thread, the delivery thread and observers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    capture_errors: AtomicU64,
    buffers_built: AtomicU64,
    frames_skipped: AtomicU64,
    inference_failures: AtomicU64,
    results_published: AtomicU64,
    results_discarded: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_delivered: u64,
    /// Frames offered while a previous frame was still in flight, or that reached
    /// the delivery side after the session stopped.
    pub frames_dropped: u64,
    pub capture_errors: u64,
    pub buffers_built: u64,
    /// Frames rejected by preprocessing (malformed or allocation failure).
    pub frames_skipped: u64,
    pub inference_failures: u64,
    pub results_published: u64,
    /// Results finished after the session stopped.
    pub results_discarded: u64,
    /// Results replaced before a reader consumed them. Filled in by `Pipeline::stats`.
    pub results_coalesced: u64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl PipelineStats {
    counter! {
        record_captured => frames_captured,
        record_delivered => frames_delivered,
        record_dropped => frames_dropped,
        record_capture_error => capture_errors,
        record_buffer_built => buffers_built,
        record_skipped => frames_skipped,
        record_inference_failure => inference_failures,
        record_published => results_published,
        record_discarded => results_discarded,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            buffers_built: self.buffers_built.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            results_published: self.results_published.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
            results_coalesced: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = PipelineStats::default();
        stats.record_captured();
        stats.record_captured();
        stats.record_dropped();
        stats.record_published();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.results_published, 1);
        assert_eq!(snap.inference_failures, 0);
    }
}
