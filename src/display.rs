use crate::classify::ClassificationResult;
use crate::sink::ResultReceiver;

pub const PLACEHOLDER_LABEL: &str = "Looking for objects...";

/// Presentation-side view of the pipeline: the last good label as text.
///
/// The label only changes when a new result arrives, so skipped frames never make
/// it flicker.
#[derive(Debug)]
pub struct LabelDisplay {
    receiver: ResultReceiver,
    text: String,
    current: Option<ClassificationResult>,
    diagnostics_top_k: usize,
}

impl LabelDisplay {
    pub fn new(receiver: ResultReceiver) -> Self {
        Self {
            receiver,
            text: PLACEHOLDER_LABEL.to_string(),
            current: None,
            diagnostics_top_k: 3,
        }
    }

    /// Number of `label = probability` lines logged per update (0 disables).
    pub fn with_diagnostics(mut self, top_k: usize) -> Self {
        self.diagnostics_top_k = top_k;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current(&self) -> Option<&ClassificationResult> {
        self.current.as_ref()
    }

    /// Pull the newest result if there is one. Returns true when the text changed.
    pub fn refresh(&mut self) -> bool {
        match self.receiver.try_recv() {
            Some(result) => self.apply(result),
            None => false,
        }
    }

    /// Like `refresh`, waiting up to `timeout` for a new result.
    pub fn refresh_timeout(&mut self, timeout: std::time::Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Some(result) => self.apply(result),
            None => false,
        }
    }

    fn apply(&mut self, result: ClassificationResult) -> bool {
        for line in result.diagnostic_lines(self.diagnostics_top_k) {
            log::debug!("frame #{}: {}", result.frame_sequence(), line);
        }
        let changed = self.text != result.label();
        if changed {
            self.text = result.label().to_string();
        }
        self.current = Some(result);
        changed
    }
}
