//! Pipeline error taxonomy.
//!
//! Every failure the pipeline can surface maps onto one `PipelineError` kind, and
//! every kind carries a fixed handling policy (`Severity`). Component internals use
//! `anyhow` for context; errors are converted into this enum at component
//! boundaries so callers can match on the kind.

use thiserror::Error;

/// How a failure is handled by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Halts the capture session. Surfaced to the caller of `start()`; not retried.
    SessionFatal,
    /// The pipeline cannot run at all (no model). Surfaced to `start()`/`load()`.
    PipelineFatal,
    /// Absorbed at the frame boundary. The frame is dropped, the last result stays.
    FrameSkip,
    /// Reported to the caller and logged; the operation is a no-op.
    Reported,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),

    #[error("failed to bind capture input: {0}")]
    InputCreationFailed(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("failed to allocate normalized buffer: {0}")]
    BufferAllocationFailed(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("failed to load model {asset}: {reason}")]
    ModelLoadFailed { asset: String, reason: String },

    #[error("unsupported device operation: {0}")]
    UnsupportedOperation(String),
}

impl PipelineError {
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::DeviceUnavailable(_) | PipelineError::InputCreationFailed(_) => {
                Severity::SessionFatal
            }
            PipelineError::ModelLoadFailed { .. } => Severity::PipelineFatal,
            PipelineError::MalformedFrame(_)
            | PipelineError::BufferAllocationFailed(_)
            | PipelineError::InferenceFailed(_) => Severity::FrameSkip,
            PipelineError::UnsupportedOperation(_) => Severity::Reported,
        }
    }

    /// True when the pipeline must halt instead of running degraded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.severity(),
            Severity::SessionFatal | Severity::PipelineFatal
        )
    }

    pub(crate) fn model_load(asset: &str, err: impl std::fmt::Display) -> Self {
        PipelineError::ModelLoadFailed {
            asset: asset.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn inference(err: impl std::fmt::Display) -> Self {
        PipelineError::InferenceFailed(format!("{err:#}"))
    }
}
