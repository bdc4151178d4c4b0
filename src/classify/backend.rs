use anyhow::Result;

use crate::frame::{InputSpec, NormalizedBuffer};

/// Inference backend wrapped by a `Classifier`.
///
/// The backend is opaque to the pipeline: a buffer matching `input_spec()` goes in,
/// a list of `(label, probability)` pairs comes out. The `Classifier` validates the
/// output and picks the top label.
pub trait ClassifierBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// The exact input shape and layout this model expects.
    fn input_spec(&self) -> InputSpec;

    /// Run inference on one buffer. The buffer is consumed.
    ///
    /// Implementations must not retain the buffer or touch shared mutable state.
    fn infer(&mut self, input: NormalizedBuffer) -> Result<Vec<(String, f32)>>;

    /// Optional warm-up hook, run once at load time.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
