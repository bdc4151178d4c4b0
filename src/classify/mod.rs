//! Classifier wrapper and inference backends.
//!
//! A `Classifier` owns exactly one loaded model (a `ClassifierBackend`) and exposes
//! one blocking call: `NormalizedBuffer` in, `ClassificationResult` out.

mod backend;
mod backends;
mod classifier;
mod labels;
mod result;

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub use backend::ClassifierBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classifier::Classifier;
pub use labels::{label_for, load_labels};
pub use result::ClassificationResult;

use crate::frame::InputSpec;

/// What the model's output vector holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScoreKind {
    #[default]
    Probabilities,
    /// Raw logits; converted with softmax.
    Logits,
}

impl FromStr for ScoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "probabilities" | "softmax" => Ok(ScoreKind::Probabilities),
            "logits" => Ok(ScoreKind::Logits),
            other => Err(anyhow!("unknown score kind '{}'", other)),
        }
    }
}

/// A model to load, by name or path.
///
/// `location` is either `stub://dominant-color`, `stub://fixed/<label>`, or a
/// filesystem path to an ONNX model (feature `backend-tract`).
#[derive(Clone, Debug, PartialEq)]
pub struct ModelAsset {
    pub location: String,
    pub labels: Option<PathBuf>,
    pub input: InputSpec,
    pub scores: ScoreKind,
}

impl ModelAsset {
    pub fn new(location: impl Into<String>, input: InputSpec) -> Self {
        Self {
            location: location.into(),
            labels: None,
            input,
            scores: ScoreKind::default(),
        }
    }

    pub fn with_labels(mut self, labels: impl Into<PathBuf>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    pub fn with_scores(mut self, scores: ScoreKind) -> Self {
        self.scores = scores;
        self
    }
}

impl Default for ModelAsset {
    fn default() -> Self {
        Self::new("stub://dominant-color", InputSpec::default())
    }
}
