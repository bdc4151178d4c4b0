use anyhow::{anyhow, Result};

use crate::classify::backend::ClassifierBackend;
use crate::frame::{InputSpec, NormalizedBuffer};

use super::softmax;

/// Sharpness of the dominant-color softmax.
const COLOR_TEMPERATURE: f32 = 8.0;

/// Deterministic built-in backend for calibration, demos and tests.
///
/// - `stub://dominant-color`: scores `red`, `green` and `blue` from the mean color.
/// - `stub://fixed/<label>`: always answers `<label>` with probability 1.
pub struct StubBackend {
    mode: StubMode,
    spec: InputSpec,
}

enum StubMode {
    DominantColor,
    Fixed(Vec<(String, f32)>),
}

impl StubBackend {
    pub fn dominant_color(spec: InputSpec) -> Self {
        Self {
            mode: StubMode::DominantColor,
            spec,
        }
    }

    /// Always return `scores`, whatever the input.
    pub fn fixed<L: Into<String>>(
        spec: InputSpec,
        scores: impl IntoIterator<Item = (L, f32)>,
    ) -> Self {
        Self {
            mode: StubMode::Fixed(scores.into_iter().map(|(l, p)| (l.into(), p)).collect()),
            spec,
        }
    }

    /// Resolve the part of a `stub://` asset location after the scheme.
    pub(crate) fn from_uri(path: &str, spec: InputSpec) -> Result<Self> {
        match path.split_once('/') {
            None if path == "dominant-color" => Ok(Self::dominant_color(spec)),
            Some(("fixed", label)) if !label.trim().is_empty() => {
                Ok(Self::fixed(spec, [(label.trim(), 1.0)]))
            }
            _ => Err(anyhow!("unknown stub model 'stub://{}'", path)),
        }
    }
}

impl ClassifierBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn infer(&mut self, input: NormalizedBuffer) -> Result<Vec<(String, f32)>> {
        match &self.mode {
            StubMode::Fixed(scores) => Ok(scores.clone()),
            StubMode::DominantColor => {
                let mean = input.mean_rgb();
                let logits: Vec<f32> = mean.iter().map(|v| v * COLOR_TEMPERATURE).collect();
                let probs = softmax(&logits);
                Ok(["red", "green", "blue"]
                    .into_iter()
                    .map(String::from)
                    .zip(probs)
                    .collect())
            }
        }
    }
}
