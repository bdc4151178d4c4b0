#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::ClassifierBackend;
use crate::classify::labels::{label_for, load_labels};
use crate::classify::ScoreKind;
use crate::frame::{ElementType, InputSpec, NormalizedBuffer, TensorData};

use super::softmax;

/// Tract-based backend for ONNX image classifiers.
///
/// Loads a local model file with a fixed `1 x C x S x S` (or `1 x S x S x C`) input
/// and a single score vector output. No network I/O, no writes.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    spec: InputSpec,
    labels: Vec<String>,
    scores: ScoreKind,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        labels_path: Option<&Path>,
        spec: InputSpec,
        scores: ScoreKind,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let datum = match spec.element {
            ElementType::U8 => u8::datum_type(),
            ElementType::F32 { .. } => f32::datum_type(),
        };
        let shape = spec.shape();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(datum, tvec!(shape[0], shape[1], shape[2], shape[3])),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let labels = match labels_path {
            Some(path) => load_labels(path)?,
            None => Vec::new(),
        };

        Ok(Self {
            model,
            spec,
            labels,
            scores,
        })
    }

    fn build_input(&self, input: NormalizedBuffer) -> Result<Tensor> {
        let [n, a, b, c] = input.shape();
        let tensor = match input.into_data() {
            TensorData::F32(data) => {
                tract_ndarray::Array4::from_shape_vec((n, a, b, c), data)?.into_tensor()
            }
            TensorData::U8(data) => {
                tract_ndarray::Array4::from_shape_vec((n, a, b, c), data)?.into_tensor()
            }
        };
        Ok(tensor)
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<Vec<f32>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        Ok(match self.scores {
            ScoreKind::Logits => softmax(&scores),
            ScoreKind::Probabilities => scores,
        })
    }
}

impl ClassifierBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn infer(&mut self, input: NormalizedBuffer) -> Result<Vec<(String, f32)>> {
        let input = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(input.into_tvalue()))
            .context("ONNX inference failed")?;
        let scores = self.extract_scores(outputs)?;

        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(idx, p)| (label_for(&self.labels, idx), p))
            .collect())
    }
}
