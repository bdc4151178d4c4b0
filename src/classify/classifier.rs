use std::path::Path;

use crate::error::PipelineError;
use crate::frame::{InputSpec, NormalizedBuffer};

use super::backend::ClassifierBackend;
use super::backends::StubBackend;
use super::result::ClassificationResult;
use super::ModelAsset;

/// One loaded model. Stateless per call beyond the loaded weights.
pub struct Classifier {
    backend: Box<dyn ClassifierBackend>,
    spec: InputSpec,
    asset: String,
}

impl Classifier {
    /// Resolve and load a model asset.
    ///
    /// Any failure is `ModelLoadFailed`; the pipeline must not start without a model.
    pub fn load(asset: &ModelAsset) -> Result<Self, PipelineError> {
        let location = asset.location.as_str();
        asset
            .input
            .validate()
            .map_err(|err| PipelineError::model_load(location, err))?;

        let backend: Box<dyn ClassifierBackend> =
            if let Some(path) = location.strip_prefix("stub://") {
                Box::new(
                    StubBackend::from_uri(path, asset.input)
                        .map_err(|err| PipelineError::model_load(location, err))?,
                )
            } else {
                load_model_file(asset)?
            };

        let mut classifier = Self {
            spec: asset.input,
            backend,
            asset: location.to_string(),
        };
        classifier
            .backend
            .warm_up()
            .map_err(|err| PipelineError::model_load(location, err))?;

        log::info!(
            "classifier: loaded {} ({} backend, input {}x{} {:?} {:?})",
            classifier.asset,
            classifier.backend.name(),
            classifier.spec.size,
            classifier.spec.size,
            classifier.spec.channel_order,
            classifier.spec.layout
        );
        Ok(classifier)
    }

    /// Wrap an already constructed backend.
    pub fn from_backend<B: ClassifierBackend + 'static>(backend: B) -> Self {
        let spec = backend.input_spec();
        let asset = format!("{}://in-process", backend.name());
        Self {
            backend: Box::new(backend),
            spec,
            asset,
        }
    }

    pub fn input_spec(&self) -> InputSpec {
        self.spec
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run one blocking inference. The buffer is consumed.
    pub fn classify(
        &mut self,
        buffer: NormalizedBuffer,
    ) -> Result<ClassificationResult, PipelineError> {
        if buffer.spec() != &self.spec {
            return Err(PipelineError::InferenceFailed(format!(
                "buffer spec {:?} does not match model input {:?}",
                buffer.spec(),
                self.spec
            )));
        }
        let sequence = buffer.frame_sequence();
        let scores = self
            .backend
            .infer(buffer)
            .map_err(PipelineError::inference)?;
        ClassificationResult::from_scores(scores, sequence)
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("asset", &self.asset)
            .field("backend", &self.backend.name())
            .field("spec", &self.spec)
            .finish()
    }
}

fn load_model_file(asset: &ModelAsset) -> Result<Box<dyn ClassifierBackend>, PipelineError> {
    let location = asset.location.as_str();
    let path = Path::new(location);
    if !path.is_file() {
        return Err(PipelineError::model_load(location, "model file not found"));
    }

    #[cfg(feature = "backend-tract")]
    {
        let backend = super::backends::TractBackend::new(
            path,
            asset.labels.as_deref(),
            asset.input,
            asset.scores,
        )
        .map_err(|err| PipelineError::model_load(location, err))?;
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(PipelineError::model_load(
            location,
            "ONNX models require the backend-tract feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ChannelOrder, RawFrame};
    use crate::preprocess::{FramePreprocessor, ResizePolicy};

    fn buffer(spec: InputSpec) -> NormalizedBuffer {
        FramePreprocessor::new(spec, ResizePolicy::Stretch)
            .process(&RawFrame::solid_rgb(16, 16, [250, 5, 5]).with_sequence(9))
            .expect("process")
    }

    struct NanBackend;

    impl ClassifierBackend for NanBackend {
        fn name(&self) -> &'static str {
            "nan"
        }

        fn input_spec(&self) -> InputSpec {
            InputSpec::square(4)
        }

        fn infer(&mut self, _input: NormalizedBuffer) -> anyhow::Result<Vec<(String, f32)>> {
            Ok(vec![("broken".to_string(), f32::NAN)])
        }
    }

    #[test]
    fn loads_stub_and_classifies() -> anyhow::Result<()> {
        let asset = ModelAsset::new("stub://dominant-color", InputSpec::square(8));
        let mut classifier = Classifier::load(&asset)?;
        assert_eq!(classifier.backend_name(), "stub");

        let result = classifier.classify(buffer(InputSpec::square(8)))?;
        assert_eq!(result.label(), "red");
        assert_eq!(result.frame_sequence(), 9);
        Ok(())
    }

    #[test]
    fn unknown_stub_fails_to_load() {
        let asset = ModelAsset::new("stub://resnet", InputSpec::square(8));
        assert!(matches!(
            Classifier::load(&asset),
            Err(PipelineError::ModelLoadFailed { .. })
        ));
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        let asset = ModelAsset::new("/nonexistent/mobilenet.onnx", InputSpec::square(224));
        let err = Classifier::load(&asset).expect_err("missing model");
        assert!(matches!(err, PipelineError::ModelLoadFailed { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn invalid_input_spec_fails_to_load() {
        let asset = ModelAsset::new("stub://dominant-color", InputSpec::square(0));
        assert!(Classifier::load(&asset).is_err());
    }

    #[test]
    fn mismatched_buffer_is_an_inference_failure() -> anyhow::Result<()> {
        let asset = ModelAsset::new("stub://fixed/cat", InputSpec::square(8));
        let mut classifier = Classifier::load(&asset)?;

        let wrong_order = InputSpec::square(8).with_channel_order(ChannelOrder::Bgr);
        assert!(matches!(
            classifier.classify(buffer(wrong_order)),
            Err(PipelineError::InferenceFailed(_))
        ));
        assert!(matches!(
            classifier.classify(buffer(InputSpec::square(4))),
            Err(PipelineError::InferenceFailed(_))
        ));
        Ok(())
    }

    #[test]
    fn invalid_backend_output_is_an_inference_failure() {
        let mut classifier = Classifier::from_backend(NanBackend);
        assert!(matches!(
            classifier.classify(buffer(InputSpec::square(4))),
            Err(PipelineError::InferenceFailed(_))
        ));
    }
}
