//! The classification pipeline: capture, preprocess, classify, publish.
//!
//! ```text
//! capture thread ──offer──▶ delivery thread ──▶ FramePreprocessor ──▶ Classifier
//!                 (drop if busy)                                          │
//!                                       ResultSink ◀── publish if Running ┘
//! ```
//!
//! One frame is processed at a time on the delivery thread. Per-frame failures are
//! absorbed here; startup failures are returned from `start()`.

use std::sync::{Arc, Mutex, PoisonError};

use crate::classify::{ClassificationResult, Classifier, ModelAsset};
use crate::config::ClassifierdConfig;
use crate::error::PipelineError;
use crate::frame::RawFrame;
use crate::ingest::{FrameConsumer, FrameSource};
use crate::preprocess::{FramePreprocessor, ResizePolicy};
use crate::session::{SessionFlag, SessionState};
use crate::sink::{result_channel, ResultReceiver, ResultSink};
use crate::stats::{PipelineStats, StatsSnapshot};

/// What happened to one delivered frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A result was published with this sink sequence number.
    Published(u64),
    /// Inference finished after the session stopped; the result was dropped.
    Discarded,
    /// Preprocessing or inference failed; the previous result stands.
    Skipped(PipelineError),
}

/// Runs preprocess → classify → publish for each delivered frame.
pub struct FrameProcessor {
    preprocessor: FramePreprocessor,
    classifier: Arc<Mutex<Classifier>>,
    sink: ResultSink,
    session: Arc<SessionFlag>,
    stats: Arc<PipelineStats>,
}

impl FrameProcessor {
    pub(crate) fn new(
        preprocessor: FramePreprocessor,
        classifier: Arc<Mutex<Classifier>>,
        sink: ResultSink,
        session: Arc<SessionFlag>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            sink,
            session,
            stats,
        }
    }

    pub fn process(&mut self, frame: RawFrame) -> FrameOutcome {
        let sequence = frame.sequence;
        let buffer = match self.preprocessor.process(&frame) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.stats.record_skipped();
                log::warn!("skipping frame #{}: {}", sequence, err);
                return FrameOutcome::Skipped(err);
            }
        };
        drop(frame);
        self.stats.record_buffer_built();

        let result = self
            .classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .classify(buffer);
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                self.stats.record_inference_failure();
                log::warn!("frame #{}: {}; keeping previous result", sequence, err);
                return FrameOutcome::Skipped(err);
            }
        };

        let sink = &self.sink;
        match self.session.run_if_running(|| sink.publish(result)) {
            Some(published) => {
                self.stats.record_published();
                FrameOutcome::Published(published)
            }
            None => {
                self.stats.record_discarded();
                log::debug!("frame #{}: session stopped, result discarded", sequence);
                FrameOutcome::Discarded
            }
        }
    }
}

impl FrameConsumer for FrameProcessor {
    fn on_frame(&mut self, frame: RawFrame) {
        self.process(frame);
    }
}

/// A capture source wired to a classifier and a latest-wins result sink.
pub struct Pipeline {
    source: FrameSource,
    policy: ResizePolicy,
    model: ModelAsset,
    classifier: Option<Arc<Mutex<Classifier>>>,
    sink: ResultSink,
    receiver: ResultReceiver,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(source: FrameSource, model: ModelAsset) -> Self {
        let stats = Arc::new(PipelineStats::default());
        let (sink, receiver) = result_channel();
        Self {
            source: source.with_stats(stats.clone()),
            policy: ResizePolicy::default(),
            model,
            classifier: None,
            sink,
            receiver,
            stats,
        }
    }

    pub fn from_config(config: &ClassifierdConfig) -> Result<Self, PipelineError> {
        let source = FrameSource::from_config(&config.capture)?;
        Ok(Self::new(source, config.model.clone()).with_resize_policy(config.resize_policy))
    }

    pub fn with_resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use an already loaded classifier instead of loading the model asset.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(Arc::new(Mutex::new(classifier)));
        self
    }

    /// Load the model if it is not loaded yet.
    pub fn load_model(&mut self) -> Result<(), PipelineError> {
        if self.classifier.is_none() {
            let classifier = Classifier::load(&self.model)?;
            self.classifier = Some(Arc::new(Mutex::new(classifier)));
        }
        Ok(())
    }

    /// Load the model (once) and start capture. A no-op while running.
    ///
    /// Model and device failures are returned and the pipeline stays `Stopped`.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state() == SessionState::Running {
            return Ok(());
        }
        if let Err(err) = self.load_model() {
            log::error!("pipeline: {}", err);
            return Err(err);
        }
        let Some(classifier) = self.classifier.clone() else {
            return Err(PipelineError::model_load(
                &self.model.location,
                "classifier missing after load",
            ));
        };
        let spec = classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .input_spec();
        let processor = FrameProcessor::new(
            FramePreprocessor::new(spec, self.policy),
            classifier,
            self.sink.clone(),
            self.source.session(),
            self.stats.clone(),
        );
        self.source.start(processor)?;
        log::info!(
            "pipeline: started ({} -> {}x{} {:?})",
            self.source.describe(),
            spec.size,
            spec.size,
            self.policy
        );
        Ok(())
    }

    /// Stop capture. After this returns no result is published until the next start.
    pub fn stop(&mut self) {
        if self.state() == SessionState::Running {
            log::info!("pipeline: stopping");
        }
        self.source.stop();
    }

    pub fn state(&self) -> SessionState {
        self.source.state()
    }

    /// The capture session flag; observers may watch it from any thread.
    pub fn session(&self) -> Arc<SessionFlag> {
        self.source.session()
    }

    pub fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    /// A new receiver for published results.
    pub fn subscribe(&self) -> ResultReceiver {
        self.sink.subscribe()
    }

    /// The most recent published result.
    pub fn latest(&self) -> Option<ClassificationResult> {
        self.receiver.latest()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            results_coalesced: self.sink.coalesced(),
            ..self.stats.snapshot()
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source)
            .field("model", &self.model.location)
            .field("policy", &self.policy)
            .field("loaded", &self.classifier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierBackend, StubBackend};
    use crate::frame::{InputSpec, NormalizedBuffer, PixelFormat};
    use anyhow::{bail, Result};

    struct FailOnSecond {
        calls: usize,
    }

    impl ClassifierBackend for FailOnSecond {
        fn name(&self) -> &'static str {
            "fail-on-second"
        }

        fn input_spec(&self) -> InputSpec {
            InputSpec::square(8)
        }

        fn infer(&mut self, _input: NormalizedBuffer) -> Result<Vec<(String, f32)>> {
            self.calls += 1;
            if self.calls == 2 {
                bail!("accelerator reset");
            }
            Ok(vec![
                (format!("call-{}", self.calls), 0.9),
                ("other".to_string(), 0.1),
            ])
        }
    }

    fn processor(backend: impl ClassifierBackend + 'static) -> (FrameProcessor, ResultReceiver) {
        let classifier = Classifier::from_backend(backend);
        let spec = classifier.input_spec();
        let (sink, receiver) = result_channel();
        let session = Arc::new(SessionFlag::new());
        session.transition(SessionState::Running);
        let processor = FrameProcessor::new(
            FramePreprocessor::new(spec, ResizePolicy::Stretch),
            Arc::new(Mutex::new(classifier)),
            sink,
            session,
            Arc::new(PipelineStats::default()),
        );
        (processor, receiver)
    }

    fn frame(sequence: u64) -> RawFrame {
        RawFrame::solid_rgb(16, 12, [200, 10, 10]).with_sequence(sequence)
    }

    #[test]
    fn inference_failure_keeps_previous_result() {
        let (mut processor, receiver) = processor(FailOnSecond { calls: 0 });

        assert!(matches!(processor.process(frame(1)), FrameOutcome::Published(1)));
        let outcome = processor.process(frame(2));
        assert!(matches!(
            outcome,
            FrameOutcome::Skipped(PipelineError::InferenceFailed(_))
        ));

        let latest = receiver.latest().expect("first result retained");
        assert_eq!(latest.label(), "call-1");
        assert_eq!(latest.frame_sequence(), 1);

        let snap = processor.stats.snapshot();
        assert_eq!(snap.inference_failures, 1);
        assert_eq!(snap.results_published, 1);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let (mut processor, receiver) =
            processor(StubBackend::dominant_color(InputSpec::square(8)));
        let bad = RawFrame::new(vec![0; 5], 4, 4, PixelFormat::Rgb24);

        let outcome = processor.process(bad);
        assert!(matches!(
            outcome,
            FrameOutcome::Skipped(PipelineError::MalformedFrame(_))
        ));
        assert!(receiver.latest().is_none());
        assert_eq!(processor.stats.snapshot().frames_skipped, 1);
    }

    #[test]
    fn results_are_discarded_once_stopped() {
        let (mut processor, receiver) =
            processor(StubBackend::dominant_color(InputSpec::square(8)));
        processor.session.transition(SessionState::Stopped);

        assert!(matches!(processor.process(frame(1)), FrameOutcome::Discarded));
        assert!(receiver.latest().is_none());
        assert_eq!(processor.stats.snapshot().results_discarded, 1);
    }

    #[test]
    fn missing_model_keeps_pipeline_stopped() {
        let source = FrameSource::from_config(&crate::ingest::CaptureConfig {
            device: "stub://camera".to_string(),
            ..Default::default()
        })
        .expect("source");
        let model = ModelAsset::new("/nonexistent/model.onnx", InputSpec::default());
        let mut pipeline = Pipeline::new(source, model);

        let err = pipeline.start().expect_err("model missing");
        assert!(matches!(err, PipelineError::ModelLoadFailed { .. }));
        assert_eq!(pipeline.state(), SessionState::Stopped);
        assert_eq!(pipeline.stats().frames_captured, 0);
    }
}
