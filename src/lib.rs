//! Live camera classifier.
//!
//! Captures frames from a camera, normalizes each one into the fixed input a model
//! expects, classifies it, and hands the newest result to a presentation layer.
//!
//! # Architecture
//!
//! The pipeline keeps four properties by construction:
//!
//! 1. **One frame in flight**: frames that arrive while a frame is being processed
//!    are dropped, never queued.
//! 2. **Fixed model input**: every `NormalizedBuffer` has the model's shape, channel
//!    order and element type, whatever the camera delivers.
//! 3. **Latest wins**: readers always see the newest result; slow readers skip.
//! 4. **Clean stop**: after `stop()` returns nothing is delivered or published.
//!
//! # Module Structure
//!
//! - `ingest`: capture devices and the asynchronous `FrameSource`
//! - `preprocess`: pixel decoding, orientation, resize and tensor packing
//! - `classify`: model loading and inference backends
//! - `sink` / `display`: latest-wins result hand-off and label presentation
//! - `device`: focus, exposure and flash controls
//! - `pipeline`: wiring and per-frame error handling

pub mod classify;
pub mod config;
pub mod device;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod session;
pub mod sink;
pub mod stats;

pub use classify::{
    ClassificationResult, Classifier, ClassifierBackend, ModelAsset, ScoreKind, StubBackend,
};
pub use config::ClassifierdConfig;
pub use device::{ControlOutcome, DeviceControl, DeviceController, FlashMode, FocusPoint};
pub use display::{LabelDisplay, PLACEHOLDER_LABEL};
pub use error::{PipelineError, Severity};
pub use frame::{
    ChannelOrder, ElementType, InputSpec, NormalizedBuffer, Orientation, PixelFormat, RawFrame,
    TensorData, TensorLayout,
};
pub use ingest::{CaptureConfig, CaptureDevice, FrameConsumer, FrameSource};
pub use pipeline::{FrameOutcome, FrameProcessor, Pipeline};
pub use preprocess::{FramePreprocessor, ResizePolicy};
pub use session::{SessionFlag, SessionState};
pub use sink::{result_channel, ResultReceiver, ResultSink};
pub use stats::{PipelineStats, StatsSnapshot};
