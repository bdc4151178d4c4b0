//! Frame capture.
//!
//! A `CaptureDevice` produces raw frames on demand:
//! - `stub://...` synthetic devices (testing, demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! `FrameSource` drives a device on its own capture thread and hands frames to a
//! `FrameConsumer` on a separate delivery thread. At most one frame is in flight:
//! frames captured while the consumer is still busy are dropped, never queued.

mod gate;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub use synthetic::SyntheticDevice;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Device;

use crate::error::PipelineError;
use crate::frame::{Orientation, PixelFormat, RawFrame};
use crate::session::{SessionFlag, SessionState};
use crate::stats::PipelineStats;
use gate::{delivery_gate, DeliveryGate, GateInbox, Offer};

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Capture settings for a device.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Device path (e.g., "/dev/video0") or `stub://<name>`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested frame rate (0 = device default / unpaced).
    pub fps: u32,
    pub pixel_format: PixelFormat,
    /// Rotation that brings the sensor image upright.
    pub orientation: Orientation,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            pixel_format: PixelFormat::Yuyv,
            orientation: Orientation::Up,
        }
    }
}

/// A camera (or camera stand-in) that can be opened and read frame by frame.
pub trait CaptureDevice: Send {
    fn describe(&self) -> String;

    /// Acquire the device. Errors are session-fatal.
    fn open(&mut self) -> Result<(), PipelineError>;

    /// Block until the next frame. `Ok(None)` means no frame this time (timeout).
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Release the device. Called on the capture thread when the session stops.
    fn close(&mut self) {}
}

/// Open the device named by `config.device`.
pub fn open_device(config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>, PipelineError> {
    if config.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticDevice::new(config.clone())?));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Device::new(config.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(PipelineError::DeviceUnavailable(format!(
            "{}: camera capture requires the ingest-v4l2 feature",
            config.device
        )))
    }
}

/// Receives frames on the delivery thread, one at a time.
pub trait FrameConsumer: Send + 'static {
    fn on_frame(&mut self, frame: RawFrame);
}

impl<F> FrameConsumer for F
where
    F: FnMut(RawFrame) + Send + 'static,
{
    fn on_frame(&mut self, frame: RawFrame) {
        self(frame)
    }
}

struct Workers {
    capture: JoinHandle<Box<dyn CaptureDevice>>,
    delivery: JoinHandle<()>,
}

/// Drives a `CaptureDevice` and delivers frames asynchronously.
pub struct FrameSource {
    device: Option<Box<dyn CaptureDevice>>,
    description: String,
    orientation: Orientation,
    health_grace: Duration,
    session: Arc<SessionFlag>,
    stats: Arc<PipelineStats>,
    last_frame_at: Arc<Mutex<Option<Instant>>>,
    workers: Option<Workers>,
}

impl FrameSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            description: device.describe(),
            device: Some(device),
            orientation: Orientation::Up,
            health_grace: Duration::from_secs(2),
            session: Arc::new(SessionFlag::new()),
            stats: Arc::new(PipelineStats::default()),
            last_frame_at: Arc::new(Mutex::new(None)),
            workers: None,
        }
    }

    /// Build a source for `config`, applying its orientation and frame rate.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, PipelineError> {
        let source = Self::new(open_device(config)?)
            .with_orientation(config.orientation)
            .with_health_grace(health_grace_for(config.fps));
        Ok(source)
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Share counters with the rest of a pipeline.
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// How long the source may go without a frame before it is reported unhealthy.
    pub fn with_health_grace(mut self, grace: Duration) -> Self {
        self.health_grace = grace;
        self
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The session flag consumers use to check for a stop boundary.
    pub fn session(&self) -> Arc<SessionFlag> {
        self.session.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Running and producing frames within the health grace period.
    pub fn is_healthy(&self) -> bool {
        if !self.session.is_running() {
            return false;
        }
        let last = *self
            .last_frame_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() <= self.health_grace)
    }

    /// Open the device and begin delivering frames to `consumer`.
    ///
    /// Calling `start` while running is a no-op. Device errors are returned and the
    /// session stays `Stopped`.
    pub fn start<C: FrameConsumer>(&mut self, consumer: C) -> Result<(), PipelineError> {
        if self.workers.is_some() {
            if self.session.is_running() {
                log::debug!("FrameSource: {} already running", self.description);
                return Ok(());
            }
            // The previous session ended on its own; reap its threads first.
            self.stop();
        }
        let mut device = self.device.take().ok_or_else(|| {
            PipelineError::DeviceUnavailable(format!(
                "{}: device was lost by a previous session",
                self.description
            ))
        })?;
        if let Err(err) = device.open() {
            log::error!("FrameSource: failed to open {}: {}", self.description, err);
            self.device = Some(device);
            return Err(err);
        }
        self.description = device.describe();

        *self
            .last_frame_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.session.transition(SessionState::Running);

        let (gate, inbox) = delivery_gate();
        let capture = CaptureLoop {
            device,
            gate,
            session: self.session.clone(),
            stats: self.stats.clone(),
            orientation: self.orientation,
            last_frame_at: self.last_frame_at.clone(),
        };
        let capture = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || capture.run())
            .map_err(|err| {
                self.session.transition(SessionState::Stopped);
                PipelineError::InputCreationFailed(format!("spawn capture thread: {}", err))
            })?;

        let session = self.session.clone();
        let stats = self.stats.clone();
        let delivery = thread::Builder::new()
            .name("frame-delivery".to_string())
            .spawn(move || deliver(inbox, consumer, &session, &stats));
        let delivery = match delivery {
            Ok(handle) => handle,
            Err(err) => {
                self.session.transition(SessionState::Stopped);
                if let Ok(device) = capture.join() {
                    self.device = Some(device);
                }
                return Err(PipelineError::InputCreationFailed(format!(
                    "spawn delivery thread: {}",
                    err
                )));
            }
        };

        self.workers = Some(Workers { capture, delivery });
        log::info!("FrameSource: started {}", self.description);
        Ok(())
    }

    /// Stop capturing. Returns once no further frame will reach the consumer.
    ///
    /// Calling `stop` while stopped is a no-op.
    pub fn stop(&mut self) {
        self.session.transition(SessionState::Stopped);
        let Some(workers) = self.workers.take() else {
            return;
        };
        match workers.capture.join() {
            Ok(device) => self.device = Some(device),
            Err(_) => log::error!(
                "FrameSource: capture thread for {} panicked",
                self.description
            ),
        }
        if workers.delivery.join().is_err() {
            log::error!("FrameSource: frame consumer panicked");
        }
        log::info!("FrameSource: stopped {}", self.description);
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("device", &self.description)
            .field("state", &self.state())
            .field("orientation", &self.orientation)
            .finish()
    }
}

/// Six frame intervals, never less than two seconds.
pub fn health_grace_for(fps: u32) -> Duration {
    let base_ms = if fps == 0 {
        2_000
    } else {
        (1000 / fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

struct CaptureLoop {
    device: Box<dyn CaptureDevice>,
    gate: DeliveryGate,
    session: Arc<SessionFlag>,
    stats: Arc<PipelineStats>,
    orientation: Orientation,
    last_frame_at: Arc<Mutex<Option<Instant>>>,
}

impl CaptureLoop {
    fn run(mut self) -> Box<dyn CaptureDevice> {
        let mut sequence = 0u64;
        while self.session.is_running() {
            let frame = match self.device.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) => {
                    self.stats.record_capture_error();
                    log::warn!(
                        "FrameSource: capture failed on {}: {:#}",
                        self.device.describe(),
                        err
                    );
                    thread::sleep(CAPTURE_RETRY_DELAY);
                    continue;
                }
            };
            sequence += 1;
            self.stats.record_captured();
            *self
                .last_frame_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

            let frame = frame
                .with_orientation(self.orientation)
                .with_sequence(sequence);
            match self.gate.offer(frame) {
                Offer::Accepted => {}
                Offer::Dropped => {
                    self.stats.record_dropped();
                    log::trace!("FrameSource: dropped frame #{} (consumer busy)", sequence);
                }
                Offer::Closed => {
                    self.stats.record_dropped();
                    log::error!("FrameSource: frame consumer exited; stopping capture");
                    self.session.transition(SessionState::Stopped);
                }
            }
        }
        self.device.close();
        self.device
    }
}

fn deliver<C: FrameConsumer>(
    inbox: GateInbox,
    mut consumer: C,
    session: &SessionFlag,
    stats: &PipelineStats,
) {
    while let Some((frame, _in_flight)) = inbox.recv() {
        if !session.is_running() {
            stats.record_dropped();
            continue;
        }
        stats.record_delivered();
        consumer.on_frame(frame);
    }
}
