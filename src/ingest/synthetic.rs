//! Synthetic capture device for `stub://` locations.
//!
//! - `stub://<name>`: moving gradient whose scene shifts every 50 frames
//! - `stub://solid/<r>,<g>,<b>`: solid color, e.g. a calibration card
//! - `stub://noise`: uniform sensor noise
//! - `stub://unavailable`, `stub://busy`: fail to open like a missing or busy camera
//!
//! Frames are RGB24 and paced at the configured rate (0 = as fast as possible).

use anyhow::Result;
use rand::RngCore;
use std::time::{Duration, Instant};

use super::{CaptureConfig, CaptureDevice};
use crate::error::PipelineError;
use crate::frame::{PixelFormat, RawFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pattern {
    Gradient,
    Solid([u8; 3]),
    Noise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimulatedFailure {
    Unavailable,
    Busy,
}

pub struct SyntheticDevice {
    config: CaptureConfig,
    pattern: Pattern,
    failure: Option<SimulatedFailure>,
    frame_len: usize,
    frame_count: u64,
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticDevice {
    pub fn new(config: CaptureConfig) -> Result<Self, PipelineError> {
        let path = config
            .device
            .strip_prefix("stub://")
            .unwrap_or(config.device.as_str());
        let (pattern, failure) = match path.split_once('/') {
            Some(("solid", rgb)) => (Pattern::Solid(parse_rgb(rgb)?), None),
            _ => match path {
                "noise" => (Pattern::Noise, None),
                "unavailable" => (Pattern::Gradient, Some(SimulatedFailure::Unavailable)),
                "busy" => (Pattern::Gradient, Some(SimulatedFailure::Busy)),
                _ => (Pattern::Gradient, None),
            },
        };
        let frame_len = (config.width as usize)
            .checked_mul(config.height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
            .ok_or_else(|| {
                PipelineError::InputCreationFailed(format!(
                    "{}: {}x{} frame is too large",
                    config.device, config.width, config.height
                ))
            })?;
        if config.pixel_format != PixelFormat::Rgb24 {
            log::debug!(
                "SyntheticDevice: {} delivers RGB24, ignoring requested {:?}",
                config.device,
                config.pixel_format
            );
        }
        Ok(Self {
            config,
            pattern,
            failure,
            frame_len,
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        })
    }

    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_secs(1) / self.config.fps;
        let now = Instant::now();
        match self.next_due {
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                self.next_due = Some(due + interval);
            }
            _ => self.next_due = Some(now + interval),
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let len = self.frame_len;
        match self.pattern {
            Pattern::Solid(rgb) => rgb.iter().copied().cycle().take(len).collect(),
            Pattern::Noise => {
                let mut pixels = vec![0u8; len];
                rand::thread_rng().fill_bytes(&mut pixels);
                pixels
            }
            Pattern::Gradient => {
                if self.frame_count % 50 == 0 {
                    self.scene_state = self.scene_state.wrapping_add(1);
                }
                let shift = self.frame_count + self.scene_state as u64 * 40;
                (0..len)
                    .map(|i| ((i as u64 / 3 + shift) % 256) as u8)
                    .collect()
            }
        }
    }
}

impl CaptureDevice for SyntheticDevice {
    fn describe(&self) -> String {
        format!(
            "{} ({}x{} @ {} fps, synthetic)",
            self.config.device, self.config.width, self.config.height, self.config.fps
        )
    }

    fn open(&mut self) -> Result<(), PipelineError> {
        match self.failure {
            Some(SimulatedFailure::Unavailable) => Err(PipelineError::DeviceUnavailable(format!(
                "{}: no camera present",
                self.config.device
            ))),
            Some(SimulatedFailure::Busy) => Err(PipelineError::InputCreationFailed(format!(
                "{}: device in use",
                self.config.device
            ))),
            None => {
                self.next_due = None;
                log::info!("SyntheticDevice: connected to {}", self.config.device);
                Ok(())
            }
        }
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(RawFrame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb24,
        )))
    }
}

fn parse_rgb(value: &str) -> Result<[u8; 3], PipelineError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let invalid = || {
        PipelineError::DeviceUnavailable(format!(
            "invalid synthetic color '{}', expected r,g,b",
            value
        ))
    };
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| invalid())?;
    }
    Ok(rgb)
}
