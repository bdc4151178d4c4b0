//! Camera controls: focus, exposure and flash.
//!
//! `DeviceController` is a thin pass-through over a `DeviceControl` backend. It has
//! no coupling to the capture session; failures are reported, never escalated.

mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use std::str::FromStr;

pub use synthetic::{ControlRecord, SyntheticControls};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Controls;

use crate::error::PipelineError;

/// A point of interest in normalized image coordinates, `[0,1]²`, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FocusPoint {
    x: f32,
    y: f32,
}

impl FocusPoint {
    /// Out-of-range coordinates are clamped; NaN becomes the center.
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn center() -> Self {
        Self::new(0.5, 0.5)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

impl Default for FocusPoint {
    fn default() -> Self {
        Self::center()
    }
}

impl FromStr for FocusPoint {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (x, y) = value
            .split_once(',')
            .ok_or_else(|| anyhow!("focus point must be 'x,y', got '{}'", value))?;
        let x: f32 = x.trim().parse()?;
        let y: f32 = y.trim().parse()?;
        Ok(Self::new(x, y))
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

impl FromStr for FlashMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "auto" => Ok(FlashMode::Auto),
            other => Err(anyhow!("unknown flash mode '{}'", other)),
        }
    }
}

/// Result of a best-effort control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    Skipped(String),
}

impl ControlOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ControlOutcome::Applied)
    }
}

/// Backend for a device's control surface.
pub trait DeviceControl: Send {
    fn describe(&self) -> String;

    /// Acquire exclusive configuration access.
    fn lock_for_configuration(&mut self) -> Result<()>;

    fn unlock_configuration(&mut self);

    /// Continuous auto-focus around `point`.
    fn apply_focus(&mut self, point: FocusPoint) -> Result<()>;

    /// Continuous auto-exposure metered around `point`.
    fn apply_exposure(&mut self, point: FocusPoint) -> Result<()>;

    fn supports_flash(&self, mode: FlashMode) -> bool;

    fn set_flash(&mut self, mode: FlashMode) -> Result<()>;
}

pub struct DeviceController {
    controls: Box<dyn DeviceControl>,
}

impl DeviceController {
    pub fn new(controls: Box<dyn DeviceControl>) -> Self {
        Self { controls }
    }

    /// Build a controller for a capture device path, if it has a control surface.
    pub fn for_device(device: &str) -> Option<Self> {
        if let Some(path) = device.strip_prefix("stub://") {
            return Some(Self::new(Box::new(SyntheticControls::new(path != "noflash"))));
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Some(Self::new(Box::new(V4l2Controls::new(device))))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            None
        }
    }

    pub fn describe(&self) -> String {
        self.controls.describe()
    }

    /// Point focus and exposure at `point`. Never fails; a skipped request is logged.
    pub fn apply_focus_and_exposure(&mut self, point: FocusPoint) -> ControlOutcome {
        if let Err(err) = self.controls.lock_for_configuration() {
            log::warn!(
                "DeviceController: configuration of {} unavailable: {:#}",
                self.controls.describe(),
                err
            );
            return ControlOutcome::Skipped(format!("configuration lock: {:#}", err));
        }
        let result = self
            .controls
            .apply_focus(point)
            .and_then(|()| self.controls.apply_exposure(point));
        self.controls.unlock_configuration();

        match result {
            Ok(()) => {
                log::info!(
                    "DeviceController: focus/exposure at ({:.2}, {:.2}) on {}",
                    point.x(),
                    point.y(),
                    self.controls.describe()
                );
                ControlOutcome::Applied
            }
            Err(err) => {
                log::warn!(
                    "DeviceController: focus/exposure not applied on {}: {:#}",
                    self.controls.describe(),
                    err
                );
                ControlOutcome::Skipped(format!("{:#}", err))
            }
        }
    }

    /// Switch the flash. Unsupported modes are reported and leave the device as is.
    pub fn set_flash_mode(&mut self, mode: FlashMode) -> Result<(), PipelineError> {
        if !self.controls.supports_flash(mode) {
            let err = PipelineError::UnsupportedOperation(format!(
                "flash mode {:?} on {}",
                mode,
                self.controls.describe()
            ));
            log::warn!("DeviceController: {}", err);
            return Err(err);
        }
        let unsupported = |err: anyhow::Error| {
            PipelineError::UnsupportedOperation(format!("flash mode {:?}: {:#}", mode, err))
        };
        self.controls.lock_for_configuration().map_err(unsupported)?;
        let result = self.controls.set_flash(mode).map_err(unsupported);
        self.controls.unlock_configuration();
        if let Err(err) = &result {
            log::warn!("DeviceController: {}", err);
        }
        result
    }
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("controls", &self.controls.describe())
            .finish()
    }
}
