//! V4L2 user controls.
//!
//! V4L2 has no portable region-of-interest control, so a focus point selects
//! continuous auto-focus and aperture-priority auto-exposure for the whole frame.
//! UVC cameras expose no flash; only `FlashMode::Off` is accepted.

use anyhow::{Context, Result};
use v4l::control::{Control, Value};

use super::{DeviceControl, FlashMode, FocusPoint};

const V4L2_CID_FOCUS_AUTO: u32 = 0x009a_090c;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;

pub struct V4l2Controls {
    path: String,
    device: Option<v4l::Device>,
}

impl V4l2Controls {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device: None,
        }
    }

    fn set(&mut self, id: u32, value: Value) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .context("configuration not locked")?;
        device
            .set_control(Control { id, value })
            .with_context(|| format!("set control {:#x} on {}", id, self.path))
    }
}

impl DeviceControl for V4l2Controls {
    fn describe(&self) -> String {
        format!("{} (v4l2 controls)", self.path)
    }

    fn lock_for_configuration(&mut self) -> Result<()> {
        let device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", self.path))?;
        self.device = Some(device);
        Ok(())
    }

    fn unlock_configuration(&mut self) {
        self.device = None;
    }

    fn apply_focus(&mut self, point: FocusPoint) -> Result<()> {
        log::debug!(
            "V4l2Controls: {} has no focus region; using continuous auto-focus for ({:.2}, {:.2})",
            self.path,
            point.x(),
            point.y()
        );
        self.set(V4L2_CID_FOCUS_AUTO, Value::Boolean(true))
    }

    fn apply_exposure(&mut self, _point: FocusPoint) -> Result<()> {
        self.set(
            V4L2_CID_EXPOSURE_AUTO,
            Value::Integer(V4L2_EXPOSURE_APERTURE_PRIORITY),
        )
    }

    fn supports_flash(&self, mode: FlashMode) -> bool {
        mode == FlashMode::Off
    }

    fn set_flash(&mut self, _mode: FlashMode) -> Result<()> {
        Ok(())
    }
}
