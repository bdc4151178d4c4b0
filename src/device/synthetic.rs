use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DeviceControl, FlashMode, FocusPoint};

/// Settings applied to a `SyntheticControls` device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlRecord {
    pub focus: Option<FocusPoint>,
    pub exposure: Option<FocusPoint>,
    pub flash: FlashMode,
    pub locked: bool,
}

#[derive(Debug, Default)]
struct Inner {
    record: ControlRecord,
    busy: bool,
}

/// In-memory control surface. Clones share state so tests can inspect it.
#[derive(Clone, Debug)]
pub struct SyntheticControls {
    has_flash: bool,
    inner: Arc<Mutex<Inner>>,
}

impl SyntheticControls {
    pub fn new(has_flash: bool) -> Self {
        Self {
            has_flash,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Simulate another client holding the configuration lock.
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    pub fn record(&self) -> ControlRecord {
        self.lock().record.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceControl for SyntheticControls {
    fn describe(&self) -> String {
        format!("synthetic controls (flash: {})", self.has_flash)
    }

    fn lock_for_configuration(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if inner.busy {
            bail!("device is being configured by another client");
        }
        inner.record.locked = true;
        Ok(())
    }

    fn unlock_configuration(&mut self) {
        self.lock().record.locked = false;
    }

    fn apply_focus(&mut self, point: FocusPoint) -> Result<()> {
        self.lock().record.focus = Some(point);
        Ok(())
    }

    fn apply_exposure(&mut self, point: FocusPoint) -> Result<()> {
        self.lock().record.exposure = Some(point);
        Ok(())
    }

    fn supports_flash(&self, mode: FlashMode) -> bool {
        self.has_flash || mode == FlashMode::Off
    }

    fn set_flash(&mut self, mode: FlashMode) -> Result<()> {
        self.lock().record.flash = mode;
        Ok(())
    }
}
