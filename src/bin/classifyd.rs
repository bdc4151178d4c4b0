//! classifyd - live camera classification daemon
//!
//! This daemon:
//! 1. Loads configuration (CLASSIFIER_CONFIG JSON file + CLASSIFIER_* env overrides)
//! 2. Applies startup camera controls (focus/exposure point, flash)
//! 3. Loads the model and starts capture
//! 4. Logs every label change, with per-result diagnostics at debug level
//! 5. Logs capture health and pipeline counters periodically
//! 6. Stops cleanly on Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use live_classifier::{
    config::ControlSettings, ClassifierdConfig, DeviceController, LabelDisplay, Pipeline,
    SessionState,
};

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = ClassifierdConfig::load()?;
    log::info!(
        "classifyd {} starting: device={} model={} resize={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.capture.device,
        cfg.model.location,
        cfg.resize_policy
    );

    apply_controls(&cfg.capture.device, &cfg.controls);

    let mut pipeline = Pipeline::from_config(&cfg)?;
    pipeline.start()?;
    let mut display =
        LabelDisplay::new(pipeline.subscribe()).with_diagnostics(cfg.diagnostics.top_k);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    log::info!("classifyd running. waiting for shutdown signal (Ctrl-C)...");

    let mut last_health_log = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                log::info!("shutdown signal received, stopping pipeline...");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        if display.refresh_timeout(REFRESH_INTERVAL) {
            log::info!("label: {}", display.text());
        }

        if last_health_log.elapsed() >= cfg.diagnostics.stats_interval {
            let stats = pipeline.stats();
            log::info!(
                "capture health={} captured={} dropped={} skipped={} failed={} published={} label={}",
                pipeline.is_healthy(),
                stats.frames_captured,
                stats.frames_dropped,
                stats.frames_skipped,
                stats.inference_failures,
                stats.results_published,
                display.text()
            );
            last_health_log = Instant::now();
        }

        if pipeline.state() == SessionState::Stopped {
            log::error!("capture session ended unexpectedly");
            break;
        }
    }

    pipeline.stop();
    log::info!("classifyd stopped");
    Ok(())
}

fn apply_controls(device: &str, controls: &ControlSettings) {
    if controls.focus_point.is_none() && controls.flash.is_none() {
        return;
    }
    let Some(mut controller) = DeviceController::for_device(device) else {
        log::warn!("no control surface for {}; camera controls ignored", device);
        return;
    };
    if let Some(point) = controls.focus_point {
        controller.apply_focus_and_exposure(point);
    }
    if let Some(flash) = controls.flash {
        if let Err(err) = controller.set_flash_mode(flash) {
            log::info!("continuing without flash control: {}", err);
        }
    }
}
