use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::classify::{ModelAsset, ScoreKind};
use crate::device::{FlashMode, FocusPoint};
use crate::frame::{ChannelOrder, ElementType, InputSpec, Orientation, PixelFormat, TensorLayout};
use crate::ingest::CaptureConfig;
use crate::preprocess::ResizePolicy;

const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_MODEL: &str = "stub://dominant-color";
const DEFAULT_INPUT_SIZE: u32 = 224;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct ClassifierdConfigFile {
    capture: Option<CaptureConfigFile>,
    model: Option<ModelConfigFile>,
    resize_policy: Option<String>,
    controls: Option<ControlsConfigFile>,
    diagnostics: Option<DiagnosticsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    orientation: Option<String>,
    pixel_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    location: Option<String>,
    labels: Option<PathBuf>,
    input_size: Option<u32>,
    channel_order: Option<String>,
    layout: Option<String>,
    /// "f32" or "u8".
    element: Option<String>,
    mean: Option<[f32; 3]>,
    std: Option<[f32; 3]>,
    scores: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlsConfigFile {
    focus_point: Option<[f32; 2]>,
    flash: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DiagnosticsConfigFile {
    top_k: Option<usize>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClassifierdConfig {
    pub capture: CaptureConfig,
    pub model: ModelAsset,
    pub resize_policy: ResizePolicy,
    pub controls: ControlSettings,
    pub diagnostics: DiagnosticsSettings,
}

/// Camera controls applied once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSettings {
    pub focus_point: Option<FocusPoint>,
    pub flash: Option<FlashMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsSettings {
    /// `label = probability` lines logged per result.
    pub top_k: usize,
    pub stats_interval: Duration,
}

impl ClassifierdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CLASSIFIER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClassifierdConfigFile) -> Result<Self> {
        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureConfig {
            device: capture_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_HEIGHT),
            fps: capture_file.fps.unwrap_or(DEFAULT_FPS),
            pixel_format: parse_or(capture_file.pixel_format, PixelFormat::Yuyv)
                .context("capture.pixel_format")?,
            orientation: parse_or(capture_file.orientation, Orientation::Up)
                .context("capture.orientation")?,
        };

        let model_file = file.model.unwrap_or_default();
        let element = match model_file.element.as_deref().map(str::trim) {
            None | Some("f32") => ElementType::F32 {
                mean: model_file.mean.unwrap_or([0.0; 3]),
                std: model_file.std.unwrap_or([1.0; 3]),
            },
            Some("u8") => ElementType::U8,
            Some(other) => return Err(anyhow!("model.element must be f32 or u8, got '{}'", other)),
        };
        let input = InputSpec::square(model_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE))
            .with_channel_order(
                parse_or(model_file.channel_order, ChannelOrder::Rgb)
                    .context("model.channel_order")?,
            )
            .with_layout(parse_or(model_file.layout, TensorLayout::Nchw).context("model.layout")?)
            .with_element(element);
        let mut model = ModelAsset::new(
            model_file
                .location
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            input,
        )
        .with_scores(parse_or(model_file.scores, ScoreKind::Probabilities).context("model.scores")?);
        model.labels = model_file.labels;

        let resize_policy =
            parse_or(file.resize_policy, ResizePolicy::default()).context("resize_policy")?;

        let controls_file = file.controls.unwrap_or_default();
        let controls = ControlSettings {
            focus_point: controls_file
                .focus_point
                .map(|[x, y]| FocusPoint::new(x, y)),
            flash: controls_file
                .flash
                .map(|flash| flash.parse::<FlashMode>())
                .transpose()
                .context("controls.flash")?,
        };

        let diagnostics_file = file.diagnostics.unwrap_or_default();
        let diagnostics = DiagnosticsSettings {
            top_k: diagnostics_file.top_k.unwrap_or(DEFAULT_TOP_K),
            stats_interval: Duration::from_secs(
                diagnostics_file
                    .stats_interval_secs
                    .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            ),
        };

        Ok(Self {
            capture,
            model,
            resize_policy,
            controls,
            diagnostics,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CLASSIFIER_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(fps) = std::env::var("CLASSIFIER_FPS") {
            self.capture.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CLASSIFIER_FPS must be an integer frame rate"))?;
        }
        if let Ok(model) = std::env::var("CLASSIFIER_MODEL") {
            if !model.trim().is_empty() {
                self.model.location = model;
            }
        }
        if let Ok(labels) = std::env::var("CLASSIFIER_LABELS") {
            if !labels.trim().is_empty() {
                self.model.labels = Some(PathBuf::from(labels));
            }
        }
        if let Ok(policy) = std::env::var("CLASSIFIER_RESIZE_POLICY") {
            self.resize_policy = policy.parse().context("CLASSIFIER_RESIZE_POLICY")?;
        }
        if let Ok(orientation) = std::env::var("CLASSIFIER_ORIENTATION") {
            self.capture.orientation = orientation.parse().context("CLASSIFIER_ORIENTATION")?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.model.location.trim().is_empty() {
            return Err(anyhow!("model location must not be empty"));
        }
        self.model.input.validate().context("model input")?;
        if self.diagnostics.stats_interval.is_zero() {
            return Err(anyhow!("diagnostics.stats_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClassifierdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    match value {
        Some(value) => value.parse(),
        None => Ok(default),
    }
}
