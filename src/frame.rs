//! Frame and tensor types.
//!
//! - `RawFrame`: one camera sample in the device's native pixel layout.
//! - `InputSpec`: the fixed geometry and memory layout a model expects.
//! - `NormalizedBuffer`: a frame reshaped to an `InputSpec`, built fresh per frame.
//!
//! A `NormalizedBuffer` can only be built inside the crate (by the preprocessor), so
//! a classifier never receives a buffer whose shape disagrees with its spec.

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::Instant;

// ----------------------------------------------------------------------------
// RawFrame: native camera sample
// ----------------------------------------------------------------------------

/// Native pixel layouts a capture device may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
    Gray8,
    /// Y plane followed by interleaved UV plane (4:2:0).
    Nv12,
    /// Packed Y0 U Y1 V (4:2:2).
    Yuyv,
    /// Compressed JPEG payload per frame.
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel for packed single-plane formats.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => Some(4),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Nv12 | PixelFormat::Mjpeg => None,
        }
    }

    /// Natural row stride in bytes for a frame of `width` pixels.
    pub fn min_stride(self, width: u32) -> usize {
        match self {
            PixelFormat::Nv12 => width as usize,
            PixelFormat::Mjpeg => 0,
            other => width as usize * other.bytes_per_pixel().unwrap_or(1),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgb24" | "rgb" | "rgb3" => Ok(PixelFormat::Rgb24),
            "bgr24" | "bgr" | "bgr3" => Ok(PixelFormat::Bgr24),
            "rgba32" | "rgba" => Ok(PixelFormat::Rgba32),
            "bgra32" | "bgra" => Ok(PixelFormat::Bgra32),
            "gray8" | "gray" | "grey" => Ok(PixelFormat::Gray8),
            "nv12" => Ok(PixelFormat::Nv12),
            "yuyv" | "yuy2" => Ok(PixelFormat::Yuyv),
            "mjpeg" | "mjpg" | "jpeg" => Ok(PixelFormat::Mjpeg),
            other => Err(anyhow!("unknown pixel format '{}'", other)),
        }
    }
}

/// Clockwise rotation that brings a captured frame to the canonical portrait
/// orientation. Fixed per device mount, independent of physical device rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Up,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" | "0" | "none" => Ok(Orientation::Up),
            "90" | "rotate90" | "right" => Ok(Orientation::Rotate90),
            "180" | "rotate180" | "down" => Ok(Orientation::Rotate180),
            "270" | "rotate270" | "left" => Ok(Orientation::Rotate270),
            other => Err(anyhow!("unknown orientation '{}'", other)),
        }
    }
}

/// One camera sample. Owned by a single delivery and dropped afterwards.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes between the starts of successive rows (first plane for NV12).
    pub stride: usize,
    pub orientation: Orientation,
    /// Monotonic per-source counter, starting at 1.
    pub sequence: u64,
    pub captured_at: Instant,
}

// No Clone: a frame is moved through the pipeline, never duplicated.

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            stride: format.min_stride(width),
            orientation: Orientation::Up,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Solid-color RGB24 frame, handy for calibration and tests.
    pub fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, PixelFormat::Rgb24)
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Age of this frame since capture.
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("orientation", &self.orientation)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// InputSpec: the model's input contract
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// For each output channel, the index into an RGB triple.
    pub fn rgb_indices(self) -> [usize; 3] {
        match self {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(anyhow!("unknown channel order '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TensorLayout {
    /// Planar `1 x C x S x S`.
    #[default]
    Nchw,
    /// Interleaved `1 x S x S x C`.
    Nhwc,
}

impl FromStr for TensorLayout {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nchw" | "planar" => Ok(TensorLayout::Nchw),
            "nhwc" | "interleaved" => Ok(TensorLayout::Nhwc),
            other => Err(anyhow!("unknown tensor layout '{}'", other)),
        }
    }
}

/// Element type and value mapping of the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElementType {
    /// Raw 8-bit samples.
    U8,
    /// `(v / 255 - mean[c]) / std[c]`, indexed by output channel.
    F32 { mean: [f32; 3], std: [f32; 3] },
}

impl ElementType {
    /// Plain `[0, 1]` scaling.
    pub fn unit_f32() -> Self {
        ElementType::F32 {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    pub fn bytes_per_element(&self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::F32 { .. } => 4,
        }
    }
}

pub const CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputSpec {
    /// Square side length S.
    pub size: u32,
    pub channel_order: ChannelOrder,
    pub layout: TensorLayout,
    pub element: ElementType,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            size: 224,
            channel_order: ChannelOrder::Rgb,
            layout: TensorLayout::Nchw,
            element: ElementType::unit_f32(),
        }
    }
}

impl InputSpec {
    pub fn square(size: u32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_element(mut self, element: ElementType) -> Self {
        self.element = element;
        self
    }

    /// Number of elements `S * S * C`, or `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        (self.size as usize)
            .checked_mul(self.size as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
    }

    /// Tensor shape including the batch dimension.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.size as usize;
        match self.layout {
            TensorLayout::Nchw => [1, CHANNELS, s, s],
            TensorLayout::Nhwc => [1, s, s, CHANNELS],
        }
    }

    /// Flat index of output channel `c` at pixel `(x, y)`.
    pub fn index(&self, x: usize, y: usize, c: usize) -> usize {
        let s = self.size as usize;
        match self.layout {
            TensorLayout::Nchw => c * s * s + y * s + x,
            TensorLayout::Nhwc => (y * s + x) * CHANNELS + c,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if let ElementType::F32 { std, .. } = self.element {
            if std.iter().any(|s| !s.is_finite() || *s == 0.0) {
                return Err(anyhow!("normalization std must be finite and non-zero"));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// NormalizedBuffer: per-frame model input
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::U8(v) => v.len(),
            TensorData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Model input built from one frame. Moved into the classifier and dropped after
/// inference; there is no `Clone`.
#[derive(Debug)]
pub struct NormalizedBuffer {
    spec: InputSpec,
    data: TensorData,
    frame_sequence: u64,
}

impl NormalizedBuffer {
    pub(crate) fn new(spec: InputSpec, data: TensorData, frame_sequence: u64) -> Self {
        Self {
            spec,
            data,
            frame_sequence,
        }
    }

    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }

    pub fn shape(&self) -> [usize; 4] {
        self.spec.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements between the starts of successive rows of one channel plane.
    pub fn row_stride(&self) -> usize {
        let s = self.spec.size as usize;
        match self.spec.layout {
            TensorLayout::Nchw => s,
            TensorLayout::Nhwc => s * CHANNELS,
        }
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Pixel at `(x, y)` mapped back to RGB in `[0, 1]`.
    pub fn pixel_rgb(&self, x: usize, y: usize) -> [f32; 3] {
        let order = self.spec.channel_order.rgb_indices();
        let mut rgb = [0.0f32; 3];
        for (c, &rgb_idx) in order.iter().enumerate() {
            let idx = self.spec.index(x, y, c);
            rgb[rgb_idx] = match (&self.data, self.spec.element) {
                (TensorData::U8(v), _) => v[idx] as f32 / 255.0,
                (TensorData::F32(v), ElementType::F32 { mean, std }) => v[idx] * std[c] + mean[c],
                (TensorData::F32(v), ElementType::U8) => v[idx] / 255.0,
            };
        }
        rgb
    }

    /// Mean RGB over the whole buffer, in `[0, 1]`.
    pub fn mean_rgb(&self) -> [f32; 3] {
        let s = self.spec.size as usize;
        if s == 0 {
            return [0.0; 3];
        }
        let mut sum = [0.0f64; 3];
        for y in 0..s {
            for x in 0..s {
                let px = self.pixel_rgb(x, y);
                for c in 0..CHANNELS {
                    sum[c] += px[c] as f64;
                }
            }
        }
        let n = (s * s) as f64;
        [
            (sum[0] / n) as f32,
            (sum[1] / n) as f32,
            (sum[2] / n) as f32,
        ]
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
