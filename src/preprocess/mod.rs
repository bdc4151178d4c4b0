//! Frame preprocessing: `RawFrame` to `NormalizedBuffer`.
//!
//! The transform is pure and deterministic:
//! 1. Allocate the output buffer for the model's input spec (fallible)
//! 2. Decode the native pixel layout to packed RGB8
//! 3. Rotate to the canonical orientation carried by the frame
//! 4. Fit onto the S x S square according to the `ResizePolicy`
//! 5. Pack into the model's channel order, tensor layout and element type
//!
//! The output buffer is allocated before any intermediate image so that an
//! impossible spec is rejected without touching the frame.

mod normalize;
mod resize;

pub use image::imageops::FilterType;
pub use resize::ResizePolicy;

use image::RgbImage;

use crate::error::PipelineError;
use crate::frame::{ElementType, InputSpec, NormalizedBuffer, RawFrame, TensorData, CHANNELS};

#[derive(Clone, Debug)]
pub struct FramePreprocessor {
    spec: InputSpec,
    policy: ResizePolicy,
    filter: FilterType,
}

impl FramePreprocessor {
    pub fn new(spec: InputSpec, policy: ResizePolicy) -> Self {
        Self {
            spec,
            policy,
            filter: FilterType::Triangle,
        }
    }

    /// Override the resampling filter (bilinear by default).
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }

    pub fn policy(&self) -> ResizePolicy {
        self.policy
    }

    pub fn process(&self, frame: &RawFrame) -> Result<NormalizedBuffer, PipelineError> {
        let mut data = allocate(&self.spec)?;

        let rgb = normalize::to_rgb(frame).map_err(|err| {
            PipelineError::MalformedFrame(format!("frame #{}: {:#}", frame.sequence, err))
        })?;
        let oriented = resize::orient(rgb, frame.orientation);
        let square = resize::to_square(oriented, self.spec.size, self.policy, self.filter);

        pack(&square, &self.spec, &mut data);
        Ok(NormalizedBuffer::new(self.spec, data, frame.sequence))
    }
}

fn allocate(spec: &InputSpec) -> Result<TensorData, PipelineError> {
    let count = spec.element_count().ok_or_else(|| {
        PipelineError::BufferAllocationFailed(format!(
            "{0}x{0}x{1} elements overflow the address space",
            spec.size, CHANNELS
        ))
    })?;
    if count == 0 {
        return Err(PipelineError::BufferAllocationFailed(
            "model input size is zero".to_string(),
        ));
    }
    let failed = |err: std::collections::TryReserveError| {
        PipelineError::BufferAllocationFailed(format!(
            "{} elements of {} bytes: {}",
            count,
            spec.element.bytes_per_element(),
            err
        ))
    };

    match spec.element {
        ElementType::U8 => {
            let mut buf: Vec<u8> = Vec::new();
            buf.try_reserve_exact(count).map_err(failed)?;
            buf.resize(count, 0);
            Ok(TensorData::U8(buf))
        }
        ElementType::F32 { .. } => {
            let mut buf: Vec<f32> = Vec::new();
            buf.try_reserve_exact(count).map_err(failed)?;
            buf.resize(count, 0.0);
            Ok(TensorData::F32(buf))
        }
    }
}

fn pack(image: &RgbImage, spec: &InputSpec, data: &mut TensorData) {
    let order = spec.channel_order.rgb_indices();

    match (data, spec.element) {
        (TensorData::U8(buf), _) => {
            for (x, y, pixel) in image.enumerate_pixels() {
                for (c, &src) in order.iter().enumerate() {
                    buf[spec.index(x as usize, y as usize, c)] = pixel.0[src];
                }
            }
        }
        (TensorData::F32(buf), element) => {
            let (mean, std) = match element {
                ElementType::F32 { mean, std } => (mean, std),
                ElementType::U8 => ([0.0; 3], [1.0; 3]),
            };
            let scale: [f32; 3] = std::array::from_fn(|c| 1.0 / (255.0 * std[c]));
            let offset: [f32; 3] = std::array::from_fn(|c| -mean[c] / std[c]);
            for (x, y, pixel) in image.enumerate_pixels() {
                for (c, &src) in order.iter().enumerate() {
                    buf[spec.index(x as usize, y as usize, c)] =
                        pixel.0[src] as f32 * scale[c] + offset[c];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ChannelOrder, Orientation, PixelFormat, TensorLayout};

    const SIZE: u32 = 32;

    fn patterned(width: u32, height: u32, format: PixelFormat) -> RawFrame {
        let len = match format {
            PixelFormat::Nv12 => (width * height + width * height / 2) as usize,
            _ => format.min_stride(width) * height as usize,
        };
        let data = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        RawFrame::new(data, width, height, format)
    }

    #[test]
    fn every_valid_frame_yields_the_fixed_shape() {
        let geometries = [(2, 2), (8, 6), (64, 48), (48, 64), (32, 32), (160, 120)];
        let formats = [
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Rgba32,
            PixelFormat::Bgra32,
            PixelFormat::Gray8,
            PixelFormat::Nv12,
            PixelFormat::Yuyv,
        ];
        let policies = [
            ResizePolicy::Stretch,
            ResizePolicy::AspectFill,
            ResizePolicy::AspectFit,
        ];
        let specs = [
            InputSpec::square(SIZE),
            InputSpec::square(SIZE)
                .with_layout(TensorLayout::Nhwc)
                .with_element(ElementType::U8),
            InputSpec::square(SIZE).with_channel_order(ChannelOrder::Bgr),
        ];

        for spec in specs {
            for policy in policies {
                let pre = FramePreprocessor::new(spec, policy);
                for (w, h) in geometries {
                    for format in formats {
                        for orientation in [Orientation::Up, Orientation::Rotate90] {
                            let frame = patterned(w, h, format).with_orientation(orientation);
                            let buffer = pre.process(&frame).unwrap_or_else(|e| {
                                panic!("{w}x{h} {format:?} {policy:?}: {e}")
                            });
                            assert_eq!(buffer.shape(), spec.shape());
                            assert_eq!(buffer.len(), (SIZE * SIZE * 3) as usize);
                            assert_eq!(buffer.spec(), &spec);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn solid_color_survives_as_unit_floats() {
        let pre = FramePreprocessor::new(InputSpec::square(4), ResizePolicy::Stretch);
        let buffer = pre
            .process(&RawFrame::solid_rgb(10, 6, [255, 0, 51]))
            .expect("process");
        let TensorData::F32(data) = buffer.data() else {
            panic!("expected f32 buffer");
        };
        // NCHW: red plane, then green, then blue.
        assert!(data[..16].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(data[16..32].iter().all(|v| v.abs() < 1e-6));
        assert!(data[32..].iter().all(|v| (*v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn bgr_interleaved_u8_swaps_channels() {
        let spec = InputSpec::square(2)
            .with_channel_order(ChannelOrder::Bgr)
            .with_layout(TensorLayout::Nhwc)
            .with_element(ElementType::U8);
        let pre = FramePreprocessor::new(spec, ResizePolicy::Stretch);
        let buffer = pre
            .process(&RawFrame::solid_rgb(2, 2, [10, 20, 30]))
            .expect("process");
        assert_eq!(buffer.row_stride(), 6);
        assert_eq!(
            buffer.into_data(),
            TensorData::U8([30, 20, 10].repeat(4))
        );
    }

    #[test]
    fn mean_and_std_are_applied_per_output_channel() {
        let spec = InputSpec::square(1).with_element(ElementType::F32 {
            mean: [0.5, 0.0, 0.0],
            std: [0.5, 1.0, 2.0],
        });
        let pre = FramePreprocessor::new(spec, ResizePolicy::Stretch);
        let buffer = pre
            .process(&RawFrame::solid_rgb(1, 1, [255, 255, 255]))
            .expect("process");
        let TensorData::F32(data) = buffer.into_data() else {
            panic!("expected f32 buffer");
        };
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!((data[1] - 1.0).abs() < 1e-6);
        assert!((data[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rotation_is_applied_before_packing() {
        // 4x2 landscape: left half red, right half blue.
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&[255, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0, 255]);
        }
        let frame = RawFrame::new(data, 4, 2, PixelFormat::Rgb24)
            .with_orientation(Orientation::Rotate90);
        let pre = FramePreprocessor::new(InputSpec::square(4), ResizePolicy::Stretch)
            .with_filter(FilterType::Nearest);
        let buffer = pre.process(&frame).expect("process");

        let close = |a: [f32; 3], b: [f32; 3]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5);
        assert!(close(buffer.pixel_rgb(0, 0), [1.0, 0.0, 0.0]));
        assert!(close(buffer.pixel_rgb(3, 3), [0.0, 0.0, 1.0]));
    }

    #[test]
    fn buffer_carries_frame_sequence() {
        let pre = FramePreprocessor::new(InputSpec::square(2), ResizePolicy::AspectFill);
        let frame = RawFrame::solid_rgb(3, 2, [1, 2, 3]).with_sequence(42);
        assert_eq!(pre.process(&frame).expect("process").frame_sequence(), 42);
    }

    #[test]
    fn malformed_frame_is_a_frame_skip() {
        let pre = FramePreprocessor::new(InputSpec::square(4), ResizePolicy::Stretch);
        let frame = RawFrame::new(vec![0u8; 5], 4, 4, PixelFormat::Rgb24);
        let err = pre.process(&frame).expect_err("short frame");
        assert!(matches!(err, PipelineError::MalformedFrame(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn impossible_buffer_reports_allocation_failure() {
        let pre = FramePreprocessor::new(InputSpec::square(u32::MAX), ResizePolicy::Stretch);
        let err = pre
            .process(&RawFrame::solid_rgb(2, 2, [0, 0, 0]))
            .expect_err("overflowing spec");
        assert!(matches!(err, PipelineError::BufferAllocationFailed(_)));
    }

    #[test]
    fn zero_sized_spec_reports_allocation_failure() {
        let pre = FramePreprocessor::new(InputSpec::square(0), ResizePolicy::Stretch);
        let err = pre
            .process(&RawFrame::solid_rgb(2, 2, [0, 0, 0]))
            .expect_err("zero spec");
        assert!(matches!(err, PipelineError::BufferAllocationFailed(_)));
    }
}
