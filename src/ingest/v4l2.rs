//! V4L2 capture device.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates the requested pixel
//! format and rate, and reads frames from a memory-mapped buffer queue. Frames are
//! copied out of the driver buffer before the next dequeue.

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::io;

use super::{CaptureConfig, CaptureDevice};
use crate::error::PipelineError;
use crate::frame::{PixelFormat, RawFrame};

const BUFFER_COUNT: u32 = 4;

pub struct V4l2Device {
    config: CaptureConfig,
    state: Option<V4l2State>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
    active_stride: usize,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

impl V4l2Device {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_format: config.pixel_format,
            active_stride: 0,
            config,
            state: None,
        }
    }

    fn negotiate(&mut self, device: &v4l::Device) -> Result<(), PipelineError> {
        use v4l::video::Capture;

        let mut format = device.format().map_err(|err| {
            PipelineError::InputCreationFailed(format!(
                "{}: read format: {}",
                self.config.device, err
            ))
        })?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(&fourcc_for(self.config.pixel_format));

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Device: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device.format().map_err(|err| {
                    PipelineError::InputCreationFailed(format!(
                        "{}: read format after set failure: {}",
                        self.config.device, err
                    ))
                })?
            }
        };

        let pixel_format = pixel_format_for(&format.fourcc.repr).ok_or_else(|| {
            PipelineError::InputCreationFailed(format!(
                "{}: driver chose unsupported pixel format {}",
                self.config.device, format.fourcc
            ))
        })?;

        if self.config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Device: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_format = pixel_format;
        self.active_stride = format.stride as usize;
        Ok(())
    }
}

impl CaptureDevice for V4l2Device {
    fn describe(&self) -> String {
        format!(
            "{} ({}x{} {:?})",
            self.config.device, self.active_width, self.active_height, self.active_format
        )
    }

    fn open(&mut self) -> Result<(), PipelineError> {
        use v4l::buffer::Type;

        let device = v4l::Device::with_path(&self.config.device).map_err(|err| {
            let detail = format!("{}: {}", self.config.device, err);
            match err.kind() {
                io::ErrorKind::NotFound => PipelineError::DeviceUnavailable(detail),
                _ => PipelineError::InputCreationFailed(detail),
            }
        })?;
        self.negotiate(&device)?;

        let timeout = super::health_grace_for(self.config.fps);
        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                let mut stream = v4l::prelude::MmapStream::with_buffers(
                    device,
                    Type::VideoCapture,
                    BUFFER_COUNT,
                )?;
                stream.set_timeout(timeout);
                Ok::<_, io::Error>(stream)
            },
        }
        .try_build()
        .map_err(|err| {
            PipelineError::InputCreationFailed(format!(
                "{}: create buffer stream: {}",
                self.config.device, err
            ))
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Device: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not opened")?;
        let dequeued = state.with_stream_mut(|stream| {
            stream.next().map(|(buf, meta)| {
                let used = meta.bytesused as usize;
                if used > 0 && used <= buf.len() {
                    buf[..used].to_vec()
                } else {
                    buf.to_vec()
                }
            })
        });
        let Some(data) = frame_or_timeout(dequeued)? else {
            log::debug!("V4l2Device: no frame from {} before timeout", self.config.device);
            return Ok(None);
        };

        let mut frame = RawFrame::new(
            data,
            self.active_width,
            self.active_height,
            self.active_format,
        );
        if self.active_stride > 0 && self.active_format != PixelFormat::Mjpeg {
            frame = frame.with_stride(self.active_stride);
        }
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Device: released {}", self.config.device);
        }
    }
}

/// A dequeue that timed out yields no frame so the capture loop can observe a stop.
fn frame_or_timeout(dequeued: io::Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    match dequeued {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
        Err(err) => Err(err).context("capture v4l2 frame"),
    }
}

fn fourcc_for(format: PixelFormat) -> [u8; 4] {
    match format {
        PixelFormat::Rgb24 => *b"RGB3",
        PixelFormat::Bgr24 => *b"BGR3",
        PixelFormat::Rgba32 => *b"AB24",
        PixelFormat::Bgra32 => *b"AR24",
        PixelFormat::Gray8 => *b"GREY",
        PixelFormat::Nv12 => *b"NV12",
        PixelFormat::Yuyv => *b"YUYV",
        PixelFormat::Mjpeg => *b"MJPG",
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    Some(match fourcc {
        b"RGB3" => PixelFormat::Rgb24,
        b"BGR3" => PixelFormat::Bgr24,
        b"AB24" => PixelFormat::Rgba32,
        b"AR24" => PixelFormat::Bgra32,
        b"GREY" => PixelFormat::Gray8,
        b"NV12" => PixelFormat::Nv12,
        b"YUYV" => PixelFormat::Yuyv,
        b"MJPG" => PixelFormat::Mjpeg,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_mapping_is_symmetric() {
        for format in [
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Rgba32,
            PixelFormat::Bgra32,
            PixelFormat::Gray8,
            PixelFormat::Nv12,
            PixelFormat::Yuyv,
            PixelFormat::Mjpeg,
        ] {
            assert_eq!(pixel_format_for(&fourcc_for(format)), Some(format));
        }
        assert_eq!(pixel_format_for(b"H264"), None);
    }

    #[test]
    fn dequeue_timeout_is_not_an_error() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF");
        assert!(matches!(frame_or_timeout(Err(timed_out)), Ok(None)));

        let frame = frame_or_timeout(Ok(vec![1, 2, 3])).expect("frame");
        assert_eq!(frame, Some(vec![1, 2, 3]));

        let unplugged = io::Error::new(io::ErrorKind::Other, "ENODEV");
        assert!(frame_or_timeout(Err(unplugged)).is_err());
    }

    #[test]
    fn missing_device_is_unavailable() {
        let mut device = V4l2Device::new(CaptureConfig {
            device: "/dev/video-does-not-exist".to_string(),
            ..CaptureConfig::default()
        });
        assert!(matches!(
            device.open(),
            Err(PipelineError::DeviceUnavailable(_))
        ));
    }
}
