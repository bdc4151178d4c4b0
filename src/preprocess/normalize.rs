//! Native pixel layout to packed RGB8.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};

use crate::frame::{PixelFormat, RawFrame};

pub(crate) fn to_rgb(frame: &RawFrame) -> Result<RgbImage> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(anyhow!("frame has zero dimension {}x{}", width, height));
    }

    let rgb = match frame.format {
        PixelFormat::Mjpeg => return decode_mjpeg(frame.pixels()),
        PixelFormat::Nv12 => nv12_to_rgb(frame.pixels(), width, height, frame.stride)?,
        PixelFormat::Yuyv => yuyv_to_rgb(frame.pixels(), width, height, frame.stride)?,
        packed => packed_to_rgb(frame.pixels(), width, height, frame.stride, packed)?,
    };

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))
}

/// Validates that `pixels` holds `rows` rows of `row_bytes` at `stride` spacing.
fn check_plane(pixels: &[u8], rows: usize, row_bytes: usize, stride: usize) -> Result<usize> {
    if stride < row_bytes {
        return Err(anyhow!(
            "row stride {} is smaller than row width {} bytes",
            stride,
            row_bytes
        ));
    }
    let expected = stride
        .checked_mul(rows.saturating_sub(1))
        .and_then(|v| v.checked_add(row_bytes))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "frame length mismatch: expected at least {}, got {}",
            expected,
            pixels.len()
        ));
    }
    Ok(expected)
}

fn packed_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let bpp = format
        .bytes_per_pixel()
        .ok_or_else(|| anyhow!("{:?} is not a packed format", format))?;
    let w = width as usize;
    let h = height as usize;
    check_plane(pixels, h, w * bpp, stride)?;

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let start = row * stride;
        for px in pixels[start..start + w * bpp].chunks_exact(bpp) {
            match format {
                PixelFormat::Rgb24 | PixelFormat::Rgba32 => rgb.extend_from_slice(&px[..3]),
                PixelFormat::Bgr24 | PixelFormat::Bgra32 => {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]])
                }
                PixelFormat::Gray8 => rgb.extend_from_slice(&[px[0], px[0], px[0]]),
                _ => unreachable!("non-packed formats are dispatched earlier"),
            }
        }
    }
    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 frame must have even dimensions, got {}x{}", w, h));
    }
    let y_plane = stride
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    check_plane(pixels, h, w, stride)?;
    check_plane(
        pixels.get(y_plane..).unwrap_or_default(),
        h / 2,
        w,
        stride,
    )
    .context("NV12 chroma plane")?;

    let mut rgb = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * stride + i] as f32;
            let uv_index = y_plane + (j / 2) * stride + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    Ok(rgb)
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32, stride: usize) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 {
        return Err(anyhow!("YUYV frame must have even width, got {}", w));
    }
    check_plane(pixels, h, w * 2, stride)?;

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let start = row * stride;
        for quad in pixels[start..start + w * 2].chunks_exact(4) {
            let u = quad[1] as f32 - 128.0;
            let v = quad[3] as f32 - 128.0;
            rgb.extend_from_slice(&yuv_to_rgb(quad[0] as f32, u, v));
            rgb.extend_from_slice(&yuv_to_rgb(quad[2] as f32, u, v));
        }
    }
    Ok(rgb)
}

/// Full-range BT.601, `u` and `v` already centered on zero.
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn decode_mjpeg(payload: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(payload, ImageFormat::Jpeg)
        .context("decode MJPEG frame")?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> RawFrame {
        RawFrame::new(data, width, height, format)
    }

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = to_rgb(&frame(nv12, 2, 2, PixelFormat::Nv12))?;
        assert_eq!(rgb.into_raw(), vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn nv12_rejects_odd_dimensions() {
        let nv12 = vec![128u8; 3 * 2 + 3];
        assert!(to_rgb(&frame(nv12, 3, 2, PixelFormat::Nv12)).is_err());
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let rgb = to_rgb(&frame(pixels.clone(), 1, 3, PixelFormat::Rgb24))?;
        assert_eq!(rgb.into_raw(), pixels);

        assert!(to_rgb(&frame(vec![1u8; 8], 1, 3, PixelFormat::Rgb24)).is_err());
        Ok(())
    }

    #[test]
    fn bgr_and_bgra_are_swapped_to_rgb() -> Result<()> {
        let bgr = to_rgb(&frame(vec![3, 2, 1], 1, 1, PixelFormat::Bgr24))?;
        assert_eq!(bgr.into_raw(), vec![1, 2, 3]);

        let bgra = to_rgb(&frame(vec![3, 2, 1, 255], 1, 1, PixelFormat::Bgra32))?;
        assert_eq!(bgra.into_raw(), vec![1, 2, 3]);

        let rgba = to_rgb(&frame(vec![1, 2, 3, 0], 1, 1, PixelFormat::Rgba32))?;
        assert_eq!(rgba.into_raw(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn gray_is_replicated() -> Result<()> {
        let rgb = to_rgb(&frame(vec![7, 9], 2, 1, PixelFormat::Gray8))?;
        assert_eq!(rgb.into_raw(), vec![7, 7, 7, 9, 9, 9]);
        Ok(())
    }

    #[test]
    fn yuyv_neutral_chroma_is_gray() -> Result<()> {
        let yuyv = vec![50, 128, 200, 128];
        let rgb = to_rgb(&frame(yuyv, 2, 1, PixelFormat::Yuyv))?;
        assert_eq!(rgb.into_raw(), vec![50, 50, 50, 200, 200, 200]);
        Ok(())
    }

    #[test]
    fn row_padding_is_skipped() -> Result<()> {
        // Two rows of one RGB pixel, each padded to 4 bytes.
        let padded = vec![1, 2, 3, 0xEE, 4, 5, 6, 0xEE];
        let rgb = to_rgb(&frame(padded, 1, 2, PixelFormat::Rgb24).with_stride(4))?;
        assert_eq!(rgb.into_raw(), vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn stride_smaller_than_row_is_rejected() {
        let f = frame(vec![0u8; 12], 2, 2, PixelFormat::Rgb24).with_stride(4);
        assert!(to_rgb(&f).is_err());
    }

    #[test]
    fn mjpeg_payload_is_decoded() -> Result<()> {
        let source = RgbImage::from_pixel(16, 8, image::Rgb([220, 10, 10]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;

        let rgb = to_rgb(&frame(jpeg, 16, 8, PixelFormat::Mjpeg))?;
        assert_eq!(rgb.dimensions(), (16, 8));
        let px = rgb.get_pixel(8, 4);
        assert!(px[0] > 180 && px[1] < 60 && px[2] < 60);
        Ok(())
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        assert!(to_rgb(&frame(Vec::new(), 0, 4, PixelFormat::Rgb24)).is_err());
    }
}
