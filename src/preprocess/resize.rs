//! Orientation and square-fitting geometry.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::str::FromStr;

use crate::frame::Orientation;

/// How a frame of arbitrary aspect ratio is mapped onto the model's square input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Resize both axes independently to S x S. Distorts non-square frames.
    #[default]
    Stretch,
    /// Center-crop the largest square, then resize. Drops the frame edges.
    AspectFill,
    /// Scale the longest side to S and letterbox the rest with black.
    AspectFit,
}

impl FromStr for ResizePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "stretch" | "direct" => Ok(ResizePolicy::Stretch),
            "aspect-fill" | "fill" | "crop" => Ok(ResizePolicy::AspectFill),
            "aspect-fit" | "fit" | "letterbox" => Ok(ResizePolicy::AspectFit),
            other => Err(anyhow!("unknown resize policy '{}'", other)),
        }
    }
}

pub(crate) fn orient(image: RgbImage, orientation: Orientation) -> RgbImage {
    match orientation {
        Orientation::Up => image,
        Orientation::Rotate90 => imageops::rotate90(&image),
        Orientation::Rotate180 => imageops::rotate180(&image),
        Orientation::Rotate270 => imageops::rotate270(&image),
    }
}

pub(crate) fn to_square(
    image: RgbImage,
    size: u32,
    policy: ResizePolicy,
    filter: FilterType,
) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == size && h == size {
        return image;
    }

    match policy {
        ResizePolicy::Stretch => imageops::resize(&image, size, size, filter),
        ResizePolicy::AspectFill => {
            let side = w.min(h);
            let cropped = imageops::crop_imm(&image, (w - side) / 2, (h - side) / 2, side, side)
                .to_image();
            if side == size {
                cropped
            } else {
                imageops::resize(&cropped, size, size, filter)
            }
        }
        ResizePolicy::AspectFit => {
            let scale = size as f64 / w.max(h) as f64;
            let new_w = ((w as f64 * scale).round() as u32).clamp(1, size);
            let new_h = ((h as f64 * scale).round() as u32).clamp(1, size);
            let scaled = imageops::resize(&image, new_w, new_h, filter);
            let mut canvas = RgbImage::new(size, size);
            imageops::overlay(
                &mut canvas,
                &scaled,
                ((size - new_w) / 2) as i64,
                ((size - new_h) / 2) as i64,
            );
            canvas
        }
    }
}
