//! Turns uploaded image bytes into the tensor the model was trained on.
//!
//! The pipeline is decode → grayscale → 28×28 → divide by 255 → `(1, 28, 28, 1)`.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage};
use log::debug;

use crate::{Error, Result};

pub const IMAGE_WIDTH: u32 = 28;
pub const IMAGE_HEIGHT: u32 = 28;

/// Number of pixels in a canonical image.
pub const PIXELS: usize = (IMAGE_WIDTH * IMAGE_HEIGHT) as usize;

/// Model input: a single 28×28 grayscale image scaled to `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTensor {
    values: Vec<f32>,
}

impl NormalizedTensor {
    /// Batch, height, width, channels.
    pub const SHAPE: [u64; 4] = [1, IMAGE_HEIGHT as u64, IMAGE_WIDTH as u64, 1];

    /// Build from row-major `u8` intensities, as found in the dataset files.
    pub fn from_pixels(pixels: &[u8]) -> Result<Self> {
        if pixels.len() != PIXELS {
            return Err(Error::ShapeMismatch {
                expected: vec![PIXELS],
                actual: vec![pixels.len()],
            });
        }

        let values = pixels.iter().map(|p| *p as f32 / 255f32).collect();

        Ok(NormalizedTensor { values })
    }

    /// Build from an already resized grayscale image.
    pub fn from_luma(image: &GrayImage) -> Result<Self> {
        if image.dimensions() != (IMAGE_WIDTH, IMAGE_HEIGHT) {
            let (w, h) = image.dimensions();
            return Err(Error::ShapeMismatch {
                expected: vec![IMAGE_HEIGHT as usize, IMAGE_WIDTH as usize],
                actual: vec![h as usize, w as usize],
            });
        }

        Self::from_pixels(image.as_raw())
    }

    pub fn shape(&self) -> [u64; 4] {
        Self::SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Smallest and largest value, for diagnostics.
    pub fn range(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
    }
}

/// Decode raw bytes, guessing the format from the content.
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)?;

    let (width, height) = image.dimensions();
    debug!("Received image: {:?}, {}x{}", image.color(), width, height);

    Ok(image)
}

/// Grayscale conversion followed by a resize to 28×28.
pub fn to_canonical(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();

    if gray.dimensions() == (IMAGE_WIDTH, IMAGE_HEIGHT) {
        return gray;
    }

    imageops::resize(&gray, IMAGE_WIDTH, IMAGE_HEIGHT, FilterType::Triangle)
}
