//! Reader for the Fashion-MNIST IDX files.
//!
//! Images are stored as `0x00000803 count rows cols` followed by `count * rows
//! * cols` bytes, labels as `0x00000801 count` followed by `count` bytes. All
//! header fields are big-endian `u32`.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::labels::NUM_CLASSES;
use crate::preprocess::{IMAGE_HEIGHT, IMAGE_WIDTH, PIXELS};
use crate::{Error, Result};

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn prefix(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }

    pub fn images_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}-images-idx3-ubyte", self.prefix()))
    }

    pub fn labels_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}-labels-idx1-ubyte", self.prefix()))
    }
}

impl std::str::FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(Error::Dataset(format!(
                "unknown split '{}', expected 'train' or 'test'",
                other
            ))),
        }
    }
}

/// Labeled 28×28 grayscale images, pixels kept as raw `u8` intensities.
#[derive(Debug)]
pub struct Dataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

impl Dataset {
    pub fn load(dir: &Path, split: Split) -> Result<Self> {
        let images_path = split.images_path(dir);
        let labels_path = split.labels_path(dir);

        let images = fs::read(&images_path).map_err(|e| {
            Error::Dataset(format!("could not read {}: {}", images_path.display(), e))
        })?;
        let labels = fs::read(&labels_path).map_err(|e| {
            Error::Dataset(format!("could not read {}: {}", labels_path.display(), e))
        })?;

        let dataset = Dataset::from_idx(&images, &labels)?;
        info!(
            "Loaded {} samples from {}",
            dataset.len(),
            images_path.display()
        );

        Ok(dataset)
    }

    pub fn from_idx(images: &[u8], labels: &[u8]) -> Result<Self> {
        let pixels = parse_images(images)?;
        let labels = parse_labels(labels)?;

        if pixels.len() / PIXELS != labels.len() {
            return Err(Error::Dataset(format!(
                "{} images but {} labels",
                pixels.len() / PIXELS,
                labels.len()
            )));
        }

        Ok(Dataset { pixels, labels })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.labels.get(index).map(|l| *l as usize)
    }

    pub fn image(&self, index: usize) -> Option<&[u8]> {
        self.pixels.get(index * PIXELS..(index + 1) * PIXELS)
    }

    /// Index of the first sample labeled `class`.
    pub fn first_of_class(&self, class: usize) -> Option<usize> {
        self.labels.iter().position(|l| *l as usize == class)
    }
}

fn read_u32(data: &[u8], field: usize) -> Result<u32> {
    let start = field * 4;
    data.get(start..start + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Dataset("truncated IDX header".to_owned()))
}

fn check_magic(data: &[u8], expected: u32) -> Result<()> {
    let magic = read_u32(data, 0)?;
    if magic != expected {
        return Err(Error::Dataset(format!(
            "bad magic number {:#010x}, expected {:#010x}",
            magic, expected
        )));
    }
    Ok(())
}

fn body(data: &[u8], header_fields: usize, len: usize) -> Result<&[u8]> {
    let start = header_fields * 4;
    match data.len().checked_sub(start) {
        Some(n) if n == len => Ok(&data[start..]),
        Some(n) => Err(Error::Dataset(format!(
            "expected {} bytes of data, found {}",
            len, n
        ))),
        None => Err(Error::Dataset("truncated IDX header".to_owned())),
    }
}

fn parse_images(data: &[u8]) -> Result<Vec<u8>> {
    check_magic(data, IMAGES_MAGIC)?;

    let count = read_u32(data, 1)? as usize;
    let rows = read_u32(data, 2)?;
    let cols = read_u32(data, 3)?;

    if (rows, cols) != (IMAGE_HEIGHT, IMAGE_WIDTH) {
        return Err(Error::Dataset(format!(
            "images are {}x{}, expected {}x{}",
            rows, cols, IMAGE_HEIGHT, IMAGE_WIDTH
        )));
    }

    Ok(body(data, 4, count * PIXELS)?.to_vec())
}

fn parse_labels(data: &[u8]) -> Result<Vec<u8>> {
    check_magic(data, LABELS_MAGIC)?;

    let count = read_u32(data, 1)? as usize;
    let labels = body(data, 2, count)?;

    if let Some(bad) = labels.iter().find(|l| **l as usize >= NUM_CLASSES) {
        return Err(Error::Dataset(format!("label {} out of range", bad)));
    }

    Ok(labels.to_vec())
}
