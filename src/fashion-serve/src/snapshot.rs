use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use image::GrayImage;
use log::debug;

use crate::Result;

/// Writes the resized grayscale input of each request to its own PNG file.
pub struct DebugSnapshots {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl DebugSnapshots {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        Ok(DebugSnapshots {
            dir: dir.to_path_buf(),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, image: &GrayImage) -> Result<PathBuf> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "processed-{}-{}.png",
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            seq
        ));

        image.save(&path)?;
        debug!("Pre-processed image saved to {}", path.display());

        Ok(path)
    }
}
