//! Per-label archive of accepted enrollment images.
//!
//! Layout: `<root>/<label>/<YYYYmmdd_HHMMSS_mmm>.jpg`. Not used for matching.

use chrono::Local;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive io: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone)]
pub struct ImageArchive {
    root: PathBuf,
}

impl ImageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn label_dir(&self, label: &str) -> PathBuf {
        self.root.join(label)
    }

    /// Save `image` under the label's directory with a timestamped name.
    pub fn save(&self, label: &str, image: &RgbImage) -> Result<PathBuf, ArchiveError> {
        let dir = self.label_dir(label);
        fs::create_dir_all(&dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut path = dir.join(format!("{stamp}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}_{n}.jpg"));
            n += 1;
        }

        image.save(&path).map_err(|source| ArchiveError::Encode {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(label, path = %path.display(), "sample image archived");
        Ok(path)
    }
}
