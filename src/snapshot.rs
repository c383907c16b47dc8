//! Still-image snapshots of the converted preview frame.

use crate::errors::CaptureError;
use crate::render::SnapshotImage;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Encodings a snapshot can be saved as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Png,
    Jpeg,
    Bmp,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Png => "png",
            SnapshotFormat::Jpeg => "jpg",
            SnapshotFormat::Bmp => "bmp",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            SnapshotFormat::Png => ImageFormat::Png,
            SnapshotFormat::Jpeg => ImageFormat::Jpeg,
            SnapshotFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// Parse a user-facing name like `"png"` or `"Jpeg"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(SnapshotFormat::Png),
            "jpeg" | "jpg" => Some(SnapshotFormat::Jpeg),
            "bmp" => Some(SnapshotFormat::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encode a converted BGRX frame and write it to `directory` under a
/// timestamped `Snapshot` name. Returns the written path.
pub fn save_snapshot(
    directory: &Path,
    format: SnapshotFormat,
    image: &SnapshotImage,
) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(directory)?;

    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S%.3f");
    let path = directory.join(format!("Snapshot {stamp}.{}", format.extension()));

    let mut rgba = RgbaImage::new(image.width, image.height);
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let i = (y as usize * image.width as usize + x as usize) * 4;
        let [b, g, r] = [image.bgra[i], image.bgra[i + 1], image.bgra[i + 2]];
        *pixel = image::Rgba([r, g, b, 255]);
    }

    rgba.save_with_format(&path, format.image_format())
        .map_err(|e| CaptureError::ConversionFailure(format!("snapshot encode failed: {e}")))?;

    Ok(path)
}
