// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! PNG dumps of downloaded frames.

use crate::multibuffer::Slot;
use crate::pixel_formats::PixelBuffer;
use png::{BitDepth, ColorType};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Where downloaded frames are written.
///
/// Files are named `{prefix}_{slot}.png`, so at most two files exist per directory and each
/// is overwritten every other frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub directory: PathBuf,
    pub prefix: String,
}

impl DumpConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DumpConfig {
            directory: directory.into(),
            prefix: "PBO".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn path_for(&self, slot: Slot) -> PathBuf {
        self.directory.join(format!("{}_{}.png", self.prefix, slot))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("can't write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't encode png: {0}")]
    Encoding(#[from] png::EncodingError),
}

/// Writes `image` as an 8-bit RGBA PNG.
pub fn write_png(path: &Path, image: &PixelBuffer) -> Result<(), DumpError> {
    let file = File::create(path).map_err(|source| DumpError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width(), image.height());
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_bytes())?;
    writer.finish()?;
    Ok(())
}

/// Writes `image` to the slot's file under `config`.
pub(crate) fn dump(config: &DumpConfig, slot: Slot, image: &PixelBuffer) -> Result<PathBuf, DumpError> {
    let path = config.path_for(slot);
    write_png(&path, image)?;
    Ok(path)
}
