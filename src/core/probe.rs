//! Best-effort image inspection.
//!
//! Dimensions are catalog telemetry, not a correctness requirement: every
//! failure here degrades to "no dimensions" and the scan carries on.

use std::io::Cursor;

use image::{DynamicImage, ImageError, ImageReader};
use thiserror::Error;

use crate::adapters::AssetCodec;
use crate::domain::ResourceKind;

/// Pixel count above which an image is treated as a decompression bomb
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 2 * 89_478_485;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Unreadable image: {0}")]
    Unsupported(#[from] ImageError),

    #[error("Image too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of probing one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Dimensions { width: u32, height: u32 },
    Unsupported,
    TooLarge { width: u32, height: u32 },
}

/// Reads image headers (and pixels, for extraction) through a codec
pub struct ImageProbe<'a> {
    codec: &'a dyn AssetCodec,
    max_pixels: u64,
}

impl<'a> ImageProbe<'a> {
    pub fn new(codec: &'a dyn AssetCodec, max_pixels: u64) -> Self {
        Self { codec, max_pixels }
    }

    fn reader(&self, data: &[u8], kind: &ResourceKind) -> Result<ImageReader<Cursor<Vec<u8>>>, ProbeError> {
        let normalized = self.codec.normalize(data, kind);
        Ok(ImageReader::new(Cursor::new(normalized)).with_guessed_format()?)
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), ProbeError> {
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(ProbeError::TooLarge { width, height });
        }
        Ok(())
    }

    /// Width and height, reading headers only
    pub fn dimensions(&self, data: &[u8], kind: &ResourceKind) -> Result<(u32, u32), ProbeError> {
        let (width, height) = self.reader(data, kind)?.into_dimensions()?;
        self.check_size(width, height)?;
        Ok((width, height))
    }

    /// Same checks as [`ImageProbe::dimensions`], never fails
    pub fn probe(&self, data: &[u8], kind: &ResourceKind) -> ProbeOutcome {
        match self.dimensions(data, kind) {
            Ok((width, height)) => ProbeOutcome::Dimensions { width, height },
            Err(ProbeError::TooLarge { width, height }) => ProbeOutcome::TooLarge { width, height },
            Err(_) => ProbeOutcome::Unsupported,
        }
    }

    /// Full decode, refusing oversized images before allocating pixels
    pub fn decode(&self, data: &[u8], kind: &ResourceKind) -> Result<DynamicImage, ProbeError> {
        self.dimensions(data, kind)?;
        Ok(self.reader(data, kind)?.decode()?)
    }
}
