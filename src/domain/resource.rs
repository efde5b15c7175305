//! Archive entries and the rows they produce.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;

use super::hash::ContentHash;

/// Category of an archive entry, decided by its file extension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Png,
    Bmp,
    /// MascotCapsule model
    Mbac,
    /// JSR-184 model (counted, not cataloged)
    M3g,
    Gif,
    Jpeg,
    /// Anything else, keyed by the uppercased extension (may be empty)
    Other(String),
}

impl ResourceKind {
    /// Classify by suffix, case-insensitively
    pub fn classify(filename: &str) -> Self {
        match extension_of(filename).as_str() {
            ".PNG" => Self::Png,
            ".BMP" => Self::Bmp,
            ".MBAC" => Self::Mbac,
            ".M3G" => Self::M3g,
            ".GIF" => Self::Gif,
            ".JPG" | ".JPEG" => Self::Jpeg,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether entries of this kind get a Resource row
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Png | Self::Bmp | Self::Mbac)
    }

    /// Whether we try to read pixel dimensions
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Bmp | Self::Gif | Self::Jpeg)
    }

    /// Kinds the obfuscation probe understands
    pub fn is_obfuscation_candidate(&self) -> bool {
        matches!(self, Self::Bmp | Self::Mbac)
    }

    /// Textures extracted ahead of model rendering
    pub fn is_texture(&self) -> bool {
        matches!(self, Self::Png | Self::Bmp)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => f.write_str(".PNG"),
            Self::Bmp => f.write_str(".BMP"),
            Self::Mbac => f.write_str(".MBAC"),
            Self::M3g => f.write_str(".M3G"),
            Self::Gif => f.write_str(".GIF"),
            Self::Jpeg => f.write_str(".JPG"),
            Self::Other(ext) => f.write_str(ext),
        }
    }
}

/// Uppercased extension including the dot, or "" when there is none.
///
/// Mirrors path-suffix rules: a leading dot on the file name alone is not
/// an extension, and directory entries have none.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_uppercase()))
        .unwrap_or_default()
}

/// A probed image, used for the widest/tallest aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageExtent {
    pub width: u32,
    pub height: u32,
    pub path: String,
}

/// Running widest/tallest tracker. Ties keep the first image seen.
#[derive(Debug, Clone, Default)]
pub struct ExtentTracker {
    pub widest: Option<ImageExtent>,
    pub tallest: Option<ImageExtent>,
}

impl ExtentTracker {
    pub fn observe(&mut self, width: u32, height: u32, path: &str) {
        let extent = ImageExtent {
            width,
            height,
            path: path.to_string(),
        };

        if self.widest.as_ref().map_or(true, |w| width > w.width) {
            self.widest = Some(extent.clone());
        }
        if self.tallest.as_ref().map_or(true, |t| height > t.height) {
            self.tallest = Some(extent);
        }
    }
}

/// One distinct resource content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub sha1: ContentHash,
    /// Entry path as last seen
    pub filename: String,
    pub size: u64,
    /// Uppercased extension, e.g. ".MBAC"
    pub kind: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One distinct archive content, with its aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub sha1: ContentHash,
    pub title_id: i64,
    pub filename: String,
    pub size: u64,
    pub midlet_name: String,
    pub obfuscated: bool,
    pub mbac_count: u32,
    pub m3g_count: u32,
    pub filetypes: BTreeSet<String>,
    pub min_timestamp: Option<NaiveDateTime>,
    pub max_timestamp: Option<NaiveDateTime>,
    pub widest: Option<ImageExtent>,
    pub tallest: Option<ImageExtent>,
    pub icon: Option<Vec<u8>>,
    pub entry_count: u32,
    pub contents_size: u64,
    pub contents_sha1: ContentHash,
}

impl ArchiveRecord {
    /// Extensions as one sorted, space-separated string
    pub fn filetypes_joined(&self) -> String {
        self.filetypes.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}
