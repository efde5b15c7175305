//! Preview cache types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::hash::ContentHash;

/// Bump when the decode/render pipeline changes its output.
///
/// v5: model orientation recorded per entry
pub const PREVIEW_GENERATOR_VERSION: u32 = 5;

pub const DEFAULT_AXIS_FORWARD: &str = "-Z";
pub const DEFAULT_AXIS_UP: &str = "Y";

/// Output size variant. Each variant is an independent cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewVariant {
    Thumbnail,
    Full,
}

impl PreviewVariant {
    pub const ALL: [PreviewVariant; 2] = [PreviewVariant::Thumbnail, PreviewVariant::Full];

    /// Target (width, height) in pixels
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Thumbnail => (256, 144),
            Self::Full => (1280, 720),
        }
    }

    /// Folder under the working directory
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbs",
            Self::Full => "full",
        }
    }

    pub fn is_thumbnail(self) -> bool {
        matches!(self, Self::Thumbnail)
    }

    /// Path of a hash's image, relative to the working directory
    pub fn relative_path(self, sha1: &ContentHash) -> PathBuf {
        PathBuf::from(self.dir_name()).join(format!("{}.png", sha1))
    }
}

impl std::fmt::Display for PreviewVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thumbnail => write!(f, "thumbnail"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Model orientation convention (forward axis, up axis)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orientation {
    pub forward: String,
    pub up: String,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            forward: DEFAULT_AXIS_FORWARD.to_string(),
            up: DEFAULT_AXIS_UP.to_string(),
        }
    }
}

impl Orientation {
    /// Fill whichever axis is missing with the default
    pub fn from_parts(forward: Option<String>, up: Option<String>) -> Self {
        Self {
            forward: forward.unwrap_or_else(|| DEFAULT_AXIS_FORWARD.to_string()),
            up: up.unwrap_or_else(|| DEFAULT_AXIS_UP.to_string()),
        }
    }
}

/// A cached rendering of one model at one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub sha1: ContentHash,
    pub variant: PreviewVariant,
    /// Output path relative to the working directory
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub version: u32,
    pub texture_sha1: Option<ContentHash>,
    pub orientation: Orientation,
}

impl PreviewEntry {
    /// Whether this entry still describes what would be rendered now.
    ///
    /// The on-disk output check is left to the caller.
    pub fn matches(
        &self,
        current_version: u32,
        texture_sha1: Option<&ContentHash>,
        orientation: &Orientation,
    ) -> bool {
        self.version >= current_version
            && self.texture_sha1.as_ref() == texture_sha1
            && &self.orientation == orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u32, texture: Option<ContentHash>) -> PreviewEntry {
        PreviewEntry {
            sha1: ContentHash::of_bytes(b"model"),
            variant: PreviewVariant::Thumbnail,
            filename: "thumbs/x.png".to_string(),
            width: 256,
            height: 144,
            version,
            texture_sha1: texture,
            orientation: Orientation::default(),
        }
    }

    #[test]
    fn test_orientation_defaults_per_axis() {
        let o = Orientation::from_parts(Some("Y".to_string()), None);
        assert_eq!(o.forward, "Y");
        assert_eq!(o.up, "Y");
        assert_eq!(Orientation::from_parts(None, None), Orientation::default());
    }

    #[test]
    fn test_entry_matches() {
        let tex = ContentHash::of_bytes(b"tex");
        let e = entry(5, Some(tex.clone()));
        let o = Orientation::default();

        assert!(e.matches(5, Some(&tex), &o));
        assert!(e.matches(4, Some(&tex), &o));
        assert!(!e.matches(6, Some(&tex), &o));
        assert!(!e.matches(5, None, &o));
        assert!(!e.matches(5, Some(&ContentHash::of_bytes(b"other")), &o));
        assert!(!e.matches(5, Some(&tex), &Orientation::from_parts(Some("Z".into()), None)));
    }

    #[test]
    fn test_relative_paths() {
        let hash = ContentHash::of_bytes(b"abc");
        assert_eq!(
            PreviewVariant::Full.relative_path(&hash),
            PathBuf::from("full/a9993e364706816aba3e25717850c26c9cd0d89d.png")
        );
        assert_eq!(PreviewVariant::Thumbnail.resolution(), (256, 144));
    }
}
