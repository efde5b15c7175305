//! Core cataloging and preview logic.
//!
//! This module contains:
//! - Scanner: archive → catalog rows
//! - PreviewCache: incremental model previews and image extraction
//! - Denylist: known-bad resource hashes
//! - Manifest / probe helpers used by both

pub mod denylist;
pub mod manifest;
pub mod preview_cache;
pub mod probe;
pub mod scanner;

// Re-export commonly used types
pub use denylist::Denylist;
pub use manifest::Manifest;
pub use preview_cache::{
    ExtractOutcome, PreviewCache, PreviewError, PreviewOptions, PreviewOutcome, PreviewSummary,
};
pub use probe::{ImageProbe, ProbeOutcome, DEFAULT_MAX_IMAGE_PIXELS};
pub use scanner::{ArchiveReport, ScanError, ScanOptions, ScanOutcome, ScanSummary, Scanner};
