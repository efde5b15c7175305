//! Domain types for the catalog.
//!
//! This module contains the core data structures:
//! - ContentHash: SHA-1 identity of archives and resources
//! - Resource: entry classification and catalog rows
//! - Preview: cache keys and entries for rendered model previews

pub mod hash;
pub mod preview;
pub mod resource;

// Re-export commonly used types
pub use hash::{ContentHash, InvalidContentHash};
pub use preview::{Orientation, PreviewEntry, PreviewVariant, PREVIEW_GENERATOR_VERSION};
pub use resource::{ArchiveRecord, ExtentTracker, ImageExtent, ResourceKind, ResourceRecord};
