//! jarcat - Content-addressed catalog of J2ME game archives
//!
//! Catalogs `.jar` archives (titles, archives, deduplicated resources) into
//! SQLite and keeps an incremental cache of rendered MBAC model previews.
//!
//! # Architecture
//!
//! Everything is keyed by SHA-1 content hash:
//! - Rescanning an unchanged archive writes nothing
//! - Identical resources across archives are stored once
//! - A preview is re-rendered only when its inputs changed
//!
//! # Modules
//!
//! - `adapters`: Asset codec and model renderer interfaces
//! - `core`: Scanner, preview cache, denylist
//! - `domain`: Data structures (ContentHash, ArchiveRecord, PreviewEntry)
//! - `store`: Catalog, reference and preview databases
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Catalog every archive, one folder per title
//! jarcat catalog catalog.sqlite 'jars/*/*.jar'
//!
//! # Extract images and render model previews
//! jarcat previews catalog.sqlite work 'jars/*/*.jar'
//!
//! # Browse
//! jarcat show catalog.sqlite "Galaxy on Fire"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{Denylist, PreviewCache, Scanner};
pub use domain::{ContentHash, PreviewVariant, ResourceKind};
pub use store::{Catalog, PlaintextDb, PreviewStore, ReferenceStore};
