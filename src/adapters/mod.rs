//! Adapter interfaces for external format and render tools.
//!
//! The catalog never decodes models or reverses asset obfuscation itself;
//! both are injected so the scanning and cache logic can run against fakes.

pub mod codec;
pub mod command;
pub mod passthrough;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Orientation, ResourceKind};

// Re-export the default adapters
pub use codec::CommandCodec;
pub use command::CommandRenderer;
pub use passthrough::PassthroughCodec;

/// Errors from the decode/render tools
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to decode model: {0}")]
    Decode(String),

    #[error("Renderer failed: {0}")]
    Render(String),

    #[error("Renderer not configured: {0}")]
    NotConfigured(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalization of producer-obfuscated asset bytes
pub trait AssetCodec: Send + Sync {
    /// Undo any obfuscation so standard decoders can read the bytes
    fn normalize(&self, data: &[u8], kind: &ResourceKind) -> Vec<u8>;

    /// `None` when the codec cannot tell
    fn is_obfuscated(&self, kind: &ResourceKind, data: &[u8]) -> Option<bool>;
}

/// Intermediate model representation handed from decode to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// File extension of the intermediate format, e.g. "obj"
    pub format: String,
    pub data: Vec<u8>,
}

/// Parameters of one render
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub texture: Option<PathBuf>,
    pub resolution: (u32, u32),
    pub orientation: Orientation,
}

/// Trait for the external model pipeline
#[async_trait]
pub trait ModelRenderer: Send + Sync {
    /// Human-readable renderer name
    fn name(&self) -> &str;

    /// Raw (normalized) model bytes to geometry
    async fn decode(&self, model: &[u8]) -> Result<Geometry, RenderError>;

    /// Rasterize geometry into a PNG at `output`
    async fn render(
        &self,
        geometry: &Geometry,
        request: &RenderRequest,
        output: &Path,
    ) -> Result<(), RenderError>;
}
