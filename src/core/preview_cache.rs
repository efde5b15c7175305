//! Incremental model previews.
//!
//! A preview is re-rendered only when one of its inputs moved: the generator
//! version, the texture the model maps to, the title's orientation
//! convention, or the output file itself going missing. Everything else is
//! reported as up to date, so a batch can be interrupted and re-run freely.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use super::denylist::Denylist;
use super::probe::{ImageProbe, ProbeError, DEFAULT_MAX_IMAGE_PIXELS};
use super::scanner::{title_for, ScanError};
use crate::adapters::{AssetCodec, ModelRenderer, RenderError, RenderRequest};
use crate::domain::{ContentHash, PreviewEntry, PreviewVariant, ResourceKind, PREVIEW_GENERATOR_VERSION};
use crate::store::{Catalog, PreviewStore, ReferenceStore, StoreError};

/// File name of the preview cache database inside the working directory
pub const PREVIEW_DB_FILENAME: &str = "previews.sqlite";

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Invalid archive: {0}")]
    Zip(#[from] ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    /// Entries recorded with an older version are re-rendered
    pub generator_version: u32,
    pub max_image_pixels: u64,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            generator_version: PREVIEW_GENERATOR_VERSION,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
        }
    }
}

/// Result of one model preview request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    UpToDate,
    Rendered,
    Denylisted,
}

/// Result of one image extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted,
    /// Both output files already exist
    Present,
    Denylisted,
}

/// Counters over a preview batch
#[derive(Debug, Default)]
pub struct PreviewSummary {
    pub images_extracted: usize,
    pub images_present: usize,
    pub image_failures: usize,
    pub rendered: usize,
    pub up_to_date: usize,
    pub denylisted: usize,
    pub render_failures: usize,
    pub failed_archives: Vec<(PathBuf, PreviewError)>,
}

impl PreviewSummary {
    pub fn is_success(&self) -> bool {
        self.failed_archives.is_empty() && self.render_failures == 0
    }

    fn archive_failed(&mut self, path: &Path, err: PreviewError) {
        error!(path = %path.display(), "Failed to process archive: {}", err);
        if !self.failed_archives.iter().any(|(p, _)| p == path) {
            self.failed_archives.push((path.to_path_buf(), err));
        }
    }
}

/// Preview cache rooted at a working directory
pub struct PreviewCache<'a> {
    catalog: &'a Catalog,
    reference: &'a ReferenceStore,
    store: PreviewStore,
    workdir: PathBuf,
    denylist: Denylist,
    codec: &'a dyn AssetCodec,
    renderer: &'a dyn ModelRenderer,
    options: PreviewOptions,
}

impl<'a> PreviewCache<'a> {
    /// Open the cache in `workdir`, creating the folders and the cache
    /// database as needed. Starts with the built-in denylist.
    pub fn open(
        workdir: &Path,
        catalog: &'a Catalog,
        reference: &'a ReferenceStore,
        codec: &'a dyn AssetCodec,
        renderer: &'a dyn ModelRenderer,
    ) -> Result<Self, PreviewError> {
        for variant in PreviewVariant::ALL {
            fs::create_dir_all(workdir.join(variant.dir_name()))?;
        }
        let store = PreviewStore::open(&workdir.join(PREVIEW_DB_FILENAME))?;

        Ok(Self {
            catalog,
            reference,
            store,
            workdir: workdir.to_path_buf(),
            denylist: Denylist::builtin(),
            codec,
            renderer,
            options: PreviewOptions::default(),
        })
    }

    pub fn with_denylist(mut self, denylist: Denylist) -> Self {
        self.denylist = denylist;
        self
    }

    pub fn with_options(mut self, options: PreviewOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &PreviewStore {
        &self.store
    }

    /// Texture content hash a model depends on, if it has one
    fn texture_for_model(
        &self,
        title: &str,
        archive: &ContentHash,
        model_path: &str,
    ) -> Result<Option<ContentHash>, PreviewError> {
        let Some(texture_path) = self
            .reference
            .texture_path_for_model(title, archive, model_path)?
        else {
            debug!("No texture mapped");
            return Ok(None);
        };

        let texture = self
            .catalog
            .find_resource_by_filename(&texture_path, Some(archive))?;
        if texture.is_none() {
            warn!(texture = %texture_path, "Mapped texture is not in the catalog");
        }
        Ok(texture)
    }

    /// Bring one (model, variant) preview up to date
    #[instrument(skip_all, fields(%title, model = %model_path, %variant))]
    pub async fn update_model_preview(
        &self,
        title: &str,
        archive: &ContentHash,
        model_path: &str,
        data: &[u8],
        variant: PreviewVariant,
    ) -> Result<PreviewOutcome, PreviewError> {
        let sha1 = ContentHash::of_bytes(data);
        if self.denylist.is_bad(&sha1) {
            info!(%sha1, "Skipping denylisted model");
            return Ok(PreviewOutcome::Denylisted);
        }

        // Only a texture whose image is on disk reaches the renderer, so only
        // that one is recorded; extracting it later invalidates the entry.
        let mapped = self.texture_for_model(title, archive, model_path)?;
        let (texture_sha1, texture) = match mapped {
            Some(t) => {
                let path = self.workdir.join(PreviewVariant::Full.relative_path(&t));
                if path.is_file() {
                    (Some(t), Some(path))
                } else {
                    warn!(texture = %t, "Texture image not extracted, rendering untextured");
                    (None, None)
                }
            }
            None => (None, None),
        };
        let orientation = self.reference.orientation_for_title(title)?;
        let relative = variant.relative_path(&sha1);
        let output = self.workdir.join(&relative);

        if let Some(entry) = self.store.get(&sha1, variant)? {
            if entry.matches(self.options.generator_version, texture_sha1.as_ref(), &orientation)
                && output.is_file()
            {
                info!(path = %relative.display(), "Up to date");
                return Ok(PreviewOutcome::UpToDate);
            }
        }

        let resolution = variant.resolution();
        info!(
            path = %relative.display(),
            texture = ?texture,
            forward = %orientation.forward,
            up = %orientation.up,
            renderer = self.renderer.name(),
            "Rendering"
        );

        let normalized = self.codec.normalize(data, &ResourceKind::Mbac);
        let geometry = self.renderer.decode(&normalized).await?;
        let request = RenderRequest {
            texture,
            resolution,
            orientation: orientation.clone(),
        };
        self.renderer.render(&geometry, &request, &output).await?;

        self.store.upsert(&PreviewEntry {
            sha1,
            variant,
            filename: relative.to_string_lossy().into_owned(),
            width: resolution.0,
            height: resolution.1,
            version: self.options.generator_version,
            texture_sha1,
            orientation,
        })?;

        Ok(PreviewOutcome::Rendered)
    }

    /// Save an image resource as a full-size PNG plus a thumbnail
    pub fn extract_image(
        &self,
        name: &str,
        data: &[u8],
        kind: &ResourceKind,
    ) -> Result<ExtractOutcome, PreviewError> {
        let sha1 = ContentHash::of_bytes(data);
        if self.denylist.is_bad(&sha1) {
            return Ok(ExtractOutcome::Denylisted);
        }

        let full = self.workdir.join(PreviewVariant::Full.relative_path(&sha1));
        let thumb = self.workdir.join(PreviewVariant::Thumbnail.relative_path(&sha1));
        if full.is_file() && thumb.is_file() {
            return Ok(ExtractOutcome::Present);
        }

        debug!(entry = %name, %sha1, "Extracting image");

        let probe = ImageProbe::new(self.codec, self.options.max_image_pixels);
        let image = probe.decode(data, kind)?;
        image.save_with_format(&full, ImageFormat::Png)?;

        // Shrink to fit, never enlarge
        let (max_width, max_height) = PreviewVariant::Thumbnail.resolution();
        if image.width() > max_width || image.height() > max_height {
            image
                .thumbnail(max_width, max_height)
                .save_with_format(&thumb, ImageFormat::Png)?;
        } else {
            image.save_with_format(&thumb, ImageFormat::Png)?;
        }

        Ok(ExtractOutcome::Extracted)
    }

    /// Full batch: image extraction, then thumbnails, then full-size renders.
    ///
    /// `resource` limits the model passes to entries with that exact path.
    pub async fn update_previews(
        &self,
        archives: &[PathBuf],
        resource: Option<&str>,
    ) -> Result<PreviewSummary, PreviewError> {
        let mut summary = PreviewSummary::default();

        // Textures must exist before any model references them
        for path in archives {
            if let Err(e) = self.extract_archive_images(path, &mut summary) {
                summary.archive_failed(path, e);
            }
        }

        for variant in PreviewVariant::ALL {
            for path in archives {
                match self.render_archive_models(path, variant, resource, &mut summary).await {
                    Ok(()) => {}
                    Err(PreviewError::Store(e)) => return Err(e.into()),
                    Err(e) => summary.archive_failed(path, e),
                }
            }
        }

        info!(
            images_extracted = summary.images_extracted,
            rendered = summary.rendered,
            up_to_date = summary.up_to_date,
            denylisted = summary.denylisted,
            render_failures = summary.render_failures,
            "Preview batch finished"
        );

        Ok(summary)
    }

    fn extract_archive_images(
        &self,
        path: &Path,
        summary: &mut PreviewSummary,
    ) -> Result<(), PreviewError> {
        let mut zip = open_zip(path)?;

        for index in 0..zip.len() {
            let (name, kind, data) = {
                let mut entry = zip.by_index(index)?;
                let name = entry.name().to_string();
                let kind = ResourceKind::classify(&name);
                if !kind.is_texture() {
                    continue;
                }
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                (name, kind, data)
            };

            match self.extract_image(&name, &data, &kind) {
                Ok(ExtractOutcome::Extracted) => summary.images_extracted += 1,
                Ok(ExtractOutcome::Present) => summary.images_present += 1,
                Ok(ExtractOutcome::Denylisted) => summary.denylisted += 1,
                Err(e) => {
                    warn!(archive = %path.display(), entry = %name, "Image extraction failed: {}", e);
                    summary.image_failures += 1;
                }
            }
        }

        Ok(())
    }

    async fn render_archive_models(
        &self,
        path: &Path,
        variant: PreviewVariant,
        resource: Option<&str>,
        summary: &mut PreviewSummary,
    ) -> Result<(), PreviewError> {
        let title = title_for(path)?;
        let archive = ContentHash::of_file(path)?;
        let mut zip = open_zip(path)?;

        for index in 0..zip.len() {
            let (name, data) = {
                let mut entry = zip.by_index(index)?;
                let name = entry.name().to_string();
                if resource.is_some_and(|r| r != name)
                    || ResourceKind::classify(&name) != ResourceKind::Mbac
                {
                    continue;
                }
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                (name, data)
            };

            match self
                .update_model_preview(&title, &archive, &name, &data, variant)
                .await
            {
                Ok(PreviewOutcome::Rendered) => summary.rendered += 1,
                Ok(PreviewOutcome::UpToDate) => summary.up_to_date += 1,
                Ok(PreviewOutcome::Denylisted) => summary.denylisted += 1,
                Err(PreviewError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(archive = %path.display(), model = %name, %variant, "Preview failed: {}", e);
                    summary.render_failures += 1;
                }
            }
        }

        Ok(())
    }
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>, PreviewError> {
    Ok(ZipArchive::new(BufReader::new(File::open(path)?))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PassthroughCodec;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn dimensions(path: &Path) -> (u32, u32) {
        image::image_dimensions(path).unwrap()
    }

    #[test]
    fn test_extract_image_writes_full_and_thumbnail() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let reference = ReferenceStore::from_sql("").unwrap();
        let renderer = crate::adapters::CommandRenderer::default();
        let cache =
            PreviewCache::open(dir.path(), &catalog, &reference, &PassthroughCodec, &renderer).unwrap();

        let big = png(640, 480);
        let sha1 = ContentHash::of_bytes(&big);
        assert_eq!(
            cache.extract_image("bg.png", &big, &ResourceKind::Png).unwrap(),
            ExtractOutcome::Extracted
        );
        assert_eq!(
            dimensions(&dir.path().join(PreviewVariant::Full.relative_path(&sha1))),
            (640, 480)
        );
        // 640x480 fits 256x144 at 192x144
        assert_eq!(
            dimensions(&dir.path().join(PreviewVariant::Thumbnail.relative_path(&sha1))),
            (192, 144)
        );

        assert_eq!(
            cache.extract_image("bg.png", &big, &ResourceKind::Png).unwrap(),
            ExtractOutcome::Present
        );
    }

    #[test]
    fn test_small_image_is_not_enlarged() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let reference = ReferenceStore::from_sql("").unwrap();
        let renderer = crate::adapters::CommandRenderer::default();
        let cache =
            PreviewCache::open(dir.path(), &catalog, &reference, &PassthroughCodec, &renderer).unwrap();

        let small = png(16, 16);
        let sha1 = ContentHash::of_bytes(&small);
        cache.extract_image("t.png", &small, &ResourceKind::Png).unwrap();
        assert_eq!(
            dimensions(&dir.path().join(PreviewVariant::Thumbnail.relative_path(&sha1))),
            (16, 16)
        );
    }

    #[test]
    fn test_undecodable_image_is_an_error() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let reference = ReferenceStore::from_sql("").unwrap();
        let renderer = crate::adapters::CommandRenderer::default();
        let cache =
            PreviewCache::open(dir.path(), &catalog, &reference, &PassthroughCodec, &renderer).unwrap();

        assert!(matches!(
            cache.extract_image("x.bmp", b"garbage", &ResourceKind::Bmp),
            Err(PreviewError::Probe(_))
        ));
    }
}
