//! Archive cataloging.
//!
//! One pass per archive: hash it, read its manifest, walk every entry
//! (classify, aggregate, hash, probe), then upsert the resource rows, the
//! archive↔resource links and finally the archive row, all in a single
//! transaction. A fatal error leaves no trace of the archive in the catalog.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use super::denylist::Denylist;
use super::manifest::{read_manifest, MIDLET_NAME};
use super::probe::{ImageProbe, ProbeOutcome, DEFAULT_MAX_IMAGE_PIXELS};
use crate::adapters::AssetCodec;
use crate::domain::resource::extension_of;
use crate::domain::{ArchiveRecord, ContentHash, ExtentTracker, ResourceKind, ResourceRecord};
use crate::store::{Catalog, StoreError};

/// Errors that abort the scan of one archive
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Archive has no manifest")]
    MissingManifest,

    #[error("Manifest has no {0} entry")]
    MissingManifestKey(String),

    #[error("Cannot derive a title from path: {0}")]
    NoTitle(PathBuf),

    #[error("Invalid archive: {0}")]
    Zip(#[from] ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Scanner settings
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Folder name whose archives are not cataloged at all
    pub uncategorized_title: String,

    /// Decompression-bomb guard for image probing
    pub max_image_pixels: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            uncategorized_title: "Other".to_string(),
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
        }
    }
}

/// What one archive contributed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub sha1: ContentHash,
    pub title: String,
    /// Tracked resource entries cataloged (before content dedup)
    pub resources: u32,
    /// Tracked entries dropped by the denylist
    pub denylisted: u32,
    /// Rows inserted or modified; zero on an unchanged rescan
    pub rows_changed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Cataloged(ArchiveReport),
    /// Archive sits under the uncategorized folder
    Skipped { title: String },
}

/// Totals over a batch
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub cataloged: Vec<ArchiveReport>,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, ScanError)>,
}

impl ScanSummary {
    pub fn rows_changed(&self) -> u32 {
        self.cataloged.iter().map(|r| r.rows_changed).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Catalogs archives into a [`Catalog`]
pub struct Scanner<'a> {
    catalog: &'a Catalog,
    denylist: Denylist,
    codec: &'a dyn AssetCodec,
    probe: ImageProbe<'a>,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(
        catalog: &'a Catalog,
        denylist: Denylist,
        codec: &'a dyn AssetCodec,
        options: ScanOptions,
    ) -> Self {
        Self {
            catalog,
            denylist,
            codec,
            probe: ImageProbe::new(codec, options.max_image_pixels),
            options,
        }
    }

    /// Scan every archive. A failing archive is logged and rolled back;
    /// the rest of the batch still runs.
    pub fn scan_all(&self, paths: &[PathBuf]) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for path in paths {
            match self.scan_archive(path) {
                Ok(ScanOutcome::Cataloged(report)) => summary.cataloged.push(report),
                Ok(ScanOutcome::Skipped { .. }) => summary.skipped += 1,
                Err(e) => {
                    error!(path = %path.display(), "Failed to catalog archive: {}", e);
                    summary.failed.push((path.clone(), e));
                }
            }
        }

        summary
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn scan_archive(&self, path: &Path) -> Result<ScanOutcome, ScanError> {
        let title = title_for(path)?;
        if title == self.options.uncategorized_title {
            debug!(%title, "Skipping uncategorized archive");
            return Ok(ScanOutcome::Skipped { title });
        }

        info!(%title, "Scanning archive");

        let size = std::fs::metadata(path)?.len();
        let sha1 = ContentHash::of_file(path)?;

        let mut zip = ZipArchive::new(BufReader::new(File::open(path)?))?;
        let manifest = read_manifest(&mut zip)?;
        let midlet_name = manifest.require(MIDLET_NAME)?.to_string();

        let tx = self.catalog.begin()?;
        let mut report = ArchiveReport {
            sha1: sha1.clone(),
            title: title.clone(),
            resources: 0,
            denylisted: 0,
            rows_changed: 0,
        };

        let mut filetypes = BTreeSet::new();
        let mut min_timestamp: Option<NaiveDateTime> = None;
        let mut max_timestamp: Option<NaiveDateTime> = None;
        let mut extents = ExtentTracker::default();
        let mut contents = Sha1::new();
        let mut contents_size = 0u64;
        let mut mbac_count = 0u32;
        let mut m3g_count = 0u32;
        let mut obfuscated = false;
        let mut obfuscation_probed = false;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let name = entry.name().to_string();
            let entry_size = entry.size();
            let kind = ResourceKind::classify(&name);

            filetypes.insert(extension_of(&name));

            if let Some(timestamp) = entry.last_modified().and_then(entry_timestamp) {
                min_timestamp = Some(min_timestamp.map_or(timestamp, |t| t.min(timestamp)));
                max_timestamp = Some(max_timestamp.map_or(timestamp, |t| t.max(timestamp)));
            }

            match kind {
                ResourceKind::Mbac => mbac_count += 1,
                ResourceKind::M3g => m3g_count += 1,
                _ => {}
            }

            let in_contents = !name.to_uppercase().contains("MANIFEST.MF");
            if in_contents {
                contents_size += entry_size;
            }

            let wants_obfuscation_probe = !obfuscation_probed && kind.is_obfuscation_candidate();
            if !(kind.is_tracked() || kind.is_image() || wants_obfuscation_probe) {
                // Nothing else needs the bytes; stream them into the digest
                if in_contents {
                    io::copy(&mut entry, &mut contents)?;
                }
                continue;
            }

            let mut data = Vec::with_capacity(entry_size.min(64 * 1024 * 1024) as usize);
            entry.read_to_end(&mut data)?;
            drop(entry);

            if in_contents {
                contents.update(&data);
            }

            if wants_obfuscation_probe {
                // Only the first candidate decides for the whole archive
                obfuscation_probed = true;
                obfuscated = self.codec.is_obfuscated(&kind, &data) == Some(true);
                debug!(entry = %name, obfuscated, "Probed obfuscation");
            }

            let resource_sha1 = kind.is_tracked().then(|| ContentHash::of_bytes(&data));

            let mut dimensions = None;
            if kind.is_image() {
                match self.probe.probe(&data, &kind) {
                    ProbeOutcome::Dimensions { width, height } => {
                        extents.observe(width, height, &name);
                        dimensions = Some((width, height));
                    }
                    ProbeOutcome::TooLarge { width, height } => {
                        warn!(entry = %name, width, height, "Image exceeds pixel limit, not probed");
                    }
                    ProbeOutcome::Unsupported => {
                        debug!(entry = %name, "Image could not be decoded");
                    }
                }
            }

            // Denylisted images still count toward the extents above
            if let Some(hash) = resource_sha1.as_ref().filter(|h| self.denylist.is_bad(h)) {
                info!(
                    entry = %name,
                    %hash,
                    reason = self.denylist.reason(hash).unwrap_or_default(),
                    "Skipping denylisted resource"
                );
                report.denylisted += 1;
                continue;
            }

            if let Some(resource_sha1) = resource_sha1 {
                let record = ResourceRecord {
                    sha1: resource_sha1,
                    filename: name.clone(),
                    size: entry_size,
                    kind: extension_of(&name),
                    width: dimensions.map(|(w, _)| w),
                    height: dimensions.map(|(_, h)| h),
                };

                report.resources += 1;
                if self.catalog.upsert_resource(&record)? {
                    report.rows_changed += 1;
                }
                if self.catalog.link_archive_resource(&sha1, &record.sha1)? {
                    report.rows_changed += 1;
                }
            }
        }

        let icon = match manifest.icon_path() {
            Some(icon_path) => read_entry(&mut zip, icon_path)?,
            None => None,
        };
        if icon.is_none() {
            warn!("No icon found in archive");
        }

        let record = ArchiveRecord {
            sha1: sha1.clone(),
            title_id: self.catalog.title_id(&title)?,
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size,
            midlet_name,
            obfuscated,
            mbac_count,
            m3g_count,
            filetypes,
            min_timestamp,
            max_timestamp,
            widest: extents.widest,
            tallest: extents.tallest,
            icon,
            entry_count: zip.len() as u32,
            contents_size,
            contents_sha1: ContentHash::from_digest(contents),
        };

        if self.catalog.upsert_archive(&record)? {
            report.rows_changed += 1;
        }

        tx.commit().map_err(StoreError::from)?;

        info!(
            %sha1,
            resources = report.resources,
            denylisted = report.denylisted,
            rows_changed = report.rows_changed,
            "Cataloged archive"
        );

        Ok(ScanOutcome::Cataloged(report))
    }
}

/// Title of an archive: the name of the folder holding it
pub fn title_for(path: &Path) -> Result<String, ScanError> {
    let from = |p: &Path| {
        p.parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().to_string())
    };

    from(path)
        .or_else(|| std::fs::canonicalize(path).ok().and_then(|p| from(&p)))
        .ok_or_else(|| ScanError::NoTitle(path.to_path_buf()))
}

/// Read a whole entry by name; `None` if it does not exist
pub fn read_entry<R: Read + io::Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ScanError> {
    match zip.by_name(name) {
        Ok(mut file) => {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok(Some(data))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn entry_timestamp(dt: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(dt.year()), u32::from(dt.month()), u32::from(dt.day()))?
        .and_hms_opt(u32::from(dt.hour()), u32::from(dt.minute()), u32::from(dt.second()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_parent_folder() {
        assert_eq!(
            title_for(Path::new("/jars/Galaxy on Fire/gof_240x320.jar")).unwrap(),
            "Galaxy on Fire"
        );
    }

    #[test]
    fn test_entry_timestamp() {
        let dt = zip::DateTime::from_date_and_time(2006, 5, 4, 13, 37, 42).unwrap();
        assert_eq!(
            entry_timestamp(dt),
            NaiveDate::from_ymd_opt(2006, 5, 4).and_then(|d| d.and_hms_opt(13, 37, 42))
        );
    }
}
