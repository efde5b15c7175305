//! JAR manifest reading.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use zip::result::ZipError;
use zip::ZipArchive;

use super::scanner::ScanError;

/// Entry names tried in order before falling back to a case-insensitive search
pub const MANIFEST_CANDIDATES: [&str; 2] = ["META-INF/MANIFEST.MF", "META-INF/manifest.mf"];

/// Key holding the MIDlet suite name; an archive without it is rejected
pub const MIDLET_NAME: &str = "MIDlet-Name";

/// Key of the first MIDlet: "<name>, <icon path>, <class>"
pub const MIDLET_1: &str = "MIDlet-1";

/// Parsed `key: value` pairs of a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse manifest text. Blank lines and lines without ':' are skipped;
    /// later duplicates win.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Like [`Manifest::get`], but a missing key is fatal for the archive
    pub fn require(&self, key: &str) -> Result<&str, ScanError> {
        self.get(key)
            .ok_or_else(|| ScanError::MissingManifestKey(key.to_string()))
    }

    /// Internal path of the suite icon, without a leading '/'
    pub fn icon_path(&self) -> Option<&str> {
        let icon = self.get(MIDLET_1)?.split(',').nth(1)?.trim();
        let icon = icon.strip_prefix('/').unwrap_or(icon);
        (!icon.is_empty()).then_some(icon)
    }
}

/// Name of the manifest entry inside `archive`, if any variant exists
pub fn find_manifest<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    for candidate in MANIFEST_CANDIDATES {
        if archive.index_for_name(candidate).is_some() {
            return Some(candidate.to_string());
        }
    }

    archive
        .file_names()
        .find(|name| name.eq_ignore_ascii_case(MANIFEST_CANDIDATES[0]))
        .map(str::to_string)
}

/// Locate and parse the manifest. A missing manifest is fatal.
pub fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Manifest, ScanError> {
    let name = find_manifest(archive).ok_or(ScanError::MissingManifest)?;

    let mut raw = Vec::new();
    match archive.by_name(&name) {
        Ok(mut file) => {
            file.read_to_end(&mut raw)?;
        }
        Err(ZipError::FileNotFound) => return Err(ScanError::MissingManifest),
        Err(e) => return Err(e.into()),
    }

    Ok(Manifest::parse(&String::from_utf8_lossy(&raw)))
}
