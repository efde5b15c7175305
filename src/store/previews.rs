//! Preview cache rows: what was rendered for each (model, variant), and with
//! which inputs.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::{upsert, Result};
use crate::domain::{ContentHash, Orientation, PreviewEntry, PreviewVariant};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS model_preview (
    sha1 TEXT NOT NULL,
    thumb INTEGER NOT NULL,
    filename TEXT,
    width INTEGER,
    height INTEGER,
    version INTEGER NOT NULL,
    texture_sha1 TEXT,
    axis_forward TEXT NOT NULL,
    axis_up TEXT NOT NULL,
    PRIMARY KEY (sha1, thumb)
);
";

pub struct PreviewStore {
    conn: Connection,
}

impl PreviewStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn get(&self, sha1: &ContentHash, variant: PreviewVariant) -> Result<Option<PreviewEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT filename, width, height, version, texture_sha1, axis_forward, axis_up
                 FROM model_preview WHERE sha1 = ?1 AND thumb = ?2",
                params![sha1, variant.is_thumbnail()],
                |r| {
                    Ok(PreviewEntry {
                        sha1: sha1.clone(),
                        variant,
                        filename: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        width: r.get::<_, Option<u32>>(1)?.unwrap_or_default(),
                        height: r.get::<_, Option<u32>>(2)?.unwrap_or_default(),
                        version: r.get(3)?,
                        texture_sha1: r.get(4)?,
                        orientation: Orientation {
                            forward: r.get(5)?,
                            up: r.get(6)?,
                        },
                    })
                },
            )
            .optional()?)
    }

    /// Record a finished render; durable on return
    pub fn upsert(&self, entry: &PreviewEntry) -> Result<bool> {
        upsert(
            &self.conn,
            "model_preview",
            &["sha1", "thumb"],
            &[
                ("sha1", &entry.sha1),
                ("thumb", &entry.variant.is_thumbnail()),
                ("filename", &entry.filename),
                ("width", &entry.width),
                ("height", &entry.height),
                ("version", &entry.version),
                ("texture_sha1", &entry.texture_sha1),
                ("axis_forward", &entry.orientation.forward),
                ("axis_up", &entry.orientation.up),
            ],
        )
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM model_preview", [], |r| r.get(0))?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(variant: PreviewVariant, version: u32) -> PreviewEntry {
        let sha1 = ContentHash::of_bytes(b"model");
        PreviewEntry {
            filename: variant.relative_path(&sha1).display().to_string(),
            sha1,
            variant,
            width: variant.resolution().0,
            height: variant.resolution().1,
            version,
            texture_sha1: Some(ContentHash::of_bytes(b"texture")),
            orientation: Orientation::default(),
        }
    }

    #[test]
    fn test_variants_are_separate_keys() {
        let store = PreviewStore::open_in_memory().unwrap();
        let thumb = entry(PreviewVariant::Thumbnail, 5);
        let full = entry(PreviewVariant::Full, 5);

        store.upsert(&thumb).unwrap();
        assert!(store.get(&thumb.sha1, PreviewVariant::Full).unwrap().is_none());

        store.upsert(&full).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get(&thumb.sha1, PreviewVariant::Thumbnail).unwrap(), Some(thumb));
        assert_eq!(store.get(&full.sha1, PreviewVariant::Full).unwrap(), Some(full));
    }

    #[test]
    fn test_upsert_replaces_entry() {
        let store = PreviewStore::open_in_memory().unwrap();
        store.upsert(&entry(PreviewVariant::Full, 4)).unwrap();

        let mut newer = entry(PreviewVariant::Full, 5);
        newer.texture_sha1 = None;
        assert!(store.upsert(&newer).unwrap());
        assert!(!store.upsert(&newer).unwrap());

        let stored = store.get(&newer.sha1, PreviewVariant::Full).unwrap().unwrap();
        assert_eq!(stored.version, 5);
        assert_eq!(stored.texture_sha1, None);
        assert_eq!(store.len().unwrap(), 1);
    }
}
