//! Hand-curated reference data about titles.
//!
//! Lives in a checked-in plaintext SQL file. The preview cache reads two
//! things from it: each title's model orientation convention, and which
//! texture a given model should be rendered with.

use std::path::Path;

use rusqlite::{params, OptionalExtension};

use super::plaintext::PlaintextDb;
use super::Result;
use crate::domain::{ContentHash, Orientation};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS title (
    name TEXT PRIMARY KEY,
    model_axis_forward TEXT,
    model_axis_up TEXT
);

CREATE TABLE IF NOT EXISTS model_texture (
    title_name TEXT NOT NULL,
    archive_sha1 TEXT,
    model_path TEXT NOT NULL,
    texture_path TEXT NOT NULL
);
";

/// Read-only lookups over the reference database
pub struct ReferenceStore {
    db: PlaintextDb,
    /// Older files carry `model_texture` without the `archive_sha1` column
    archive_pins: bool,
}

impl ReferenceStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(PlaintextDb::open(path)?)
    }

    pub fn from_sql(sql: &str) -> Result<Self> {
        Self::init(PlaintextDb::from_sql(sql)?)
    }

    fn init(db: PlaintextDb) -> Result<Self> {
        // Only creates what the file did not
        db.connection().execute_batch(SCHEMA)?;

        let mut stmt = db.connection().prepare("PRAGMA table_info(model_texture)")?;
        let archive_pins = stmt
            .query_map([], |r| r.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .any(|column| column == "archive_sha1");
        drop(stmt);

        Ok(Self { db, archive_pins })
    }

    pub fn db(&self) -> &PlaintextDb {
        &self.db
    }

    /// Orientation for a title; unknown titles and missing axes get defaults
    pub fn orientation_for_title(&self, title: &str) -> Result<Orientation> {
        let axes: Option<(Option<String>, Option<String>)> = self
            .db
            .connection()
            .query_row(
                "SELECT model_axis_forward, model_axis_up FROM title WHERE name = ?1",
                params![title],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let (forward, up) = axes.unwrap_or((None, None));
        Ok(Orientation::from_parts(forward, up))
    }

    /// Texture path mapped to a model, if any.
    ///
    /// A mapping pinned to the model's archive wins over a title-wide one.
    pub fn texture_path_for_model(
        &self,
        title: &str,
        archive: &ContentHash,
        model_path: &str,
    ) -> Result<Option<String>> {
        let conn = self.db.connection();
        let texture = if self.archive_pins {
            conn.query_row(
                "SELECT texture_path FROM model_texture
                 WHERE title_name = ?1 AND model_path = ?3
                   AND (archive_sha1 = ?2 OR archive_sha1 IS NULL)
                 ORDER BY archive_sha1 IS NULL, rowid
                 LIMIT 1",
                params![title, archive, model_path],
                |r| r.get(0),
            )
        } else {
            conn.query_row(
                "SELECT texture_path FROM model_texture
                 WHERE title_name = ?1 AND model_path = ?2
                 ORDER BY rowid
                 LIMIT 1",
                params![title, model_path],
                |r| r.get(0),
            )
        };
        Ok(texture.optional()?)
    }
}
