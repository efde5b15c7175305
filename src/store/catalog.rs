//! The catalog database: titles, archives, resources and which archives
//! contain which resources.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::{upsert, Result};
use crate::domain::{ArchiveRecord, ContentHash, ImageExtent, ResourceRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS title (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS archive (
    sha1 TEXT PRIMARY KEY,
    title_id INTEGER NOT NULL REFERENCES title(id),
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    midlet_name TEXT NOT NULL,
    detected_obfuscation BOOLEAN NOT NULL,
    detected_mbac INTEGER NOT NULL,
    detected_m3g INTEGER NOT NULL,
    filetypes TEXT NOT NULL,
    min_timestamp TIMESTAMP,
    max_timestamp TIMESTAMP,
    widest_image_width INTEGER,
    widest_image_height INTEGER,
    widest_image_path TEXT,
    tallest_image_width INTEGER,
    tallest_image_height INTEGER,
    tallest_image_path TEXT,
    icon BLOB,
    entry_count INTEGER NOT NULL,
    contents_size INTEGER NOT NULL,
    contents_sha1 TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resource (
    sha1 TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    type TEXT NOT NULL,
    width INTEGER,
    height INTEGER
);

CREATE TABLE IF NOT EXISTS archive_resource (
    archive_sha1 TEXT NOT NULL,
    resource_sha1 TEXT NOT NULL,
    PRIMARY KEY (archive_sha1, resource_sha1)
);

CREATE INDEX IF NOT EXISTS resource_filename ON resource (filename);
";

/// An archive as read back from the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRow {
    pub title: String,
    pub record: ArchiveRecord,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub titles: u64,
    pub archives: u64,
    pub resources: u64,
    pub links: u64,
}

/// Handle to the catalog database. Single writer.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) a catalog file
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Scratch catalog (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Underlying connection, for read-only ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a write batch; dropped without commit, it rolls back
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Look up a title by name, creating it on first reference
    pub fn title_id(&self, name: &str) -> Result<i64> {
        self.conn
            .execute("INSERT OR IGNORE INTO title (name) VALUES (?1)", params![name])?;
        Ok(self
            .conn
            .query_row("SELECT id FROM title WHERE name = ?1", params![name], |r| r.get(0))?)
    }

    pub fn upsert_archive(&self, archive: &ArchiveRecord) -> Result<bool> {
        let filetypes = archive.filetypes_joined();
        let (ww, wh, wp) = extent_columns(archive.widest.as_ref());
        let (tw, th, tp) = extent_columns(archive.tallest.as_ref());

        upsert(
            &self.conn,
            "archive",
            &["sha1"],
            &[
                ("sha1", &archive.sha1),
                ("title_id", &archive.title_id),
                ("filename", &archive.filename),
                ("size", &archive.size),
                ("midlet_name", &archive.midlet_name),
                ("detected_obfuscation", &archive.obfuscated),
                ("detected_mbac", &archive.mbac_count),
                ("detected_m3g", &archive.m3g_count),
                ("filetypes", &filetypes),
                ("min_timestamp", &archive.min_timestamp),
                ("max_timestamp", &archive.max_timestamp),
                ("widest_image_width", &ww),
                ("widest_image_height", &wh),
                ("widest_image_path", &wp),
                ("tallest_image_width", &tw),
                ("tallest_image_height", &th),
                ("tallest_image_path", &tp),
                ("icon", &archive.icon),
                ("entry_count", &archive.entry_count),
                ("contents_size", &archive.contents_size),
                ("contents_sha1", &archive.contents_sha1),
            ],
        )
    }

    pub fn upsert_resource(&self, resource: &ResourceRecord) -> Result<bool> {
        upsert(
            &self.conn,
            "resource",
            &["sha1"],
            &[
                ("sha1", &resource.sha1),
                ("filename", &resource.filename),
                ("size", &resource.size),
                ("type", &resource.kind),
                ("width", &resource.width),
                ("height", &resource.height),
            ],
        )
    }

    /// Record that `archive` contains `resource`, whatever path it sits at
    pub fn link_archive_resource(
        &self,
        archive: &ContentHash,
        resource: &ContentHash,
    ) -> Result<bool> {
        upsert(
            &self.conn,
            "archive_resource",
            &["archive_sha1", "resource_sha1"],
            &[("archive_sha1", archive), ("resource_sha1", resource)],
        )
    }

    /// All title names, alphabetical
    pub fn titles(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM title ORDER BY name ASC")?;
        let names = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn archives_for_title(&self, title: &str) -> Result<Vec<ArchiveRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT title.name, archive.* FROM archive
             JOIN title ON archive.title_id = title.id
             WHERE title.name = ?1
             ORDER BY archive.filename ASC, archive.sha1 ASC",
        )?;
        let rows = stmt
            .query_map(params![title], archive_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn archive(&self, sha1: &ContentHash) -> Result<Option<ArchiveRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT title.name, archive.* FROM archive
                 JOIN title ON archive.title_id = title.id
                 WHERE archive.sha1 = ?1",
                params![sha1],
                archive_from_row,
            )
            .optional()?)
    }

    /// Distinct resources found in any archive of a title, by filename
    pub fn resources_for_title(&self, title: &str) -> Result<Vec<ResourceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT resource.* FROM title
             JOIN archive ON archive.title_id = title.id
             JOIN archive_resource ON archive_resource.archive_sha1 = archive.sha1
             JOIN resource ON resource.sha1 = archive_resource.resource_sha1
             WHERE title.name = ?1
             ORDER BY resource.filename ASC, resource.sha1 ASC",
        )?;
        let rows = stmt
            .query_map(params![title], resource_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn resource(&self, sha1: &ContentHash) -> Result<Option<ResourceRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM resource WHERE sha1 = ?1",
                params![sha1],
                resource_from_row,
            )
            .optional()?)
    }

    /// Resolve a resource by the path it was last seen at.
    ///
    /// A resource linked to `prefer_archive` wins; otherwise the lowest hash
    /// among same-named resources is returned.
    pub fn find_resource_by_filename(
        &self,
        filename: &str,
        prefer_archive: Option<&ContentHash>,
    ) -> Result<Option<ContentHash>> {
        if let Some(archive) = prefer_archive {
            let linked = self
                .conn
                .query_row(
                    "SELECT resource.sha1 FROM resource
                     JOIN archive_resource ON archive_resource.resource_sha1 = resource.sha1
                     WHERE resource.filename = ?1 AND archive_resource.archive_sha1 = ?2
                     ORDER BY resource.sha1 ASC LIMIT 1",
                    params![filename, archive],
                    |r| r.get(0),
                )
                .optional()?;
            if linked.is_some() {
                return Ok(linked);
            }
        }

        Ok(self
            .conn
            .query_row(
                "SELECT sha1 FROM resource WHERE filename = ?1 ORDER BY sha1 ASC LIMIT 1",
                params![filename],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn counts(&self) -> Result<CatalogCounts> {
        let count = |table: &str| -> Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
        };

        Ok(CatalogCounts {
            titles: count("title")?,
            archives: count("archive")?,
            resources: count("resource")?,
            links: count("archive_resource")?,
        })
    }
}

fn extent_columns(extent: Option<&ImageExtent>) -> (Option<u32>, Option<u32>, Option<String>) {
    match extent {
        Some(e) => (Some(e.width), Some(e.height), Some(e.path.clone())),
        None => (None, None, None),
    }
}

fn extent_from_columns(
    width: Option<u32>,
    height: Option<u32>,
    path: Option<String>,
) -> Option<ImageExtent> {
    Some(ImageExtent {
        width: width?,
        height: height?,
        path: path?,
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<ResourceRecord> {
    Ok(ResourceRecord {
        sha1: row.get("sha1")?,
        filename: row.get("filename")?,
        size: row.get("size")?,
        kind: row.get("type")?,
        width: row.get("width")?,
        height: row.get("height")?,
    })
}

fn archive_from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveRow> {
    let filetypes: String = row.get("filetypes")?;
    let min_timestamp: Option<NaiveDateTime> = row.get("min_timestamp")?;
    let max_timestamp: Option<NaiveDateTime> = row.get("max_timestamp")?;

    Ok(ArchiveRow {
        title: row.get(0)?,
        record: ArchiveRecord {
            sha1: row.get("sha1")?,
            title_id: row.get("title_id")?,
            filename: row.get("filename")?,
            size: row.get("size")?,
            midlet_name: row.get("midlet_name")?,
            obfuscated: row.get("detected_obfuscation")?,
            mbac_count: row.get("detected_mbac")?,
            m3g_count: row.get("detected_m3g")?,
            filetypes: if filetypes.is_empty() {
                BTreeSet::new()
            } else {
                filetypes.split(' ').map(str::to_string).collect()
            },
            min_timestamp,
            max_timestamp,
            widest: extent_from_columns(
                row.get("widest_image_width")?,
                row.get("widest_image_height")?,
                row.get("widest_image_path")?,
            ),
            tallest: extent_from_columns(
                row.get("tallest_image_width")?,
                row.get("tallest_image_height")?,
                row.get("tallest_image_path")?,
            ),
            icon: row.get("icon")?,
            entry_count: row.get("entry_count")?,
            contents_size: row.get("contents_size")?,
            contents_sha1: row.get("contents_sha1")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(bytes: &[u8], filename: &str) -> ResourceRecord {
        ResourceRecord {
            sha1: ContentHash::of_bytes(bytes),
            filename: filename.to_string(),
            size: bytes.len() as u64,
            kind: ".PNG".to_string(),
            width: Some(8),
            height: Some(4),
        }
    }

    fn archive(catalog: &Catalog, title: &str, bytes: &[u8], filename: &str) -> ArchiveRecord {
        ArchiveRecord {
            sha1: ContentHash::of_bytes(bytes),
            title_id: catalog.title_id(title).unwrap(),
            filename: filename.to_string(),
            size: bytes.len() as u64,
            midlet_name: title.to_string(),
            obfuscated: false,
            mbac_count: 0,
            m3g_count: 0,
            filetypes: [".CLASS", ".PNG"].iter().map(|s| s.to_string()).collect(),
            min_timestamp: None,
            max_timestamp: None,
            widest: Some(ImageExtent {
                width: 8,
                height: 4,
                path: "a.png".to_string(),
            }),
            tallest: None,
            icon: Some(vec![1, 2, 3]),
            entry_count: 3,
            contents_size: 42,
            contents_sha1: ContentHash::of_bytes(b"contents"),
        }
    }

    #[test]
    fn test_title_id_is_stable() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a = catalog.title_id("Galaxy on Fire").unwrap();
        let b = catalog.title_id("Asphalt").unwrap();
        assert_ne!(a, b);
        assert_eq!(catalog.title_id("Galaxy on Fire").unwrap(), a);
        assert_eq!(catalog.counts().unwrap().titles, 2);
    }

    #[test]
    fn test_titles_sorted() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.title_id("Zeta").unwrap();
        catalog.title_id("Alpha").unwrap();
        assert_eq!(catalog.titles().unwrap(), vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_archive_roundtrip() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = archive(&catalog, "Game", b"jar bytes", "game.jar");

        assert!(catalog.upsert_archive(&record).unwrap());
        assert!(!catalog.upsert_archive(&record).unwrap());

        let row = catalog.archive(&record.sha1).unwrap().unwrap();
        assert_eq!(row.title, "Game");
        assert_eq!(row.record, record);
    }

    #[test]
    fn test_archive_upsert_last_write_wins() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut record = archive(&catalog, "Game", b"jar bytes", "game.jar");
        catalog.upsert_archive(&record).unwrap();

        record.filename = "renamed.jar".to_string();
        record.widest = None;
        assert!(catalog.upsert_archive(&record).unwrap());

        let rows = catalog.archives_for_title("Game").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.filename, "renamed.jar");
        assert_eq!(rows[0].record.widest, None);
    }

    #[test]
    fn test_resources_for_title_are_distinct() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a1 = archive(&catalog, "Game", b"jar one", "one.jar");
        let a2 = archive(&catalog, "Game", b"jar two", "two.jar");
        let other = archive(&catalog, "Other Game", b"jar three", "three.jar");
        for a in [&a1, &a2, &other] {
            catalog.upsert_archive(a).unwrap();
        }

        let shared = resource(b"shared", "img/b.png");
        let only = resource(b"only", "img/a.png");
        let foreign = resource(b"foreign", "img/c.png");
        for r in [&shared, &only, &foreign] {
            catalog.upsert_resource(r).unwrap();
        }

        catalog.link_archive_resource(&a1.sha1, &shared.sha1).unwrap();
        catalog.link_archive_resource(&a2.sha1, &shared.sha1).unwrap();
        catalog.link_archive_resource(&a2.sha1, &only.sha1).unwrap();
        catalog.link_archive_resource(&other.sha1, &foreign.sha1).unwrap();

        let resources = catalog.resources_for_title("Game").unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["img/a.png", "img/b.png"]);
    }

    #[test]
    fn test_find_resource_prefers_archive() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a1 = archive(&catalog, "Game", b"jar one", "one.jar");
        let a2 = archive(&catalog, "Game", b"jar two", "two.jar");
        catalog.upsert_archive(&a1).unwrap();
        catalog.upsert_archive(&a2).unwrap();

        let v1 = resource(b"texture v1", "tex.bmp");
        let v2 = resource(b"texture v2", "tex.bmp");
        catalog.upsert_resource(&v1).unwrap();
        catalog.upsert_resource(&v2).unwrap();
        catalog.link_archive_resource(&a1.sha1, &v1.sha1).unwrap();
        catalog.link_archive_resource(&a2.sha1, &v2.sha1).unwrap();

        assert_eq!(
            catalog.find_resource_by_filename("tex.bmp", Some(&a2.sha1)).unwrap(),
            Some(v2.sha1.clone())
        );
        assert_eq!(
            catalog.find_resource_by_filename("tex.bmp", Some(&a1.sha1)).unwrap(),
            Some(v1.sha1.clone())
        );

        let lowest = std::cmp::min(v1.sha1.clone(), v2.sha1.clone());
        assert_eq!(catalog.find_resource_by_filename("tex.bmp", None).unwrap(), Some(lowest));
        assert_eq!(catalog.find_resource_by_filename("missing.bmp", None).unwrap(), None);
    }

    #[test]
    fn test_uncommitted_batch_rolls_back() {
        let catalog = Catalog::open_in_memory().unwrap();
        {
            let _tx = catalog.begin().unwrap();
            catalog.upsert_resource(&resource(b"x", "x.png")).unwrap();
        }
        assert_eq!(catalog.counts().unwrap().resources, 0);

        let tx = catalog.begin().unwrap();
        catalog.upsert_resource(&resource(b"x", "x.png")).unwrap();
        tx.commit().unwrap();
        assert_eq!(catalog.counts().unwrap().resources, 1);
    }
}
