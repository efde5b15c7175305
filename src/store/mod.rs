//! Relational stores.
//!
//! # Storage Layout
//!
//! ```text
//! catalog.sqlite                 # Catalog: title, archive, resource, archive_resource
//! analysis/games.sql             # Reference data, checked in as plaintext SQL
//! <workdir>/
//! ├── previews.sqlite            # model_preview cache rows
//! ├── full/<sha1>.png            # full-size images and renders
//! └── thumbs/<sha1>.png          # thumbnails
//! ```
//!
//! Every write goes through [`upsert`], keyed by content hash, so any pass
//! can be re-run without duplicating rows.

pub mod catalog;
pub mod plaintext;
pub mod previews;
pub mod reference;

use rusqlite::{Connection, ToSql};
use thiserror::Error;

pub use catalog::{ArchiveRow, Catalog, CatalogCounts};
pub use plaintext::PlaintextDb;
pub use previews::PreviewStore;
pub use reference::ReferenceStore;

/// Errors from the relational stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Insert a row, or overwrite every non-key column of the existing one.
///
/// An update that would leave the row unchanged is skipped, so the return
/// value is `true` only when a row was inserted or actually modified.
/// Table and column names must be trusted identifiers.
pub(crate) fn upsert(
    conn: &Connection,
    table: &str,
    keys: &[&str],
    columns: &[(&str, &dyn ToSql)],
) -> Result<bool> {
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updated: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !keys.contains(name))
        .collect();

    let on_conflict = if updated.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let set = updated
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = updated
            .iter()
            .map(|c| format!("{c} IS NOT excluded.{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("DO UPDATE SET {set} WHERE {changed}")
    };

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT({}) {on_conflict}",
        names.join(", "),
        keys.join(", "),
    );

    let values: Vec<&dyn ToSql> = columns.iter().map(|(_, value)| *value).collect();
    let changed = conn.execute(&sql, values.as_slice())?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (k TEXT PRIMARY KEY, a INTEGER, b TEXT);
             CREATE TABLE pair (x TEXT NOT NULL, y TEXT NOT NULL, PRIMARY KEY (x, y));",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_upsert_insert_update_unchanged() {
        let conn = conn();

        assert!(upsert(&conn, "t", &["k"], &[("k", &"one"), ("a", &1), ("b", &"x")]).unwrap());
        assert!(!upsert(&conn, "t", &["k"], &[("k", &"one"), ("a", &1), ("b", &"x")]).unwrap());
        assert!(upsert(&conn, "t", &["k"], &[("k", &"one"), ("a", &2), ("b", &"x")]).unwrap());

        let (a, b): (i64, String) = conn
            .query_row("SELECT a, b FROM t WHERE k = 'one'", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((a, b.as_str()), (2, "x"));
    }

    #[test]
    fn test_upsert_null_transitions_count_as_changes() {
        let conn = conn();
        let none: Option<i64> = None;

        upsert(&conn, "t", &["k"], &[("k", &"n"), ("a", &none)]).unwrap();
        assert!(!upsert(&conn, "t", &["k"], &[("k", &"n"), ("a", &none)]).unwrap());
        assert!(upsert(&conn, "t", &["k"], &[("k", &"n"), ("a", &Some(3))]).unwrap());
        assert!(upsert(&conn, "t", &["k"], &[("k", &"n"), ("a", &none)]).unwrap());
    }

    #[test]
    fn test_upsert_key_only_table() {
        let conn = conn();

        assert!(upsert(&conn, "pair", &["x", "y"], &[("x", &"a"), ("y", &"b")]).unwrap());
        assert!(!upsert(&conn, "pair", &["x", "y"], &[("x", &"a"), ("y", &"b")]).unwrap());

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pair", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
