//! SQLite databases kept as plaintext SQL.
//!
//! The working copy lives in memory. Loading replays the statements of a
//! text file; dumping writes the whole database back as one statement per
//! schema object and per row, in a stable order, so the file diffs cleanly
//! under version control.

use std::fmt::Write as _;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use super::{Result, StoreError};

/// In-memory SQLite backed by a SQL text file
pub struct PlaintextDb {
    conn: Connection,
}

impl PlaintextDb {
    /// Load `path` if it exists, otherwise start empty.
    ///
    /// Nothing is ever written back implicitly; see [`PlaintextDb::dump_to`].
    pub fn open(path: &Path) -> Result<Self> {
        let sql = match std::fs::read_to_string(path) {
            Ok(sql) => sql,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No plaintext database, starting empty");
                String::new()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&sql)?;

        Ok(Self { conn })
    }

    /// Build from SQL text directly
    pub fn from_sql(sql: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(sql)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Serialize the whole database
    pub fn dump(&self) -> Result<String> {
        dump_connection(&self.conn)
    }

    /// Serialize the whole database into `path`
    pub fn dump_to(&self, path: &Path) -> Result<()> {
        let sql = self.dump()?;
        std::fs::write(path, sql).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Dump any connection as SQL text.
///
/// Tables in name order, each followed by its rows in rowid order, then
/// the `sqlite_sequence` counters, then indexes, triggers and views. Foreign
/// keys are switched off for the reload since a child table may sort before
/// its parent. Loading the output into an empty database and dumping again
/// yields identical text.
pub fn dump_connection(conn: &Connection) -> Result<String> {
    let mut out = String::from("PRAGMA foreign_keys=OFF;\nBEGIN TRANSACTION;\n");

    let tables: Vec<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND sql IS NOT NULL
             ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut has_sequence = false;
    for (name, sql) in &tables {
        if name == "sqlite_sequence" {
            has_sequence = true;
            continue;
        }
        if name.starts_with("sqlite_") {
            continue;
        }
        let _ = writeln!(out, "{};", sql);
        let without_rowid = sql.to_uppercase().contains("WITHOUT ROWID");
        dump_rows(conn, name, !without_rowid, &mut out)?;
    }

    // Created implicitly by the AUTOINCREMENT tables above
    if has_sequence {
        out.push_str("DELETE FROM \"sqlite_sequence\";\n");
        dump_rows(conn, "sqlite_sequence", true, &mut out)?;
    }

    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master
         WHERE type IN ('index', 'trigger', 'view') AND sql IS NOT NULL
         ORDER BY name",
    )?;
    let others = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for sql in others {
        let _ = writeln!(out, "{};", sql);
    }

    out.push_str("COMMIT;\n");
    Ok(out)
}

fn dump_rows(conn: &Connection, table: &str, by_rowid: bool, out: &mut String) -> Result<()> {
    let order = if by_rowid { " ORDER BY rowid" } else { "" };
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}{}", quote_ident(table), order))?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(sql_literal(row.get_ref(i)?));
        }
        let _ = writeln!(
            out,
            "INSERT INTO {} VALUES({});",
            quote_ident(table),
            values.join(",")
        );
    }
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_nan() => "NULL".to_string(),
        ValueRef::Real(f) if f.is_infinite() => {
            if f > 0.0 { "9e999" } else { "-9e999" }.to_string()
        }
        // Debug formatting is the shortest text that parses back to `f`
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => format!("X'{}'", hex::encode_upper(b)),
    }
}
