//! Content hashes.
//!
//! Everything in the catalog is keyed by the SHA-1 of its bytes, never by
//! its name or location.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Read granularity for streamed hashing. Bounds peak memory only.
pub const HASH_CHUNK_SIZE: usize = 128 * 1024;

/// Hex-encoded SHA-1 digest (40 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid content hash: {0:?}")]
pub struct InvalidContentHash(pub String);

impl ContentHash {
    /// Hash an in-memory byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        Self::from_digest(hasher)
    }

    /// Hash a reader to exhaustion, streaming fixed-size chunks
    pub fn of_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(Self::from_digest(hasher))
    }

    /// Hash a file on disk without loading it whole
    pub fn of_file(path: &Path) -> io::Result<Self> {
        Self::of_reader(File::open(path)?)
    }

    /// Finish a running digest
    pub fn from_digest(hasher: Sha1) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContentHash {
    type Err = InvalidContentHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidContentHash(s.to_string()))
        }
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidContentHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl ToSql for ContentHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for ContentHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha1("abc")
        assert_eq!(
            ContentHash::of_bytes(b"abc").as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_reader_matches_bytes_across_chunks() {
        let data: Vec<u8> = (0..(HASH_CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = ContentHash::of_reader(&data[..]).unwrap();
        assert_eq!(streamed, ContentHash::of_bytes(&data));
    }

    #[test]
    fn test_parse() {
        let hash: ContentHash = "5E8C3878627F2FEE6FBFF07B75E30552DE1B20D6".parse().unwrap();
        assert_eq!(hash.as_str(), "5e8c3878627f2fee6fbff07b75e30552de1b20d6");

        assert!("xyz".parse::<ContentHash>().is_err());
        assert!("5e8c3878627f2fee6fbff07b75e30552de1b20dz".parse::<ContentHash>().is_err());
    }
}
