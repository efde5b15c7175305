//! Known-bad resource contents.
//!
//! Hashes listed here are dropped before they reach the catalog or the
//! renderer, wherever they turn up.

use std::collections::HashMap;

use crate::domain::ContentHash;

/// Built-in entries, `sha1,reason` per line
pub const BUILTIN_DENYLIST_CSV: &str =
    "5e8c3878627f2fee6fbff07b75e30552de1b20d6,fake MBAC in Galaxy on Fire scene release";

/// Set of content hashes with the reason each was listed
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    entries: HashMap<ContentHash, String>,
}

impl Denylist {
    /// Empty denylist
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in list
    pub fn builtin() -> Self {
        let mut list = Self::new();
        list.extend_from_csv(BUILTIN_DENYLIST_CSV);
        list
    }

    /// Add `sha1,reason` lines. Malformed hashes are ignored.
    pub fn extend_from_csv(&mut self, csv: &str) {
        for line in csv.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (hash, reason) = line.split_once(',').unwrap_or((line, ""));
            match hash.parse::<ContentHash>() {
                Ok(hash) => {
                    self.entries.insert(hash, reason.trim().to_string());
                }
                Err(e) => tracing::warn!("Ignoring denylist line: {}", e),
            }
        }
    }

    pub fn insert(&mut self, hash: ContentHash, reason: impl Into<String>) {
        self.entries.insert(hash, reason.into());
    }

    pub fn is_bad(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn reason(&self, hash: &ContentHash) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_fake_mbac() {
        let list = Denylist::builtin();
        let hash: ContentHash = "5e8c3878627f2fee6fbff07b75e30552de1b20d6".parse().unwrap();

        assert!(list.is_bad(&hash));
        assert_eq!(
            list.reason(&hash),
            Some("fake MBAC in Galaxy on Fire scene release")
        );
        assert!(!list.is_bad(&ContentHash::of_bytes(b"fine")));
    }

    #[test]
    fn test_extend_from_csv() {
        let mut list = Denylist::new();
        list.extend_from_csv(
            "a9993e364706816aba3e25717850c26c9cd0d89d,abc\n\nnot-a-hash,oops\n\
             A9993E364706816ABA3E25717850C26C9CD0D89D,same hash upper",
        );

        assert_eq!(list.len(), 1);
        assert_eq!(
            list.reason(&ContentHash::of_bytes(b"abc")),
            Some("same hash upper")
        );
    }
}
