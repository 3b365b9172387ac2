//! Content hashing for the compare-and-swap baseline.
//!
//! Hashes are SHA-256 over raw file bytes, hex-encoded. A file that does not
//! exist hashes to the `NEW_FILE` sentinel, so "create this file" and "replace
//! this content" flow through the same comparison.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel hash for a path that does not exist on disk.
pub const NEW_FILE: &str = "NEW_FILE";

/// A content hash: either 64 hex characters of SHA-256, or the `NEW_FILE`
/// sentinel for an absent path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// The sentinel hash for a path with no on-disk content yet.
    pub fn new_file() -> Self {
        ContentHash(NEW_FILE.to_string())
    }

    /// Hashes a byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hashes the current content of a file, or returns the `NEW_FILE`
    /// sentinel if the path does not exist.
    pub fn of_path(path: &Path) -> io::Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self::of_bytes(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new_file()),
            Err(e) => Err(e),
        }
    }

    /// Whether this is the absent-path sentinel.
    pub fn is_new_file(&self) -> bool {
        self.0 == NEW_FILE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix for display.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_of_bytes_is_stable() {
        // SHA-256 of the empty input, a well-known constant.
        assert_eq!(
            ContentHash::of_bytes(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(
            ContentHash::of_bytes(b"hello"),
            ContentHash::of_bytes(b"world")
        );
    }

    #[test]
    fn missing_path_hashes_to_sentinel() {
        let dir = tempdir().unwrap();
        let hash = ContentHash::of_path(&dir.path().join("absent.txt")).unwrap();
        assert!(hash.is_new_file());
        assert_eq!(hash.as_str(), NEW_FILE);
    }

    #[test]
    fn path_hash_matches_bytes_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"content").unwrap();

        assert_eq!(
            ContentHash::of_path(&path).unwrap(),
            ContentHash::of_bytes(b"content")
        );
    }

    #[test]
    fn short_prefix() {
        let hash = ContentHash::of_bytes(b"x");
        assert_eq!(hash.short().len(), 8);
        assert!(hash.as_str().starts_with(hash.short()));
    }
}
