//! On-disk index mapping fingerprints to stored artifact metadata.
//!
//! Persisted as `index.json`:
//!
//! ```text
//! {
//!   "entries": {
//!     "<fingerprint>": [
//!       {"format": "raster", "file": "<fingerprint>.png", "width": 120, "height": 64, "digest": "<sha256>"}
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ArtifactFormat, CacheError, Fingerprint};

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredArtifact {
    pub format: ArtifactFormat,
    /// File name relative to the cache root.
    pub file: String,
    pub width: u32,
    pub height: u32,
    /// SHA-256 of the file content, used to detect conflicting stores.
    pub digest: String,
}

impl StoredArtifact {
    pub fn content_digest(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Index {
    pub entries: BTreeMap<Fingerprint, Vec<StoredArtifact>>,
}

impl Index {
    /// Load the index, treating a missing or unparseable file as empty.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return Self::default(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable cache index: {e}");
                Self::default()
            }
        }
    }

    /// Persist the index atomically (write to a sibling temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }
}

/// Write `data` to `path` so that readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_entry() -> StoredArtifact {
        StoredArtifact {
            format: ArtifactFormat::Raster,
            file: "abc.png".to_owned(),
            width: 10,
            height: 20,
            digest: StoredArtifact::content_digest(b"data"),
        }
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");

        let mut index = Index::default();
        index
            .entries
            .insert(Fingerprint::from_digest(&[0xab]), vec![sample_entry()]);
        index.save(&path).unwrap();

        let loaded = Index::load(&path);
        assert_eq!(loaded.entries, index.entries);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = Index::load(&tmp.path().join("nope.json"));
        assert!(index.entries.is_empty());
    }

    #[test]
    fn test_load_garbage_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        fs::write(&path, b"{not json").unwrap();

        assert!(Index::load(&path).entries.is_empty());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/file.bin");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_content_digest_is_sha256_hex() {
        let digest = StoredArtifact::content_digest(b"");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
