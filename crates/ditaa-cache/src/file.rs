//! File-based artifact cache.
//!
//! [`FileArtifactCache`] stores each artifact as `{fingerprint}.{ext}` in a
//! single directory and records metadata in `index.json`. Files are written
//! before the index entry is published, so a lookup never sees an entry whose
//! files are still being written.
//!
//! On construction, [`FileArtifactCache`] validates a `VERSION` file in the
//! cache root. If the version mismatches, the entire cache directory is wiped
//! and recreated, so artifacts from an incompatible build are never reused.
//! A directory without a `VERSION` file is only adopted when it is empty.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::index::{Index, StoredArtifact, write_atomic};
use crate::{Artifact, ArtifactCache, ArtifactSet, CacheError, Fingerprint, RenderedImage};

const INDEX_FILE: &str = "index.json";
const VERSION_FILE: &str = "VERSION";

/// File-based [`ArtifactCache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION              # contains the cache version string
/// +-- index.json           # fingerprint -> artifact metadata
/// +-- 3f2a...e1.png        # raster artifact
/// +-- 3f2a...e1.svg        # vector artifact (when requested)
/// ```
///
/// The directory is safe to delete wholesale; the next build re-renders.
pub struct FileArtifactCache {
    root: PathBuf,
    version: String,
    entries: RwLock<HashMap<Fingerprint, Vec<StoredArtifact>>>,
    /// Serializes stores so index persistence never interleaves.
    write_lock: Mutex<()>,
}

impl FileArtifactCache {
    /// Open a file-based cache at `root`, validating the cache version.
    ///
    /// If the `VERSION` file inside `root` does not match `version`, the
    /// entire cache directory is removed and recreated. I/O errors during
    /// validation are logged but never fatal; they resurface on the first
    /// [`store`](ArtifactCache::store).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ForeignDirectory`] if `root` has no `VERSION`
    /// file but already contains other files.
    pub fn new(root: PathBuf, version: &str) -> Result<Self, CacheError> {
        validate_version(&root, version)?;
        let index = Index::load(&root.join(INDEX_FILE));
        tracing::debug!(
            root = %root.display(),
            entries = index.entries.len(),
            "opened artifact cache"
        );
        Ok(Self {
            root,
            version: version.to_owned(),
            entries: RwLock::new(index.entries.into_iter().collect()),
            write_lock: Mutex::new(()),
        })
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of fingerprints currently indexed.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_set(&self, fingerprint: &Fingerprint, stored: &[StoredArtifact]) -> ArtifactSet {
        let artifacts = stored
            .iter()
            .map(|s| Artifact {
                fingerprint: fingerprint.clone(),
                format: s.format,
                path: self.root.join(&s.file),
                width: s.width,
                height: s.height,
            })
            .collect();
        ArtifactSet::new(fingerprint.clone(), artifacts)
    }

    fn files_present(&self, stored: &[StoredArtifact]) -> bool {
        stored.iter().all(|s| self.root.join(&s.file).is_file())
    }

    /// Persist the current index. Caller must hold `write_lock`.
    fn persist(&self) -> Result<(), CacheError> {
        let index = Index {
            entries: self
                .entries
                .read()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        index.save(&self.root.join(INDEX_FILE))
    }
}

impl ArtifactCache for FileArtifactCache {
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<ArtifactSet> {
        let entries = self.entries.read().unwrap();
        let stored = entries.get(fingerprint)?;
        if !self.files_present(stored) {
            tracing::debug!(
                fingerprint = fingerprint.short(),
                "indexed artifact missing on disk, treating as miss"
            );
            return None;
        }
        Some(self.to_set(fingerprint, stored))
    }

    fn store(
        &self,
        fingerprint: &Fingerprint,
        images: &[RenderedImage],
    ) -> Result<ArtifactSet, CacheError> {
        if images.is_empty() {
            return Err(CacheError::EmptyEntry(fingerprint.clone()));
        }

        let mut seen = BTreeSet::new();
        let mut incoming = Vec::with_capacity(images.len());
        for image in images {
            if !seen.insert(image.format) {
                return Err(CacheError::DuplicateFormat {
                    fingerprint: fingerprint.clone(),
                    format: image.format,
                });
            }
            incoming.push(StoredArtifact {
                format: image.format,
                file: format!("{fingerprint}.{}", image.format.extension()),
                width: image.width,
                height: image.height,
                digest: StoredArtifact::content_digest(&image.data),
            });
        }

        let _guard = self.write_lock.lock().unwrap();

        // An entry whose files vanished is unusable and gets replaced.
        if let Some(existing) = self.entries.read().unwrap().get(fingerprint)
            && self.files_present(existing)
        {
            return match conflicting_format(existing, &incoming) {
                None => Ok(self.to_set(fingerprint, existing)),
                Some(format) => Err(CacheError::Corruption {
                    fingerprint: fingerprint.clone(),
                    format,
                }),
            };
        }

        for (image, stored) in images.iter().zip(&incoming) {
            write_atomic(&self.root.join(&stored.file), &image.data)?;
        }

        let set = self.to_set(fingerprint, &incoming);
        self.entries
            .write()
            .unwrap()
            .insert(fingerprint.clone(), incoming);
        self.persist()?;

        tracing::debug!(
            fingerprint = fingerprint.short(),
            formats = images.len(),
            "stored artifacts"
        );
        Ok(set)
    }

    fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap();
        self.entries.write().unwrap().clear();
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(VERSION_FILE), &self.version)?;
        tracing::info!(root = %self.root.display(), "cleared artifact cache");
        Ok(())
    }
}

/// First format whose content differs between an existing and incoming entry.
///
/// A differing set of formats counts as a conflict on the first format that is
/// missing from either side.
fn conflicting_format(
    existing: &[StoredArtifact],
    incoming: &[StoredArtifact],
) -> Option<crate::ArtifactFormat> {
    for new in incoming {
        match existing.iter().find(|old| old.format == new.format) {
            Some(old) if old.digest == new.digest => {}
            _ => return Some(new.format),
        }
    }
    existing
        .iter()
        .find(|old| !incoming.iter().any(|new| new.format == old.format))
        .map(|old| old.format)
}

/// Validate the cache version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) -> Result<(), CacheError> {
    let version_file = root.join(VERSION_FILE);

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("artifact cache version matches: {version}");
            return Ok(());
        }
        Ok(stored) => {
            tracing::info!(
                "artifact cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) if has_entries(root) => {
            return Err(CacheError::ForeignDirectory(root.to_path_buf()));
        }
        Err(_) => {
            tracing::info!("no artifact cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove artifact cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create artifact cache directory: {e}");
        return Ok(());
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write artifact cache VERSION file: {e}");
    }
    Ok(())
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}
