//! Content-addressed artifact cache for rendered diagrams.
//!
//! This crate decouples diagram rendering from artifact storage. The core API
//! is the [`ArtifactCache`] trait:
//!
//! - [`ArtifactCache::lookup`]: Pure read, `None` signals a miss
//! - [`ArtifactCache::store`]: Publish rendered images under a [`Fingerprint`]
//!
//! A fingerprint maps to an [`ArtifactSet`]: one [`Artifact`] per rendered
//! format (raster and optionally vector). Entries are written once and never
//! modified; storing different content under an existing fingerprint is an
//! invariant violation reported as [`CacheError::Corruption`].
//!
//! # Implementations
//!
//! - [`FileArtifactCache`]: Directory of `{fingerprint}.{ext}` files plus an
//!   `index.json`, validated against a `VERSION` file on open
//!
//! # Example
//!
//! ```
//! use ditaa_cache::{ArtifactCache, ArtifactFormat, FileArtifactCache, Fingerprint, RenderedImage};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cache = FileArtifactCache::new(dir.path().join("ditaa"), "v1").unwrap();
//! let fingerprint = Fingerprint::from_digest(&[0xab; 32]);
//!
//! assert!(cache.lookup(&fingerprint).is_none());
//!
//! let image = RenderedImage::new(ArtifactFormat::Raster, b"png bytes".to_vec(), 40, 20);
//! let stored = cache.store(&fingerprint, &[image]).unwrap();
//! assert_eq!(cache.lookup(&fingerprint), Some(stored));
//! ```

mod file;
mod index;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use file::FileArtifactCache;

/// Content-addressed cache key.
///
/// Lowercase hex encoding of a digest over diagram text and resolved render
/// options. Doubles as the file stem of every artifact stored under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build a fingerprint from raw digest bytes.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Hex string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format of a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// PNG image, embedded by screen-oriented outputs.
    Raster,
    /// SVG image, embedded by print-oriented outputs.
    Vector,
}

impl ArtifactFormat {
    /// Parse a format name (`raster` / `vector`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raster" | "png" => Some(Self::Raster),
            "vector" | "svg" => Some(Self::Vector),
            _ => None,
        }
    }

    /// Canonical name used in option strings and fingerprints.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::Vector => "vector",
        }
    }

    /// File extension for artifacts of this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Raster => "png",
            Self::Vector => "svg",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renderer output that has not yet been published to a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    /// Format of `data`.
    pub format: ArtifactFormat,
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// Width in pixels as produced by the tool.
    pub width: u32,
    /// Height in pixels as produced by the tool.
    pub height: u32,
}

impl RenderedImage {
    /// Create a rendered image.
    #[must_use]
    pub fn new(format: ArtifactFormat, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            format,
            data,
            width,
            height,
        }
    }
}

/// A rendered file stored in a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Fingerprint the artifact is stored under.
    pub fingerprint: Fingerprint,
    /// Artifact format.
    pub format: ArtifactFormat,
    /// Absolute path of the stored file.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// All artifacts stored under a single fingerprint.
///
/// Never empty: caches refuse to store an entry without images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    fingerprint: Fingerprint,
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub(crate) fn new(fingerprint: Fingerprint, mut artifacts: Vec<Artifact>) -> Self {
        artifacts.sort_by_key(|a| a.format);
        Self {
            fingerprint,
            artifacts,
        }
    }

    /// Fingerprint shared by every artifact in the set.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Artifact of the given format, if one was rendered.
    #[must_use]
    pub fn get(&self, format: ArtifactFormat) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.format == format)
    }

    /// All artifacts, ordered raster first.
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }
}

/// Cache error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Different content was stored under an existing fingerprint.
    ///
    /// Fingerprints are deterministic, so this signals a broken invariant and
    /// must abort the build.
    #[error("cache corruption: fingerprint {fingerprint} already holds different {format} content")]
    Corruption {
        /// Fingerprint of the conflicting entry.
        fingerprint: Fingerprint,
        /// Format whose content differs.
        format: ArtifactFormat,
    },
    /// Store was called without any images.
    #[error("refusing to store empty entry for fingerprint {0}")]
    EmptyEntry(Fingerprint),
    /// Two images of the same format were passed to a single store.
    #[error("duplicate {format} image for fingerprint {fingerprint}")]
    DuplicateFormat {
        /// Fingerprint being stored.
        fingerprint: Fingerprint,
        /// Repeated format.
        format: ArtifactFormat,
    },
    /// The cache root holds files but no `VERSION` marker, so it is not a
    /// cache directory and must not be wiped.
    #[error(
        "{} is not empty and has no VERSION file; refusing to use it as the artifact cache",
        .0.display()
    )]
    ForeignDirectory(PathBuf),
    /// I/O error while writing artifacts or the index.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Index serialization error.
    #[error("cache index error: {0}")]
    Index(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether the error indicates a violated cache invariant.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

/// Fingerprint-keyed store of rendered artifacts.
///
/// Shared across a whole document build, so implementations must tolerate
/// concurrent callers. A successful [`store`](Self::store) is atomic with
/// respect to [`lookup`](Self::lookup): readers see either no entry or the
/// complete set.
pub trait ArtifactCache: Send + Sync {
    /// Retrieve the artifacts stored under `fingerprint`.
    ///
    /// Returns `None` on a miss. Never fails: unreadable entries are misses.
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<ArtifactSet>;

    /// Publish freshly rendered images under `fingerprint`.
    ///
    /// Storing identical content twice is a no-op returning the existing set.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corruption`] if different content is already
    /// stored under `fingerprint`, and I/O or index errors if the entry
    /// cannot be written.
    fn store(
        &self,
        fingerprint: &Fingerprint,
        images: &[RenderedImage],
    ) -> Result<ArtifactSet, CacheError>;

    /// Remove every entry, forcing a full re-render.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backing storage cannot be reset.
    fn clear(&self) -> Result<(), CacheError>;
}
