//! Artifact selection and embed node construction.
//!
//! The active output format family decides which artifact is embedded:
//! screen formats prefer the raster image, print formats prefer the vector
//! one. A missing preferred artifact falls back to the other with a warning.
//!
//! Node dimensions are the measured size of the embedded artifact. The tool
//! already rendered it at the requested scale.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use ditaa_cache::{Artifact, ArtifactFormat, ArtifactSet, Fingerprint};
use serde::Serialize;

use crate::consts::ALT_TEXT_LIMIT;
use crate::options::Presentation;

/// Output format family of the document build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    /// Screen-oriented output (HTML, EPUB).
    Screen,
    /// Print-oriented output (LaTeX, PDF).
    Print,
}

impl FormatFamily {
    /// Map a family or builder name to a family.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::UnsupportedFormat`] for unknown names.
    pub fn parse(name: &str) -> Result<Self, EmbedError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "screen" | "html" | "dirhtml" | "singlehtml" | "epub" => Ok(Self::Screen),
            "print" | "latex" | "pdf" => Ok(Self::Print),
            _ => Err(EmbedError::UnsupportedFormat(name.to_owned())),
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Print => "print",
        }
    }

    /// Artifact format embedded when available.
    #[must_use]
    pub fn preferred_format(self) -> ArtifactFormat {
        match self {
            Self::Screen => ArtifactFormat::Raster,
            Self::Print => ArtifactFormat::Vector,
        }
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embed error.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Unknown output format family name.
    #[error("unsupported output format '{0}' (valid: screen, print, html, latex)")]
    UnsupportedFormat(String),
    /// The artifact set contained nothing to embed.
    #[error("no artifacts stored for diagram {0}")]
    NoArtifacts(Fingerprint),
    /// The artifact is not reachable from the asset root.
    #[error(
        "diagram artifact {} is outside the asset root {}",
        .path.display(),
        .asset_root.display()
    )]
    OutsideAssetRoot {
        /// Artifact location.
        path: PathBuf,
        /// Directory asset paths are relative to.
        asset_root: PathBuf,
    },
}

/// Per-diagram inputs to [`EmbedAdapter::embed`].
#[derive(Debug, Clone, Copy)]
pub struct EmbedRequest<'a> {
    /// Scale the diagram was rendered at.
    pub scale: f64,
    /// Normalized diagram text, used for derived alt text.
    pub source_text: &'a str,
    /// Directive presentation attributes.
    pub presentation: &'a Presentation,
}

/// Document-tree node referencing a rendered diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedNode {
    /// Fingerprint of the embedded artifact.
    pub fingerprint: Fingerprint,
    /// Path of the artifact relative to the asset root, `/`-separated.
    pub asset_path: String,
    /// Display width in pixels, as rendered at `scale`.
    pub width: u32,
    /// Display height in pixels, as rendered at `scale`.
    pub height: u32,
    /// Alt text.
    pub alt: String,
    /// Optional caption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Inline rather than block placement.
    pub inline: bool,
    /// Embedded artifact format.
    pub format: ArtifactFormat,
    /// Render scale.
    pub scale: f64,
    /// The preferred format for the family was unavailable.
    pub degraded: bool,
}

/// Builds [`EmbedNode`]s from cached artifacts.
#[derive(Debug, Clone)]
pub struct EmbedAdapter {
    asset_root: PathBuf,
}

impl EmbedAdapter {
    /// Create an adapter producing paths relative to `asset_root`.
    #[must_use]
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }

    /// Select the artifact for `family` and build the node.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::NoArtifacts`] if the set is empty and
    /// [`EmbedError::OutsideAssetRoot`] if the selected artifact does not live
    /// under the asset root.
    pub fn embed(
        &self,
        artifacts: &ArtifactSet,
        family: FormatFamily,
        request: &EmbedRequest<'_>,
    ) -> Result<EmbedNode, EmbedError> {
        let preferred = family.preferred_format();
        let (artifact, degraded) = match artifacts.get(preferred) {
            Some(artifact) => (artifact, false),
            None => {
                let fallback = artifacts
                    .artifacts()
                    .first()
                    .ok_or_else(|| EmbedError::NoArtifacts(artifacts.fingerprint().clone()))?;
                tracing::warn!(
                    fingerprint = %artifacts.fingerprint().short(),
                    family = %family,
                    preferred = %preferred,
                    used = %fallback.format,
                    "Preferred diagram format unavailable, embedding fallback"
                );
                (fallback, true)
            }
        };

        Ok(EmbedNode {
            fingerprint: artifact.fingerprint.clone(),
            asset_path: self.asset_path(artifact)?,
            width: artifact.width,
            height: artifact.height,
            alt: alt_text(request.presentation.alt.as_deref(), request.source_text),
            caption: request.presentation.caption.clone(),
            inline: request.presentation.inline,
            format: artifact.format,
            scale: request.scale,
            degraded,
        })
    }

    fn asset_path(&self, artifact: &Artifact) -> Result<String, EmbedError> {
        artifact
            .path
            .strip_prefix(&self.asset_root)
            .map(slash_path)
            .map_err(|_| EmbedError::OutsideAssetRoot {
                path: artifact.path.clone(),
                asset_root: self.asset_root.clone(),
            })
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Explicit alt text, or the source collapsed to one line and truncated.
pub(crate) fn alt_text(explicit: Option<&str>, source_text: &str) -> String {
    if let Some(alt) = explicit {
        return alt.to_owned();
    }
    let collapsed = source_text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= ALT_TEXT_LIMIT {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(ALT_TEXT_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}
