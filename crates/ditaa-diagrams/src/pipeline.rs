//! The `resolve → render → embed` pipeline.
//!
//! [`DiagramPipeline`] is the single entry point hosts call per directive. It
//! resolves the directive, fingerprints it, serves the artifacts from the
//! cache or renders and stores them (one render per fingerprint, however many
//! callers race for it), and builds the embed node for the active format
//! family.
//!
//! # Error boundary
//!
//! Author and tool errors ([`ResolveError`], [`RenderError`]) are downgraded
//! to a [`Placeholder`] node plus a warning naming the directive location,
//! unless the pipeline is strict. Cache and embed errors, and cancellation,
//! always propagate.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ditaa_cache::{ArtifactCache, ArtifactFormat, ArtifactSet, CacheError, Fingerprint};
use rayon::prelude::*;
use serde::Serialize;

use crate::abort::AbortSignal;
use crate::directive::{Directive, SourceLocation};
use crate::embed::{EmbedAdapter, EmbedError, EmbedNode, EmbedRequest, FormatFamily};
use crate::fingerprint::DiagramKey;
use crate::flight::FlightLocks;
use crate::options::RenderOptions;
use crate::render::{DiagramRenderer, RenderError};
use crate::resolve::{ResolveError, ResolvedDiagram, resolve};

/// Node handed back to the host for one directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiagramNode {
    /// Rendered diagram.
    Embed(EmbedNode),
    /// Visible stand-in for a diagram that could not be produced.
    Placeholder(Placeholder),
}

/// Stand-in emitted when a per-directive error is downgraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    /// Error description.
    pub message: String,
    /// Diagram text as written, or the file argument.
    pub source_text: String,
    /// Directive location.
    pub location: Option<SourceLocation>,
}

/// Stage-specific error cause.
#[derive(Debug, thiserror::Error)]
pub enum DiagramErrorKind {
    /// Directive could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Tool failed, timed out, or was cancelled.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// Artifacts could not be stored.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// No node could be built from the artifacts.
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Error processing a single directive.
#[derive(Debug, thiserror::Error)]
#[error("{}{kind}", location_prefix(.location.as_ref()))]
pub struct DiagramError {
    /// Directive location, when the host provided one.
    pub location: Option<SourceLocation>,
    /// Underlying cause, shared by every caller of a coalesced render.
    pub kind: Arc<DiagramErrorKind>,
}

impl DiagramError {
    fn new(location: Option<&SourceLocation>, kind: impl Into<DiagramErrorKind>) -> Self {
        Self::shared(location, Arc::new(kind.into()))
    }

    fn shared(location: Option<&SourceLocation>, kind: Arc<DiagramErrorKind>) -> Self {
        Self {
            location: location.cloned(),
            kind,
        }
    }

    /// Whether the error must abort the build even in lenient mode.
    ///
    /// Cache and embed errors are infrastructure or configuration defects,
    /// and a cancelled render belongs to a build that is already stopping.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            *self.kind,
            DiagramErrorKind::Cache(_)
                | DiagramErrorKind::Embed(_)
                | DiagramErrorKind::Render(RenderError::Cancelled)
        )
    }
}

fn location_prefix(location: Option<&SourceLocation>) -> String {
    location.map(|l| format!("{l}: ")).unwrap_or_default()
}

/// Diagram pipeline shared across a document build.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ditaa_cache::FileArtifactCache;
/// use ditaa_diagrams::{
///     CACHE_VERSION, CommandRenderer, DiagramPipeline, Directive, FormatFamily,
/// };
///
/// let renderer = Arc::new(CommandRenderer::new("ditaa"));
/// let cache = FileArtifactCache::new("_build/html/_images/ditaa".into(), CACHE_VERSION).unwrap();
/// let cache = Arc::new(cache);
/// let pipeline = DiagramPipeline::new(renderer, cache, "_build/html");
///
/// let node = pipeline
///     .process(&Directive::inline("+---+\n| A |\n+---+"), FormatFamily::Screen)
///     .unwrap();
/// ```
pub struct DiagramPipeline {
    renderer: Arc<dyn DiagramRenderer>,
    cache: Arc<dyn ArtifactCache>,
    embed: EmbedAdapter,
    defaults: RenderOptions,
    source_dir: PathBuf,
    strict: bool,
    abort: AbortSignal,
    flights: FlightLocks<Result<ArtifactSet, Arc<DiagramErrorKind>>>,
}

impl DiagramPipeline {
    /// Create a pipeline with default options, lenient error handling and
    /// the current directory as source directory.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn DiagramRenderer>,
        cache: Arc<dyn ArtifactCache>,
        asset_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer,
            cache,
            embed: EmbedAdapter::new(asset_root),
            defaults: RenderOptions::default(),
            source_dir: PathBuf::from("."),
            strict: false,
            abort: AbortSignal::new(),
            flights: FlightLocks::new(),
        }
    }

    /// Set document-wide default options.
    #[must_use]
    pub fn defaults(mut self, defaults: RenderOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the directory file arguments resolve against when a directive has
    /// no location.
    #[must_use]
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// Propagate resolve and render errors instead of emitting placeholders.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Share an abort signal (normally the renderer's).
    #[must_use]
    pub fn abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Abort the build: pending renders fail with [`RenderError::Cancelled`].
    pub fn abort(&self) {
        self.abort.raise();
    }

    /// Process one directive, downgrading per-directive errors unless strict.
    ///
    /// # Errors
    ///
    /// Returns [`DiagramError`] for fatal errors (see
    /// [`DiagramError::is_fatal`]) and, in strict mode, for every error.
    pub fn process(
        &self,
        directive: &Directive,
        family: FormatFamily,
    ) -> Result<DiagramNode, DiagramError> {
        match self.try_process(directive, family) {
            Ok(node) => Ok(DiagramNode::Embed(node)),
            Err(err) if !self.strict && !err.is_fatal() => {
                let location = err
                    .location
                    .as_ref()
                    .map_or_else(|| "<unknown>".to_owned(), ToString::to_string);
                tracing::warn!(%location, "Diagram replaced by placeholder: {}", err.kind);
                Ok(DiagramNode::Placeholder(Placeholder {
                    message: err.kind.to_string(),
                    source_text: placeholder_text(directive),
                    location: err.location,
                }))
            }
            Err(err) => Err(err),
        }
    }

    /// Process a batch of directives in parallel, preserving order.
    pub fn process_all(
        &self,
        directives: &[Directive],
        family: FormatFamily,
    ) -> Vec<Result<DiagramNode, DiagramError>> {
        directives
            .par_iter()
            .map(|directive| self.process(directive, family))
            .collect()
    }

    /// Process one directive without the placeholder boundary.
    ///
    /// # Errors
    ///
    /// Returns [`DiagramError`] for any stage failure.
    pub fn try_process(
        &self,
        directive: &Directive,
        family: FormatFamily,
    ) -> Result<EmbedNode, DiagramError> {
        let location = directive.location.as_ref();
        let base_dir = self.base_dir(directive);

        let resolved = resolve(directive, &self.defaults, &base_dir)
            .map_err(|e| DiagramError::new(location, e))?;
        let fingerprint = DiagramKey {
            text: resolved.source.text(),
            options: &resolved.options,
            family,
        }
        .fingerprint();

        let artifacts = self
            .artifacts_for(&fingerprint, &resolved)
            .map_err(|kind| DiagramError::shared(location, kind))?;

        let request = EmbedRequest {
            scale: resolved.options.scale,
            source_text: resolved.source.text(),
            presentation: &resolved.presentation,
        };
        self.embed
            .embed(&artifacts, family, &request)
            .map_err(|e| DiagramError::new(location, e))
    }

    /// Cached artifacts for `fingerprint`, rendering and storing them on a miss.
    ///
    /// Concurrent callers for one fingerprint share a single render: the
    /// first renders, the rest wait for it and receive its outcome, including
    /// its error when the render failed.
    ///
    /// # Errors
    ///
    /// Returns the render or cache error of the attempt.
    pub fn artifacts_for(
        &self,
        fingerprint: &Fingerprint,
        resolved: &ResolvedDiagram,
    ) -> Result<ArtifactSet, Arc<DiagramErrorKind>> {
        if let Some(set) = self.cache.lookup(fingerprint) {
            tracing::debug!(fingerprint = %fingerprint.short(), "Diagram cache hit");
            return Ok(set);
        }

        self.flights.run(fingerprint, || {
            self.render_and_store(fingerprint, resolved).map_err(Arc::new)
        })
    }

    fn render_and_store(
        &self,
        fingerprint: &Fingerprint,
        resolved: &ResolvedDiagram,
    ) -> Result<ArtifactSet, DiagramErrorKind> {
        // A flight that finished just before ours started may have stored it
        if let Some(set) = self.cache.lookup(fingerprint) {
            tracing::debug!(
                fingerprint = %fingerprint.short(),
                "Diagram rendered by another caller"
            );
            return Ok(set);
        }
        if self.abort.is_raised() {
            return Err(RenderError::Cancelled.into());
        }

        let start = Instant::now();
        let images = self.renderer.render(&resolved.source, &resolved.options)?;
        let produced: BTreeSet<ArtifactFormat> = images.iter().map(|i| i.format).collect();
        if produced != resolved.options.output_formats || produced.len() != images.len() {
            return Err(RenderError::Failure {
                message: format!(
                    "renderer produced {} but {} was requested",
                    format_list(&produced),
                    format_list(&resolved.options.output_formats)
                ),
                diagnostics: String::new(),
            }
            .into());
        }

        let set = self.cache.store(fingerprint, &images)?;
        tracing::info!(
            fingerprint = %fingerprint.short(),
            formats = %format_list(&produced),
            elapsed_ms = elapsed_ms(start),
            "Rendered diagram"
        );
        Ok(set)
    }

    /// Directory file arguments are read from.
    fn base_dir(&self, directive: &Directive) -> PathBuf {
        directive
            .location
            .as_ref()
            .and_then(|l| l.document.parent())
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| self.source_dir.clone(), Path::to_path_buf)
    }
}

impl std::fmt::Debug for DiagramPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramPipeline")
            .field("embed", &self.embed)
            .field("defaults", &self.defaults)
            .field("source_dir", &self.source_dir)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

fn placeholder_text(directive: &Directive) -> String {
    if directive.body.trim().is_empty() {
        directive.argument.clone().unwrap_or_default()
    } else {
        directive.body.clone()
    }
}

fn format_list(formats: &BTreeSet<ArtifactFormat>) -> String {
    formats
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
