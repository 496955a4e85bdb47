//! ASCII-art diagram rendering for documentation builds.
//!
//! This crate turns ditaa-style diagram directives into embeddable images:
//! - Resolves directive text (inline or from a file) and merges options
//! - Fingerprints text and options into a content-addressed cache key
//! - Renders cache misses with an external tool, one render per fingerprint
//! - Selects the artifact for the output format family and builds the node
//!
//! # Architecture
//!
//! - [`resolve()`]: directive → [`ResolvedDiagram`]
//! - [`DiagramKey`]: fingerprint computation
//! - [`DiagramRenderer`] / [`CommandRenderer`]: external tool invocation
//! - [`EmbedAdapter`]: artifact selection and [`EmbedNode`] construction
//! - [`DiagramPipeline`]: the `resolve → render → embed` entry point
//! - [`HtmlMarkup`] / [`LatexMarkup`]: output markup for nodes
//!
//! Artifacts are stored through the [`ditaa_cache::ArtifactCache`] trait.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ditaa_cache::FileArtifactCache;
//! use ditaa_diagrams::{
//!     CACHE_VERSION, CommandRenderer, DiagramPipeline, Directive, FormatFamily, HtmlMarkup,
//!     NodeMarkup, SourceLocation,
//! };
//!
//! let renderer = Arc::new(CommandRenderer::new("ditaa"));
//! let cache = FileArtifactCache::new("_build/html/_images/ditaa".into(), CACHE_VERSION).unwrap();
//! let cache = Arc::new(cache);
//! let pipeline = DiagramPipeline::new(renderer, cache, "_build/html");
//!
//! let directive = Directive::inline("+-----+    +-----+\n| cBLU|--->|  B  |\n+-----+    +-----+")
//!     .with_option("scale", "2")
//!     .at(SourceLocation::new("docs/index.rst", 10));
//! let node = pipeline.process(&directive, FormatFamily::Screen).unwrap();
//!
//! let html = HtmlMarkup::new("/").markup(&node);
//! ```

mod abort;
mod consts;
mod dimensions;
mod directive;
mod embed;
mod fingerprint;
mod flight;
mod markup;
mod options;
mod pipeline;
mod render;
mod resolve;

pub use abort::AbortSignal;
pub use consts::CACHE_VERSION;
pub use directive::{Directive, SourceLocation};
pub use embed::{EmbedAdapter, EmbedError, EmbedNode, EmbedRequest, FormatFamily};
pub use fingerprint::DiagramKey;
pub use markup::{HtmlMarkup, LatexMarkup, NodeMarkup};
pub use options::{OPTION_KEYS, Presentation, RenderOptions};
pub use pipeline::{DiagramError, DiagramErrorKind, DiagramNode, DiagramPipeline, Placeholder};
pub use render::{CommandRenderer, DiagramRenderer, RenderError, build_args};
pub use resolve::{DiagramOrigin, DiagramSource, ResolveError, ResolvedDiagram, resolve};
