//! Directive resolution.
//!
//! Turns a [`Directive`] into a [`ResolvedDiagram`]: the diagram text (from
//! the inline body or a referenced file), fully merged [`RenderOptions`], and
//! the presentation attributes. All failures here are author errors.

use std::path::{Path, PathBuf};

use crate::directive::Directive;
use crate::options::{Presentation, RenderOptions, apply_option};

/// Where diagram text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramOrigin {
    /// Directive body.
    Inline,
    /// External file named by the directive argument.
    FileReference(PathBuf),
}

/// Normalized diagram text and its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    text: String,
    origin: DiagramOrigin,
}

impl DiagramSource {
    /// Create a source from raw text, normalizing line endings and blank edges.
    #[must_use]
    pub fn new(raw: &str, origin: DiagramOrigin) -> Self {
        Self {
            text: normalize_text(raw),
            origin,
        }
    }

    /// Diagram text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Where the text came from.
    #[must_use]
    pub fn origin(&self) -> &DiagramOrigin {
        &self.origin
    }
}

/// Output of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDiagram {
    /// Diagram text.
    pub source: DiagramSource,
    /// Defaults merged with directive overrides.
    pub options: RenderOptions,
    /// Node attributes.
    pub presentation: Presentation,
}

/// Directive resolution error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Referenced file is missing or unreadable.
    #[error("diagram file {} not found or reading it failed: {source}", .path.display())]
    SourceNotFound {
        /// Resolved path of the referenced file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Referenced file is not valid text in the declared encoding.
    #[error("diagram file {} is not valid {encoding} text", .path.display())]
    Undecodable {
        /// Resolved path of the referenced file.
        path: PathBuf,
        /// Encoding the file was decoded with.
        encoding: &'static str,
    },
    /// Diagram text is blank.
    #[error("ignoring diagram directive without content")]
    EmptyDiagram,
    /// Both a file argument and an inline body were given.
    #[error("diagram directive cannot have both content and a filename argument ({argument})")]
    AmbiguousSource {
        /// The file argument.
        argument: String,
    },
    /// Unknown option key or malformed value.
    #[error("invalid diagram option '{key}': {reason}")]
    InvalidOption {
        /// Offending option key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Resolve a directive against document-wide defaults.
///
/// A file argument is read relative to `base_dir` (normally the directory of
/// the document containing the directive). Options are validated before any
/// file is read, so a typo in an option is reported even when the file is
/// missing.
///
/// # Errors
///
/// Returns [`ResolveError`] for unknown or malformed options, a missing or
/// unreadable file, blank diagram text, or a directive with both a body and
/// a file argument.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use ditaa_diagrams::{Directive, RenderOptions, resolve};
///
/// let directive = Directive::inline("A --> B").with_option("scale", "2");
/// let resolved = resolve(&directive, &RenderOptions::default(), Path::new(".")).unwrap();
///
/// assert_eq!(resolved.source.text(), "A --> B");
/// assert_eq!(resolved.options.scale, 2.0);
/// ```
pub fn resolve(
    directive: &Directive,
    defaults: &RenderOptions,
    base_dir: &Path,
) -> Result<ResolvedDiagram, ResolveError> {
    let mut options = defaults.clone();
    let mut presentation = Presentation::default();
    for (key, value) in &directive.options {
        apply_option(&mut options, &mut presentation, key, value.as_deref())?;
    }
    let encoding = options.text_encoding()?;

    let source = match directive.argument.as_deref().map(str::trim) {
        Some(argument) if !argument.is_empty() => {
            if !directive.body.trim().is_empty() {
                return Err(ResolveError::AmbiguousSource {
                    argument: argument.to_owned(),
                });
            }
            let path = base_dir.join(argument);
            let bytes = std::fs::read(&path).map_err(|source| ResolveError::SourceNotFound {
                path: path.clone(),
                source,
            })?;
            let (raw, _, malformed) = encoding.decode(&bytes);
            if malformed {
                return Err(ResolveError::Undecodable {
                    path,
                    encoding: encoding.name(),
                });
            }
            DiagramSource::new(&raw, DiagramOrigin::FileReference(path))
        }
        _ => DiagramSource::new(&directive.body, DiagramOrigin::Inline),
    };

    if source.text().trim().is_empty() {
        return Err(ResolveError::EmptyDiagram);
    }

    Ok(ResolvedDiagram {
        source,
        options,
        presentation,
    })
}

/// Normalize line endings and drop blank leading and trailing lines.
///
/// Indentation of the first content line and interior blank lines are kept:
/// both are significant in ASCII-art diagrams.
fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().collect();

    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |i| i + 1);

    lines[start..end]
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ditaa_cache::ArtifactFormat;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn defaults() -> RenderOptions {
        RenderOptions::default()
    }

    #[test]
    fn test_inline_body() {
        let resolved = resolve(
            &Directive::inline("+---+\n| A |\n+---+"),
            &defaults(),
            Path::new("."),
        )
        .unwrap();

        assert_eq!(resolved.source.text(), "+---+\n| A |\n+---+");
        assert_eq!(resolved.source.origin(), &DiagramOrigin::Inline);
        assert_eq!(resolved.options, defaults());
    }

    #[test]
    fn test_blank_body_is_empty_diagram() {
        let err = resolve(&Directive::inline("  \n\t\n"), &defaults(), Path::new(".")).unwrap_err();
        assert!(matches!(err, ResolveError::EmptyDiagram));
    }

    #[test]
    fn test_file_reference() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("flow.txt"), "A --> B\r\n").unwrap();

        let resolved = resolve(&Directive::file("flow.txt"), &defaults(), tmp.path()).unwrap();

        assert_eq!(resolved.source.text(), "A --> B");
        assert_eq!(
            resolved.source.origin(),
            &DiagramOrigin::FileReference(tmp.path().join("flow.txt"))
        );
    }

    #[test]
    fn test_file_decoded_with_declared_encoding() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("latin.txt"), b"| \xC4rger |\n").unwrap();
        let directive = Directive::file("latin.txt").with_option("encoding", "ISO-8859-1");

        let resolved = resolve(&directive, &defaults(), tmp.path()).unwrap();

        assert_eq!(resolved.source.text(), "| \u{c4}rger |");
    }

    #[test]
    fn test_file_invalid_in_encoding_is_undecodable() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("latin.txt"), b"| \xC4rger |\n").unwrap();

        let err = resolve(&Directive::file("latin.txt"), &defaults(), tmp.path()).unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Undecodable { encoding: "UTF-8", .. }
        ));
    }

    #[test]
    fn test_unknown_default_encoding_rejected() {
        let defaults = RenderOptions {
            encoding: Some("klingon".to_owned()),
            ..RenderOptions::default()
        };

        let err = resolve(&Directive::inline("A --> B"), &defaults, Path::new(".")).unwrap_err();

        assert!(matches!(err, ResolveError::InvalidOption { ref key, .. } if key == "encoding"));
    }

    #[test]
    fn test_missing_file_is_source_not_found() {
        let tmp = TempDir::new().unwrap();

        let err = resolve(&Directive::file("missing.txt"), &defaults(), tmp.path()).unwrap_err();

        match err {
            ResolveError::SourceNotFound { path, .. } => {
                assert_eq!(path, tmp.path().join("missing.txt"));
            }
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_file_is_empty_diagram() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("blank.txt"), "\n\n").unwrap();

        let err = resolve(&Directive::file("blank.txt"), &defaults(), tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::EmptyDiagram));
    }

    #[test]
    fn test_body_and_file_is_ambiguous() {
        let directive = Directive {
            body: "A --> B".to_owned(),
            argument: Some("flow.txt".to_owned()),
            ..Directive::default()
        };

        let err = resolve(&directive, &defaults(), Path::new(".")).unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousSource { .. }));
    }

    #[test]
    fn test_directive_overrides_defaults_field_by_field() {
        let defaults = RenderOptions {
            scale: 1.5,
            tab_size: 4,
            no_shadows: true,
            encoding: Some("UTF-8".to_owned()),
            ..RenderOptions::default()
        };
        let directive = Directive::inline("A --> B")
            .with_option("scale", "2.0")
            .with_flag("rounded-corners")
            .with_option("formats", "raster,vector");

        let resolved = resolve(&directive, &defaults, Path::new(".")).unwrap();

        assert_eq!(
            resolved.options,
            RenderOptions {
                scale: 2.0,
                tab_size: 4,
                rounded_corners: true,
                no_shadows: true,
                no_separation: false,
                encoding: Some("UTF-8".to_owned()),
                output_formats: BTreeSet::from([ArtifactFormat::Raster, ArtifactFormat::Vector]),
            }
        );
    }

    #[test]
    fn test_unknown_option_names_key() {
        let directive = Directive::inline("A --> B").with_option("shadow", "none");

        let err = resolve(&directive, &defaults(), Path::new(".")).unwrap_err();
        match err {
            ResolveError::InvalidOption { key, .. } => assert_eq!(key, "shadow"),
            other => panic!("expected InvalidOption, got {other:?}"),
        }
    }

    #[test]
    fn test_option_errors_reported_before_file_read() {
        let directive = Directive::file("missing.txt").with_option("tabsize", "wide");

        let err = resolve(&directive, &defaults(), Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidOption { .. }));
    }

    #[test]
    fn test_presentation_options() {
        let directive = Directive::inline("A --> B")
            .with_option("alt", "Request flow")
            .with_option("caption", "Figure 2")
            .with_flag("inline");

        let resolved = resolve(&directive, &defaults(), Path::new(".")).unwrap();

        assert_eq!(
            resolved.presentation,
            Presentation {
                alt: Some("Request flow".to_owned()),
                caption: Some("Figure 2".to_owned()),
                inline: true,
            }
        );
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("\n\n  +--+  \r\n  |  |\r\n\n  +--+\n\n"),
            "  +--+\n  |  |\n\n  +--+"
        );
        assert_eq!(normalize_text("a\rb"), "a\nb");
        assert_eq!(normalize_text("   \n  "), "");
    }
}
