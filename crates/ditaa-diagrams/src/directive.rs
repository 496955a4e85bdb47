//! Host-facing directive input.
//!
//! A [`Directive`] is what the host document pipeline hands over for each
//! diagram block it discovers: the raw body, an optional file argument, the
//! option list exactly as written, and where the block was found.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Position of a directive in the document source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Document the directive appears in.
    pub document: PathBuf,
    /// 1-based line of the directive marker.
    pub line: u32,
}

impl SourceLocation {
    /// Create a location.
    #[must_use]
    pub fn new(document: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            document: document.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document.display(), self.line)
    }
}

/// A diagram directive occurrence.
///
/// # Example
///
/// ```
/// use ditaa_diagrams::{Directive, SourceLocation};
///
/// let directive = Directive::inline("+---+\n| A |\n+---+")
///     .with_option("scale", "2")
///     .with_flag("no-shadows")
///     .at(SourceLocation::new("docs/index.rst", 12));
///
/// assert_eq!(directive.options.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    /// Raw directive content.
    pub body: String,
    /// Optional file argument naming an external diagram source.
    pub argument: Option<String>,
    /// Options in source order; flags carry no value.
    pub options: Vec<(String, Option<String>)>,
    /// Where the directive was found, for diagnostics.
    pub location: Option<SourceLocation>,
}

impl Directive {
    /// Directive with an inline body.
    #[must_use]
    pub fn inline(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Directive referencing an external file.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            argument: Some(path.into()),
            ..Self::default()
        }
    }

    /// Add a `key: value` option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), Some(value.into())));
        self
    }

    /// Add a value-less flag option.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.options.push((key.into(), None));
        self
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let location = SourceLocation::new("docs/guide.rst", 42);
        assert_eq!(location.to_string(), "docs/guide.rst:42");
    }

    #[test]
    fn test_builder_keeps_option_order() {
        let directive = Directive::file("arch.txt")
            .with_flag("rounded-corners")
            .with_option("scale", "1.5");

        assert_eq!(directive.argument.as_deref(), Some("arch.txt"));
        assert_eq!(
            directive.options,
            vec![
                ("rounded-corners".to_owned(), None),
                ("scale".to_owned(), Some("1.5".to_owned())),
            ]
        );
    }
}
