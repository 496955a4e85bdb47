//! Render options and directive option parsing.

use std::collections::BTreeSet;

use ditaa_cache::ArtifactFormat;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;

use crate::consts::DEFAULT_TAB_SIZE;
use crate::resolve::ResolveError;

/// Fully resolved rendering options.
///
/// Every field feeds the fingerprint, so any change forces a re-render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOptions {
    /// Scale factor applied by the tool and to embed dimensions.
    pub scale: f64,
    /// Tab width in columns.
    pub tab_size: u32,
    /// Render rounded box corners.
    pub rounded_corners: bool,
    /// Disable drop shadows.
    pub no_shadows: bool,
    /// Disable separation of common edges.
    pub no_separation: bool,
    /// Encoding of referenced files and of the text handed to the tool.
    /// UTF-8 when unset.
    pub encoding: Option<String>,
    /// Formats to render. Never empty.
    pub output_formats: BTreeSet<ArtifactFormat>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            tab_size: DEFAULT_TAB_SIZE,
            rounded_corners: false,
            no_shadows: false,
            no_separation: false,
            encoding: None,
            output_formats: BTreeSet::from([ArtifactFormat::Raster]),
        }
    }
}

impl RenderOptions {
    /// Encoding named by [`encoding`](Self::encoding).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidOption`] for an unknown label or an
    /// encoding that is not a superset of ASCII (UTF-16).
    pub fn text_encoding(&self) -> Result<&'static Encoding, ResolveError> {
        let Some(label) = self.encoding.as_deref() else {
            return Ok(UTF_8);
        };
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) if encoding.output_encoding() == encoding => Ok(encoding),
            Some(_) => Err(invalid(
                "encoding",
                format!("'{label}' cannot be used for diagram text"),
            )),
            None => Err(invalid("encoding", format!("unknown encoding '{label}'"))),
        }
    }
}

/// Presentation attributes that never affect rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Presentation {
    /// Explicit alt text.
    pub alt: Option<String>,
    /// Caption shown with the diagram.
    pub caption: Option<String>,
    /// Embed inline rather than as a block.
    pub inline: bool,
}

/// Option keys accepted on a directive.
pub const OPTION_KEYS: [&str; 10] = [
    "scale",
    "tabsize",
    "rounded-corners",
    "no-shadows",
    "no-separation",
    "encoding",
    "formats",
    "alt",
    "caption",
    "inline",
];

/// Apply a single directive option on top of already merged values.
pub(crate) fn apply_option(
    options: &mut RenderOptions,
    presentation: &mut Presentation,
    key: &str,
    value: Option<&str>,
) -> Result<(), ResolveError> {
    match key {
        "scale" => options.scale = parse_scale(required(key, value)?)?,
        "tabsize" => options.tab_size = parse_tab_size(required(key, value)?)?,
        "rounded-corners" => options.rounded_corners = parse_flag(key, value)?,
        "no-shadows" => options.no_shadows = parse_flag(key, value)?,
        "no-separation" => options.no_separation = parse_flag(key, value)?,
        "encoding" => {
            options.encoding = Some(required(key, value)?.to_owned());
            options.text_encoding()?;
        }
        "formats" => options.output_formats = parse_formats(required(key, value)?)?,
        "alt" => presentation.alt = Some(required(key, value)?.to_owned()),
        "caption" => presentation.caption = Some(required(key, value)?.to_owned()),
        "inline" => presentation.inline = parse_flag(key, value)?,
        _ => {
            return Err(invalid(
                key,
                format!("unknown option (valid: {})", OPTION_KEYS.join(", ")),
            ));
        }
    }
    Ok(())
}

fn invalid(key: &str, reason: impl Into<String>) -> ResolveError {
    ResolveError::InvalidOption {
        key: key.to_owned(),
        reason: reason.into(),
    }
}

/// Non-blank value of an option that needs one.
fn required<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, ResolveError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(invalid(key, "a value is required")),
    }
}

/// Flags are set by presence; an explicit boolean value is also accepted.
fn parse_flag(key: &str, value: Option<&str>) -> Result<bool, ResolveError> {
    match value.map(str::trim) {
        None | Some("" | "true" | "yes") => Ok(true),
        Some("false" | "no") => Ok(false),
        Some(other) => Err(invalid(key, format!("flag takes no value, got '{other}'"))),
    }
}

fn parse_scale(value: &str) -> Result<f64, ResolveError> {
    match value.parse::<f64>() {
        Ok(scale) if scale.is_finite() && scale > 0.0 => Ok(scale),
        _ => Err(invalid("scale", format!("expected a positive number, got '{value}'"))),
    }
}

fn parse_tab_size(value: &str) -> Result<u32, ResolveError> {
    match value.parse::<u32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(invalid("tabsize", format!("expected a positive integer, got '{value}'"))),
    }
}

fn parse_formats(value: &str) -> Result<BTreeSet<ArtifactFormat>, ResolveError> {
    let mut formats = BTreeSet::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format = ArtifactFormat::parse(name).ok_or_else(|| {
            invalid("formats", format!("unknown format '{name}' (valid: raster, vector)"))
        })?;
        formats.insert(format);
    }
    if formats.is_empty() {
        return Err(invalid("formats", "at least one format is required"));
    }
    Ok(formats)
}
