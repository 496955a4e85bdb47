//! Pixel dimensions of rendered images.

use std::sync::LazyLock;

use ditaa_cache::ArtifactFormat;
use regex::Regex;

/// Regex to match the SVG root `width` attribute (optionally `px` or `pt`).
static SVG_WIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<svg[^>]*\swidth="(\d+(?:\.\d+)?)(?:px|pt)?""#).unwrap());

/// Regex to match the SVG root `height` attribute (optionally `px` or `pt`).
static SVG_HEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<svg[^>]*\sheight="(\d+(?:\.\d+)?)(?:px|pt)?""#).unwrap());

/// Regex to match the SVG root `viewBox` attribute.
static SVG_VIEWBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<svg[^>]*\sviewBox="[-\d.]+[\s,]+[-\d.]+[\s,]+(\d+(?:\.\d+)?)[\s,]+(\d+(?:\.\d+)?)""#)
        .unwrap()
});

/// Measure an encoded image of the given format.
///
/// Returns `None` when the data is not a well-formed image of that format.
pub(crate) fn measure(format: ArtifactFormat, data: &[u8]) -> Option<(u32, u32)> {
    match format {
        ArtifactFormat::Raster => png_dimensions(data),
        ArtifactFormat::Vector => svg_dimensions(data),
    }
}

/// Extract width and height from PNG image data.
///
/// PNG format: 8-byte signature, then IHDR chunk with width/height at bytes 16-24.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 {
        return None;
    }

    if &data[0..8] != b"\x89PNG\r\n\x1a\n" {
        return None;
    }

    // IHDR chunk: width at bytes 16-20, height at bytes 20-24 (big-endian)
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Extract width and height from the SVG root element.
///
/// Uses explicit `width`/`height` attributes, falling back to the `viewBox`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn svg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let svg = std::str::from_utf8(data).ok()?;
    let parse = |re: &Regex, group: usize| -> Option<u32> {
        let value: f64 = re.captures(svg)?.get(group)?.as_str().parse().ok()?;
        Some(value.round() as u32)
    };

    let dims = match (parse(&SVG_WIDTH_RE, 1), parse(&SVG_HEIGHT_RE, 1)) {
        (Some(width), Some(height)) => (width, height),
        _ => (parse(&SVG_VIEWBOX_RE, 1)?, parse(&SVG_VIEWBOX_RE, 2)?),
    };
    Some(dims)
}
