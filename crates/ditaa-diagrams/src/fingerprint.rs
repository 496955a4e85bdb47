//! Diagram fingerprint computation.
//!
//! Provides [`DiagramKey`] for computing the content-based hash used as the
//! artifact cache key.

use ditaa_cache::Fingerprint;
use sha2::{Digest, Sha256};

use crate::embed::FormatFamily;
use crate::options::RenderOptions;

/// Diagram parameters for fingerprint computation.
///
/// Contains everything that affects the rendered output and its selection:
/// the normalized text, every render option, and the target format family.
#[derive(Debug)]
pub struct DiagramKey<'a> {
    /// Normalized diagram text.
    pub text: &'a str,
    /// Resolved render options.
    pub options: &'a RenderOptions,
    /// Target format family.
    pub family: FormatFamily,
}

impl DiagramKey<'_> {
    /// Compute the fingerprint for this key.
    ///
    /// # Hash Format
    ///
    /// SHA-256 of the canonical option line followed by a newline and the text:
    ///
    /// ```text
    /// scale=1;tabs=8;round=0;shadows=1;separation=1;encoding=;formats=raster;family=screen
    /// <text>
    /// ```
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let content = format!("{}\n{}", self.canonical_options(), self.text);
        let digest = Sha256::digest(content.as_bytes());
        Fingerprint::from_digest(digest.as_slice())
    }

    fn canonical_options(&self) -> String {
        let o = self.options;
        let formats = o
            .output_formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "scale={};tabs={};round={};shadows={};separation={};encoding={};formats={};family={}",
            o.scale,
            o.tab_size,
            u8::from(o.rounded_corners),
            u8::from(!o.no_shadows),
            u8::from(!o.no_separation),
            o.encoding.as_deref().unwrap_or_default(),
            formats,
            self.family.as_str(),
        )
    }
}
