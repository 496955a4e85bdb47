//! Markup generation for diagram nodes.
//!
//! Hosts that do not walk [`DiagramNode`]s themselves can turn them into
//! output text with a [`NodeMarkup`] implementation:
//! - [`HtmlMarkup`]: `<img>` wrapped in `<p class="ditaa">` (or `<span>` inline)
//! - [`LatexMarkup`]: `\includegraphics` / `\includesvg` paragraphs

use ditaa_cache::ArtifactFormat;

use crate::embed::EmbedNode;
use crate::pipeline::{DiagramNode, Placeholder};

/// Generates output markup for diagram nodes.
pub trait NodeMarkup: Send + Sync {
    /// Markup for an embedded diagram.
    fn embed(&self, node: &EmbedNode) -> String;

    /// Markup for a diagram that failed to render.
    fn placeholder(&self, placeholder: &Placeholder) -> String;

    /// Dispatch on the node kind.
    fn markup(&self, node: &DiagramNode) -> String {
        match node {
            DiagramNode::Embed(embed) => self.embed(embed),
            DiagramNode::Placeholder(placeholder) => self.placeholder(placeholder),
        }
    }
}

/// HTML markup.
///
/// Block diagrams: `<p class="ditaa"><img src="{prefix}{path}" .../></p>`.
/// Captioned block diagrams use `<figure class="ditaa">` with a `<figcaption>`.
#[derive(Debug, Default)]
pub struct HtmlMarkup {
    /// Prefix prepended to asset paths (e.g., "/" or "../").
    pub path_prefix: String,
}

impl HtmlMarkup {
    /// Create HTML markup with the given asset path prefix.
    #[must_use]
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
        }
    }

    fn img(&self, node: &EmbedNode) -> String {
        format!(
            r#"<img src="{}{}" width="{}" height="{}" alt="{}"/>"#,
            escape_html(&self.path_prefix),
            escape_html(&node.asset_path),
            node.width,
            node.height,
            escape_html(&node.alt)
        )
    }
}

impl NodeMarkup for HtmlMarkup {
    fn embed(&self, node: &EmbedNode) -> String {
        let img = self.img(node);
        if node.inline {
            return format!(r#"<span class="ditaa">{img}</span>"#);
        }
        match &node.caption {
            Some(caption) => format!(
                "<figure class=\"ditaa\">{img}<figcaption>{}</figcaption></figure>\n",
                escape_html(caption)
            ),
            None => format!("<p class=\"ditaa\">{img}</p>\n"),
        }
    }

    fn placeholder(&self, placeholder: &Placeholder) -> String {
        format!(
            "<div class=\"ditaa-error\"><p>{}</p><pre>{}</pre></div>\n",
            escape_html(&placeholder.message),
            escape_html(&placeholder.source_text)
        )
    }
}

/// LaTeX markup.
///
/// Raster artifacts use `\includegraphics`, vector artifacts `\includesvg`
/// (from the `svg` package). Captioned diagrams become floating figures.
#[derive(Debug, Default)]
pub struct LatexMarkup {
    /// Prefix prepended to asset paths.
    pub path_prefix: String,
}

impl LatexMarkup {
    /// Create LaTeX markup with the given asset path prefix.
    #[must_use]
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
        }
    }

    fn include(&self, node: &EmbedNode) -> String {
        let command = match node.format {
            ArtifactFormat::Raster => "includegraphics",
            ArtifactFormat::Vector => "includesvg",
        };
        format!("\\{command}{{{}{}}}", self.path_prefix, node.asset_path)
    }
}

impl NodeMarkup for LatexMarkup {
    fn embed(&self, node: &EmbedNode) -> String {
        let include = self.include(node);
        match &node.caption {
            Some(caption) if !node.inline => format!(
                "\\begin{{figure}}[htbp]\n\\centering\n{include}\n\\caption{{{}}}\n\\end{{figure}}\n",
                escape_latex(caption)
            ),
            _ => format!("\\par{include}\\par"),
        }
    }

    fn placeholder(&self, placeholder: &Placeholder) -> String {
        format!(
            "\\par\\textbf{{{}}}\\par\n\\begin{{verbatim}}\n{}\n\\end{{verbatim}}\n",
            escape_latex(&placeholder.message),
            placeholder.source_text
        )
    }
}

fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

fn escape_latex(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\textbackslash{}"),
            '~' => result.push_str("\\textasciitilde{}"),
            '^' => result.push_str("\\textasciicircum{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ditaa_cache::Fingerprint;
    use pretty_assertions::assert_eq;

    use crate::directive::SourceLocation;

    fn node() -> EmbedNode {
        EmbedNode {
            fingerprint: Fingerprint::from_digest(&[1; 32]),
            asset_path: "_images/ditaa/abc.png".to_owned(),
            width: 120,
            height: 60,
            alt: "A --> B".to_owned(),
            caption: None,
            inline: false,
            format: ArtifactFormat::Raster,
            scale: 1.0,
            degraded: false,
        }
    }

    fn placeholder() -> Placeholder {
        Placeholder {
            message: "ditaa exited with error".to_owned(),
            source_text: "<A> --> B".to_owned(),
            location: Some(SourceLocation::new("index.rst", 3)),
        }
    }

    #[test]
    fn test_html_block() {
        assert_eq!(
            HtmlMarkup::new("/").embed(&node()),
            "<p class=\"ditaa\"><img src=\"/_images/ditaa/abc.png\" width=\"120\" height=\"60\" alt=\"A --&gt; B\"/></p>\n"
        );
    }

    #[test]
    fn test_html_inline() {
        let node = EmbedNode {
            inline: true,
            caption: Some("ignored inline".to_owned()),
            ..node()
        };
        let html = HtmlMarkup::default().embed(&node);
        assert!(html.starts_with("<span class=\"ditaa\"><img src=\"_images/ditaa/abc.png\""));
        assert!(html.ends_with("</span>"));
    }

    #[test]
    fn test_html_caption() {
        let node = EmbedNode {
            caption: Some("Data & control".to_owned()),
            ..node()
        };
        let html = HtmlMarkup::default().embed(&node);
        assert!(html.starts_with("<figure class=\"ditaa\"><img"));
        assert!(html.contains("<figcaption>Data &amp; control</figcaption></figure>"));
    }

    #[test]
    fn test_html_placeholder_escapes_source() {
        let html = HtmlMarkup::default().markup(&DiagramNode::Placeholder(placeholder()));
        assert_eq!(
            html,
            "<div class=\"ditaa-error\"><p>ditaa exited with error</p><pre>&lt;A&gt; --&gt; B</pre></div>\n"
        );
    }

    #[test]
    fn test_latex_raster() {
        assert_eq!(
            LatexMarkup::default().markup(&DiagramNode::Embed(node())),
            "\\par\\includegraphics{_images/ditaa/abc.png}\\par"
        );
    }

    #[test]
    fn test_latex_vector_with_caption() {
        let node = EmbedNode {
            format: ArtifactFormat::Vector,
            asset_path: "abc.svg".to_owned(),
            caption: Some("50% of flows".to_owned()),
            ..node()
        };
        assert_eq!(
            LatexMarkup::default().embed(&node),
            "\\begin{figure}[htbp]\n\\centering\n\\includesvg{abc.svg}\n\\caption{50\\% of flows}\n\\end{figure}\n"
        );
    }

    #[test]
    fn test_latex_placeholder_is_verbatim() {
        let latex = LatexMarkup::default().placeholder(&placeholder());
        assert!(latex.contains("\\begin{verbatim}\n<A> --> B\n\\end{verbatim}"));
    }

    #[test]
    fn test_escape_latex() {
        assert_eq!(escape_latex("a_b {c} ~"), "a\\_b \\{c\\} \\textasciitilde{}");
    }
}
