//! `ditaa render` command implementation.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use ditaa_cache::{ArtifactFormat, FileArtifactCache};
use ditaa_config::{CliSettings, Config, DefaultsConfig};
use ditaa_diagrams::{
    AbortSignal, CACHE_VERSION, CommandRenderer, DiagramNode, DiagramPipeline, Directive,
    FormatFamily, HtmlMarkup, LatexMarkup, NodeMarkup, RenderOptions, SourceLocation,
};

use crate::error::CliError;
use crate::output::Output;

/// Output written to stdout for each diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Emit {
    /// Serialized node (one JSON document per diagram).
    Json,
    /// HTML markup.
    Html,
    /// LaTeX markup.
    Latex,
}

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Diagram source files.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format family or builder name (screen, print, html, latex, ...).
    #[arg(short, long, default_value = "html")]
    format: String,

    /// What to print for each diagram.
    #[arg(short, long, value_enum, default_value = "json")]
    emit: Emit,

    /// Default scale factor (overrides config).
    #[arg(long)]
    scale: Option<f64>,

    /// Diagram tool executable (overrides config).
    #[arg(long)]
    tool: Option<String>,

    /// Seconds a single tool invocation may run (overrides config).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Directory asset paths are made relative to (overrides config).
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Artifact cache directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Fail on the first diagram error instead of emitting placeholders.
    #[arg(long)]
    strict: bool,

    /// Path to configuration file (default: auto-discover ditaa.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output (show render timing logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, a fatal diagram error
    /// occurs, or any diagram fails in strict mode.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;

        let family = FormatFamily::parse(&self.format)?;
        let defaults = render_options(&config.defaults)?;
        let build = &config.build_resolved;

        output.info(&format!("Tool: {}", config.tool.command));
        output.info(&format!("Cache directory: {}", build.cache_dir.display()));

        let abort = AbortSignal::new();
        install_interrupt_handler(&abort)?;
        let renderer = CommandRenderer::new(config.tool.command.clone())
            .args(&config.tool.args)
            .timeout(config.tool.timeout())
            .abort_signal(abort.clone());
        let cache = FileArtifactCache::new(build.cache_dir.clone(), CACHE_VERSION)?;
        let pipeline =
            DiagramPipeline::new(Arc::new(renderer), Arc::new(cache), build.asset_root.clone())
                .defaults(defaults)
                .strict(build.strict)
                .abort_signal(abort);

        let directives: Vec<Directive> = self.files.iter().map(|f| file_directive(f)).collect();
        tracing::debug!(files = directives.len(), %family, "Rendering diagrams");
        let results = pipeline.process_all(&directives, family);

        let mut stdout = io::stdout().lock();
        let mut placeholders = 0;
        let mut failures = 0;
        for result in results {
            match result {
                Ok(node) => {
                    if matches!(node, DiagramNode::Placeholder(_)) {
                        placeholders += 1;
                    }
                    writeln!(stdout, "{}", emit(&node, self.emit)?)?;
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    output.error(&format!("Error: {err}"));
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            return Err(CliError::Failed(failures));
        }
        if placeholders > 0 {
            output.warning(&format!(
                "{placeholders} diagram(s) replaced by placeholders"
            ));
        } else {
            output.success(&format!("Rendered {} diagram(s)", self.files.len()));
        }
        Ok(())
    }

    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            tool: self.tool.clone(),
            timeout_secs: self.timeout,
            scale: self.scale,
            asset_root: self.asset_root.clone(),
            cache_dir: self.cache_dir.clone(),
            strict: self.strict.then_some(true),
        }
    }
}

/// Raise `abort` on Ctrl-C so running renders are killed and their scratch
/// directories removed before the process exits.
fn install_interrupt_handler(abort: &AbortSignal) -> Result<(), CliError> {
    let abort = abort.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, cancelling renders");
        abort.raise();
    })?;
    Ok(())
}

/// Directive referencing a diagram file, located at the file itself.
fn file_directive(path: &Path) -> Directive {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Directive::file(name).at(SourceLocation::new(path, 1))
}

/// Convert the `[defaults]` table into render options.
fn render_options(defaults: &DefaultsConfig) -> Result<RenderOptions, CliError> {
    let output_formats = defaults
        .formats
        .iter()
        .map(|name| {
            ArtifactFormat::parse(name)
                .ok_or_else(|| CliError::Validation(format!("unknown format '{name}'")))
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(RenderOptions {
        scale: defaults.scale,
        tab_size: defaults.tabsize,
        rounded_corners: defaults.rounded_corners,
        no_shadows: defaults.no_shadows,
        no_separation: defaults.no_separation,
        encoding: defaults.encoding.clone(),
        output_formats,
    })
}

fn emit(node: &DiagramNode, emit: Emit) -> Result<String, CliError> {
    Ok(match emit {
        Emit::Json => serde_json::to_string_pretty(node)?,
        Emit::Html => HtmlMarkup::default().markup(node),
        Emit::Latex => LatexMarkup::default().markup(node),
    })
}
