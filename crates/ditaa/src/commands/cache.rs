//! `ditaa cache` subcommand group.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use ditaa_cache::{ArtifactCache, FileArtifactCache};
use ditaa_config::{CliSettings, Config};
use ditaa_diagrams::CACHE_VERSION;

use crate::error::CliError;
use crate::output::Output;

/// Artifact cache commands.
#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Remove every cached artifact, forcing a full re-render.
    Clear(ClearArgs),
}

impl CacheCommand {
    /// Execute the cache subcommand.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        match self {
            Self::Clear(args) => args.execute(),
        }
    }
}

/// Arguments for the cache clear command.
#[derive(Args)]
pub(crate) struct ClearArgs {
    /// Artifact cache directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover ditaa.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ClearArgs {
    fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            cache_dir: self.cache_dir,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let cache_dir = config.build_resolved.cache_dir;

        let cache = FileArtifactCache::new(cache_dir.clone(), CACHE_VERSION)?;
        let entries = cache.len();
        cache.clear()?;

        output.success(&format!(
            "Cleared {entries} cached diagram(s) from {}",
            cache_dir.display()
        ));
        Ok(())
    }
}
