//! CLI error types.

use ditaa_cache::CacheError;
use ditaa_config::ConfigError;
use ditaa_diagrams::{DiagramError, EmbedError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Embed(#[from] EmbedError),

    #[error("{0}")]
    Diagram(#[from] DiagramError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("{0} diagram(s) failed to render")]
    Failed(usize),

    #[error("{0}")]
    Validation(String),
}
