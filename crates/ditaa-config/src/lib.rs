//! Configuration management for ditaa diagram rendering.
//!
//! Parses `ditaa.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `tool.command`
//! - `defaults.encoding`
//! - `build.asset_root`
//! - `build.cache_dir`

mod expand;

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the rendering executable.
    pub tool: Option<String>,
    /// Override the render timeout in seconds (`--timeout`).
    pub timeout_secs: Option<u64>,
    /// Override the default diagram scale.
    pub scale: Option<f64>,
    /// Override the static-asset root.
    pub asset_root: Option<PathBuf>,
    /// Override the artifact cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Override strict mode.
    pub strict: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "ditaa.toml";

/// Default cache directory, relative to the asset root.
const DEFAULT_CACHE_SUBDIR: &str = "_images/ditaa";

/// Format names accepted in `defaults.formats`.
const KNOWN_FORMATS: [&str; 2] = ["raster", "vector"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool configuration.
    pub tool: ToolConfig,
    /// Document-wide rendering defaults.
    pub defaults: DefaultsConfig,
    /// Build layout (paths are relative strings from TOML).
    build: BuildConfigRaw,

    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: BuildConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// External rendering tool configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable name or path.
    pub command: String,
    /// Extra arguments placed before the option flags.
    pub args: Vec<String>,
    /// Maximum time a single invocation may run.
    pub timeout_secs: u64,
}

impl ToolConfig {
    /// Invocation timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: "ditaa".to_owned(),
            args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

/// Document-wide rendering defaults, overridable per directive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Scale factor.
    pub scale: f64,
    /// Tab width in columns.
    pub tabsize: u32,
    /// Render rounded box corners.
    pub rounded_corners: bool,
    /// Disable drop shadows.
    pub no_shadows: bool,
    /// Disable separation of common edges.
    pub no_separation: bool,
    /// Input encoding passed to the tool.
    pub encoding: Option<String>,
    /// Output formats to render (`raster`, `vector`).
    pub formats: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            tabsize: 8,
            rounded_corners: false,
            no_shadows: false,
            no_separation: false,
            encoding: None,
            formats: vec!["raster".to_owned()],
        }
    }
}

/// Raw build configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    asset_root: Option<String>,
    cache_dir: Option<String>,
    strict: Option<bool>,
}

/// Resolved build configuration with absolute paths.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildConfig {
    /// Root of the build's static assets; embed paths are relative to it.
    pub asset_root: PathBuf,
    /// Artifact cache directory, always a subdirectory of `asset_root`.
    pub cache_dir: PathBuf,
    /// Propagate render errors instead of emitting placeholders.
    pub strict: bool,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`tool.command`").
        field: String,
        /// Error message (e.g., "${`DITAA_HOME`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `ditaa.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated again after overrides.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(tool) = &settings.tool {
            self.tool.command.clone_from(tool);
        }
        if let Some(timeout_secs) = settings.timeout_secs {
            self.tool.timeout_secs = timeout_secs;
        }
        if let Some(scale) = settings.scale {
            self.defaults.scale = scale;
        }
        if let Some(asset_root) = &settings.asset_root {
            // Cache follows the asset root unless it was set explicitly
            if self.build.cache_dir.is_none() && settings.cache_dir.is_none() {
                self.build_resolved.cache_dir = asset_root.join(DEFAULT_CACHE_SUBDIR);
            }
            self.build_resolved.asset_root.clone_from(asset_root);
        }
        if let Some(cache_dir) = &settings.cache_dir {
            self.build_resolved.cache_dir.clone_from(cache_dir);
        }
        if let Some(strict) = settings.strict {
            self.build_resolved.strict = strict;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let asset_root = base.join("_build/html");
        Self {
            tool: ToolConfig::default(),
            defaults: DefaultsConfig::default(),
            build: BuildConfigRaw::default(),
            build_resolved: BuildConfig {
                cache_dir: asset_root.join(DEFAULT_CACHE_SUBDIR),
                asset_root,
                strict: false,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_tool()?;
        self.validate_defaults()?;
        self.validate_build()?;
        Ok(())
    }

    /// Embed paths are relative to the asset root, so the cache must live
    /// below it. It may never be the asset root itself, which the cache would
    /// wipe on a version change.
    fn validate_build(&self) -> Result<(), ConfigError> {
        let build = &self.build_resolved;
        let inside = build
            .cache_dir
            .strip_prefix(&build.asset_root)
            .is_ok_and(|relative| {
                relative.components().any(|c| matches!(c, Component::Normal(_)))
                    && !relative.components().any(|c| c == Component::ParentDir)
            });
        if !inside {
            return Err(ConfigError::Validation(format!(
                "build.cache_dir ({}) must be a subdirectory of build.asset_root ({})",
                build.cache_dir.display(),
                build.asset_root.display()
            )));
        }
        Ok(())
    }

    fn validate_tool(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.tool.command, "tool.command")?;
        if self.tool.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tool.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_defaults(&self) -> Result<(), ConfigError> {
        let defaults = &self.defaults;

        if !defaults.scale.is_finite() || defaults.scale <= 0.0 {
            return Err(ConfigError::Validation(
                "defaults.scale must be a positive number".to_owned(),
            ));
        }
        if defaults.tabsize == 0 {
            return Err(ConfigError::Validation(
                "defaults.tabsize must be greater than 0".to_owned(),
            ));
        }
        if let Some(encoding) = &defaults.encoding {
            require_non_empty(encoding, "defaults.encoding")?;
        }
        if defaults.formats.is_empty() {
            return Err(ConfigError::Validation(
                "defaults.formats must list at least one format".to_owned(),
            ));
        }
        if let Some(unknown) = defaults
            .formats
            .iter()
            .find(|f| !KNOWN_FORMATS.contains(&f.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "defaults.formats: unknown format '{unknown}' (valid: {})",
                KNOWN_FORMATS.join(", ")
            )));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_in_place(&mut self.tool.command, "tool.command")?;
        expand::expand_optional(&mut self.defaults.encoding, "defaults.encoding")?;
        expand::expand_optional(&mut self.build.asset_root, "build.asset_root")?;
        expand::expand_optional(&mut self.build.cache_dir, "build.cache_dir")?;

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let asset_root = config_dir.join(self.build.asset_root.as_deref().unwrap_or("_build/html"));
        let cache_dir = match self.build.cache_dir.as_deref() {
            Some(dir) => config_dir.join(dir),
            None => asset_root.join(DEFAULT_CACHE_SUBDIR),
        };

        self.build_resolved = BuildConfig {
            asset_root,
            cache_dir,
            strict: self.build.strict.unwrap_or(false),
        };
    }
}
