//! Internal constants for diagram rendering.

use std::time::Duration;

/// Default timeout for a single tool invocation (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a running tool is checked for exit, timeout, or abort.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default tab width (matches the tool's own default).
pub const DEFAULT_TAB_SIZE: u32 = 8;

/// Maximum length of alt text derived from diagram source, in characters.
pub const ALT_TEXT_LIMIT: usize = 80;

/// Version written to the artifact cache `VERSION` file.
///
/// Bumping the crate version invalidates every cached artifact.
pub const CACHE_VERSION: &str = concat!("ditaa-diagrams-", env!("CARGO_PKG_VERSION"));
