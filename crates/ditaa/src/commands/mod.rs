//! CLI command implementations.

pub(crate) mod cache;
pub(crate) mod render;

pub(crate) use cache::CacheCommand;
pub(crate) use render::RenderArgs;
