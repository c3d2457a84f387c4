//! Service configuration.
//!
//! Everything is loaded once at startup from an optional `config.{toml,yaml,json}`
//! file layered under `SWATCHBOOK__`-prefixed environment variables. The
//! extraction thresholds live in [`ExtractionConfig`] and are handed to the
//! engine when it is constructed.

mod extraction;
mod loader;
mod static_config;

pub use extraction::{AutoFixConfig, ExtractionConfig, ImageOutputFormat, MatcherConfig};
pub use loader::load_static_config;
pub use static_config::StaticConfig;
