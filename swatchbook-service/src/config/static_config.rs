//! Static configuration that cannot be changed at runtime.

use serde::Deserialize;
use std::path::PathBuf;

use super::extraction::ExtractionConfig;

/// Static configuration, read once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root for extraction runs. Every upload gets a fresh
    /// `extraction_<timestamp>` directory and a sibling zip archive here.
    /// Downloads are only served from below this directory.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Scratch directory for uploaded PDFs while they are processed.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            limits: default_limits(),
            extraction: ExtractionConfig::default(),
        }
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    5050
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        output_root: default_output_root(),
        upload_dir: default_upload_dir(),
    }
}

pub(crate) fn default_output_root() -> PathBuf {
    PathBuf::from("./data/swatches")
}

pub(crate) fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("swatchbook-uploads")
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

pub(crate) fn default_max_upload_bytes() -> u64 {
    200 * 1024 * 1024
}
