//! Configuration module for fluxgraph
//!
//! Engine settings are kept apart from graph descriptions: a graph file says
//! *what* runs, the engine configuration says *how* (broker endpoint, queue
//! bounds, error isolation, logging).
//!
//! # Formats
//!
//! Configuration files may be TOML (`.toml`), YAML (`.yaml`/`.yml`) or JSON
//! (`.json`); the format is picked from the file extension.
//!
//! # Example
//!
//! ```toml
//! [broker]
//! address = "127.0.0.1:5560"
//!
//! [scheduler]
//! max_queued_frames = 512
//!
//! [nodes]
//! error_policy = "repeat_last"
//! max_consecutive_errors = 10
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{EngineError, Result, ResultExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default broker address.
pub const DEFAULT_BROKER_ADDRESS: &str = "127.0.0.1:5560";

/// Default connection timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

/// Default subscriber read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default bound on queued frames (per input port, per subscriber).
pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 1024;

/// Default window for rate-limited warnings in milliseconds.
pub const DEFAULT_LOG_INTERVAL_MS: u64 = 1_000;

/// Default graceful shutdown timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

// ==================== File Formats ====================

/// Serialization format of a configuration or graph description file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(FileFormat::Yaml),
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }

    /// Deserialize `text` in this format.
    pub fn parse<T: DeserializeOwned>(self, text: &str) -> std::result::Result<T, String> {
        match self {
            FileFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            FileFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            FileFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Yaml => write!(f, "YAML"),
            FileFormat::Toml => write!(f, "TOML"),
            FileFormat::Json => write!(f, "JSON"),
        }
    }
}

// ==================== Engine Config ====================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub broker: BrokerConfig,
    pub scheduler: SchedulerConfig,
    pub nodes: NodeConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load a configuration file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path).ok_or_else(|| {
            EngineError::Config(format!(
                "Unsupported configuration file extension: {}",
                path.display()
            ))
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str_as(&content, format)
            .with_context(|| format!("Loading configuration {}", path.display()))
    }

    /// Parse configuration text in the given format.
    pub fn from_str_as(text: &str, format: FileFormat) -> Result<Self> {
        format
            .parse(text)
            .map_err(|e| EngineError::Config(format!("Invalid {} configuration: {}", format, e)))
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
