//! Configuration sections for the engine.
//!
//! Every field has a default so a partial file (or no file at all) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{
    DEFAULT_BROKER_ADDRESS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_LOG_INTERVAL_MS,
    DEFAULT_MAX_QUEUED_FRAMES, DEFAULT_READ_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};

// ==================== Broker ====================

/// Broker endpoint and client connection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address of the broker (`host:port`), used by publish/subscribe nodes and
    /// as the bind address of `fluxgraph broker`.
    pub address: String,

    /// Timeout for establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Socket read timeout for subscriber listeners, in milliseconds. Bounds how
    /// long a listener takes to notice a stop request.
    pub read_timeout_ms: u64,

    /// Maximum frames buffered per subscriber between ticks (oldest dropped).
    pub max_queued_frames: usize,

    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BROKER_ADDRESS.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

/// Exponential backoff settings for broker reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// 0 = retry forever.
    pub max_retries: usize,
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            max_retries: 0,
            jitter: true,
        }
    }
}

// ==================== Scheduler ====================

/// Per-graph scheduler behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum frames held per input port between ticks (oldest dropped).
    pub max_queued_frames: usize,

    /// Minimum interval between repeated warnings of the same kind, in milliseconds.
    pub log_interval_ms: u64,

    /// How long `stop` waits for a graceful shutdown before giving up, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
            log_interval_ms: DEFAULT_LOG_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// ==================== Nodes ====================

/// What a node emits on a tick where its `tick` hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Emit nothing.
    #[default]
    Silence,
    /// Re-emit the outputs of the last successful tick.
    RepeatLast,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::Silence => write!(f, "silence"),
            ErrorPolicy::RepeatLast => write!(f, "repeat_last"),
        }
    }
}

/// Node error isolation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub error_policy: ErrorPolicy,

    /// Consecutive tick failures after which a node is disabled (0 = never).
    pub max_consecutive_errors: u32,
}

// ==================== Logging ====================

/// Logging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,

    /// Optional log file; rotated daily.
    pub file: Option<PathBuf>,

    /// Colored terminal output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
            ansi: true,
        }
    }
}
