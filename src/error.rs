//! Error handling for fluxgraph
//!
//! This module defines the engine-level error type and a Result alias for use
//! throughout the crate. Component errors (`DefinitionError`, `NodeError`,
//! `TransportError`, `FrameError`) live next to their components and convert
//! into `EngineError` where they cross into process-level handling.

use crate::broker::TransportError;
use crate::graph::DefinitionError;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A graph description could not be parsed or validated
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Errors related to configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// A scheduler thread could not be created
    #[error("Failed to spawn scheduler for graph `{graph}`: {source}")]
    Spawn {
        graph: String,
        #[source]
        source: std::io::Error,
    },

    /// Broker transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Configuration and usage errors map to exit code 2, everything else to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Config(_) => 2,
            EngineError::WithContext { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
