//! Load-time errors.
//!
//! Every variant is fatal for the graph it names: that graph never starts, while
//! other graphs from the same description still do.

use crate::pipeline::port::PortDirection;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing or validating a graph description.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to parse graph description: {0}")]
    Parse(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Graph `{graph}`: duplicate graph id")]
    DuplicateGraphId { graph: String },

    #[error("Graph `{graph}`: rate must be a positive number of Hz with a representable tick period, got {rate}")]
    InvalidRate { graph: String, rate: f64 },

    #[error("Graph `{graph}`: duplicate node id `{node}`")]
    DuplicateNodeId { graph: String, node: String },

    #[error("Graph `{graph}`: edge `{edge}` references unknown node `{node}`")]
    UnknownNodeReference {
        graph: String,
        edge: String,
        node: String,
    },

    #[error("Graph `{graph}`: node `{node}` uses unknown implementation handle `{handle}`")]
    UnknownHandle {
        graph: String,
        node: String,
        handle: String,
    },

    #[error("Graph `{graph}`: node `{node}` has no {direction} port `{port}` (edge `{edge}`)")]
    InvalidPortReference {
        graph: String,
        node: String,
        port: String,
        direction: PortDirection,
        edge: String,
    },

    #[error("Graph `{graph}`: edges form a cycle through {nodes:?}")]
    CyclicGraph { graph: String, nodes: Vec<String> },
}

impl DefinitionError {
    /// The graph this error belongs to, if it is specific to one graph.
    pub fn graph(&self) -> Option<&str> {
        match self {
            DefinitionError::Parse(_) | DefinitionError::Io { .. } => None,
            DefinitionError::DuplicateGraphId { graph }
            | DefinitionError::InvalidRate { graph, .. }
            | DefinitionError::DuplicateNodeId { graph, .. }
            | DefinitionError::UnknownNodeReference { graph, .. }
            | DefinitionError::UnknownHandle { graph, .. }
            | DefinitionError::InvalidPortReference { graph, .. }
            | DefinitionError::CyclicGraph { graph, .. } => Some(graph),
        }
    }

    /// The node this error points at, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            DefinitionError::DuplicateNodeId { node, .. }
            | DefinitionError::UnknownNodeReference { node, .. }
            | DefinitionError::UnknownHandle { node, .. }
            | DefinitionError::InvalidPortReference { node, .. } => Some(node),
            _ => None,
        }
    }
}
