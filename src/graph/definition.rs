//! Graph description types.
//!
//! These mirror the on-disk graph description one to one. They are produced by
//! the loader and never mutated afterwards.

use crate::pipeline::params::{ParamValue, Params};
use crate::pipeline::port::{DEFAULT_INPUT, DEFAULT_OUTPUT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Rate used when a description omits it.
pub const DEFAULT_RATE_HZ: f64 = 1.0;

fn default_rate() -> f64 {
    DEFAULT_RATE_HZ
}

/// A description file: a sequence of graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphDocument {
    /// `graphs: [...]`
    Wrapped { graphs: Vec<GraphDefinition> },
    /// A bare list of graphs.
    List(Vec<GraphDefinition>),
}

impl GraphDocument {
    pub fn into_graphs(self) -> Vec<GraphDefinition> {
        match self {
            GraphDocument::Wrapped { graphs } => graphs,
            GraphDocument::List(graphs) => graphs,
        }
    }
}

/// One graph: nodes, edges, and the rate it is clocked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Ticks per second, `DEFAULT_RATE_HZ` when omitted.
    #[serde(default = "default_rate")]
    pub rate: f64,
}

impl GraphDefinition {
    pub fn new(id: impl Into<String>, rate: f64) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            rate,
        }
    }

    /// Add a node (builder style).
    pub fn node(mut self, id: impl Into<String>, handle: impl Into<String>, params: Params) -> Self {
        self.nodes.push(NodeSpec {
            id: id.into(),
            handle: handle.into(),
            params: params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        });
        self
    }

    /// Add an edge (builder style), endpoints written as `node` or `node:port`.
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(EdgeSpec {
            source: Endpoint::from(source),
            target: Endpoint::from(target),
        });
        self
    }

    /// Tick period, `1 / rate`. `None` unless the rate is positive and its
    /// period is a non-zero `Duration`.
    pub fn period(&self) -> Option<Duration> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.rate)
            .ok()
            .filter(|period| !period.is_zero())
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A node in a graph description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    /// Key into the node registry.
    #[serde(alias = "implementation")]
    pub handle: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl NodeSpec {
    pub fn params(&self) -> Params {
        Params::new(self.params.clone())
    }
}

/// A directed intra-graph connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: Endpoint,
    pub target: Endpoint,
}

impl EdgeSpec {
    /// Output port on the source node.
    pub fn source_port(&self) -> &str {
        self.source.port.as_deref().unwrap_or(DEFAULT_OUTPUT)
    }

    /// Input port on the target node.
    pub fn target_port(&self) -> &str {
        self.target.port.as_deref().unwrap_or(DEFAULT_INPUT)
    }
}

impl fmt::Display for EdgeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source.node,
            self.source_port(),
            self.target.node,
            self.target_port()
        )
    }
}

/// `node` or `node:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub node: String,
    pub port: Option<String>,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, port: Option<&str>) -> Self {
        Self {
            node: node.into(),
            port: port.map(str::to_string),
        }
    }
}

impl From<&str> for Endpoint {
    /// Split at the first `:`; never fails, validation catches empty parts.
    fn from(s: &str) -> Self {
        match s.split_once(':') {
            Some((node, port)) => Endpoint::new(node, Some(port)),
            None => Endpoint::new(s, None),
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let endpoint = Endpoint::from(s.trim());
        if endpoint.node.is_empty() {
            return Err(format!("endpoint `{}` has no node id", s));
        }
        if endpoint.port.as_deref() == Some("") {
            return Err(format!("endpoint `{}` has an empty port name", s));
        }
        Ok(endpoint)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(f, "{}:{}", self.node, port),
            None => write!(f, "{}", self.node),
        }
    }
}
