//! Node abstraction for the runtime.
//!
//! Every node implementation is a `Node` trait object. The lifecycle hooks
//! (`configure`, `start`, `tick`, `stop`) all have no-op defaults, so a node
//! implements only the capabilities it uses and the scheduler dispatches all of
//! them uniformly.

use crate::pipeline::frame::{Frame, FrameError, FrameRef};
use crate::pipeline::params::Params;
use crate::pipeline::port::PortDescriptor;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Frames grouped by port name.
pub type PortFrames = BTreeMap<String, Vec<FrameRef>>;

/// Errors raised by node hooks.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Invalid or missing parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// A recoverable failure; the node is skipped for this tick.
    #[error("{0}")]
    Runtime(String),

    /// An unrecoverable failure that shuts down the whole graph.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl NodeError {
    pub fn runtime(message: impl Into<String>) -> Self {
        NodeError::Runtime(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        NodeError::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Fatal(_))
    }
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// Lifecycle hook names, used in logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Configure,
    Start,
    Tick,
    Stop,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::Configure => "configure",
            Hook::Start => "start",
            Hook::Tick => "tick",
            Hook::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Context passed to `Node::tick`.
pub struct NodeContext<'a> {
    inputs: &'a PortFrames,
    outputs: &'a mut PortFrames,
    /// Id of the graph being ticked.
    pub graph: &'a str,
    /// Id of this node within the graph.
    pub node: &'a str,
    /// Monotonic tick counter.
    pub tick: u64,
    /// Time since the scheduler started.
    pub elapsed: Duration,
    /// Time since the previous tick.
    pub dt: Duration,
    /// Wall-clock time at the start of this tick.
    pub now: DateTime<Utc>,
}

static NO_FRAMES: &[FrameRef] = &[];

impl<'a> NodeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inputs: &'a PortFrames,
        outputs: &'a mut PortFrames,
        graph: &'a str,
        node: &'a str,
        tick: u64,
        elapsed: Duration,
        dt: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            graph,
            node,
            tick,
            elapsed,
            dt,
            now,
        }
    }

    /// Frames queued on `port` since the previous tick, in arrival order.
    pub fn input(&self, port: &str) -> &[FrameRef] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or(NO_FRAMES)
    }

    /// All frames queued on `port`, concatenated into one frame.
    pub fn input_concat(&self, port: &str) -> NodeResult<Option<Frame>> {
        Ok(Frame::concat(self.input(port))?)
    }

    /// Every input port that received frames this tick.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &[FrameRef])> {
        self.inputs
            .iter()
            .filter(|(_, frames)| !frames.is_empty())
            .map(|(port, frames)| (port.as_str(), frames.as_slice()))
    }

    /// Whether any input port received frames this tick.
    pub fn has_input(&self) -> bool {
        self.inputs.values().any(|frames| !frames.is_empty())
    }

    /// Emit a frame on an output port.
    pub fn emit(&mut self, port: &str, frame: impl Into<FrameRef>) {
        self.outputs
            .entry(port.to_string())
            .or_default()
            .push(frame.into());
    }
}

/// Trait implemented by every node.
pub trait Node: Send {
    /// Port descriptors for this node.
    fn ports(&self) -> &[PortDescriptor];

    /// Validate and apply parameters. Called once before `start`.
    fn configure(&mut self, _params: &Params) -> NodeResult<()> {
        Ok(())
    }

    /// Called when the graph starts running.
    fn start(&mut self) -> NodeResult<()> {
        Ok(())
    }

    /// Called every tick to consume inputs and emit outputs.
    fn tick(&mut self, _ctx: &mut NodeContext) -> NodeResult<()> {
        Ok(())
    }

    /// Called once when the graph shuts down, in reverse topological order.
    fn stop(&mut self) -> NodeResult<()> {
        Ok(())
    }
}
