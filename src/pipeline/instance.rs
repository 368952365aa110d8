//! Runtime binding of a node specification to a live node.
//!
//! A `NodeInstance` owns the boxed node, its input queues and last outputs, and
//! tracks the lifecycle state machine:
//!
//! ```text
//! Created ──configure──► Ready ──start──► Running ──stop──► Terminated
//!                                           │  ▲
//!                                  tick err ▼  │ tick ok
//!                                         Errored ──threshold──► Disabled
//! ```
//!
//! A failing `configure` or `start` leaves the node `Errored` for good. Tick
//! failures are isolated: the node emits nothing (or repeats its last outputs)
//! and the rest of the graph keeps running.

use crate::config::{ErrorPolicy, NodeConfig};
use crate::pipeline::frame::FrameRef;
use crate::pipeline::node::{Hook, Node, NodeContext, NodeError, PortFrames};
use crate::pipeline::params::Params;
use crate::pipeline::port::PortDescriptor;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use thiserror::Error;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Ready,
    Running,
    Errored,
    Disabled,
    Terminated,
}

/// A node hook failure, tagged with the node and hook.
#[derive(Error, Debug)]
#[error("node `{node}` failed in {hook}: {source}")]
pub struct NodeRuntimeError {
    pub node: String,
    pub hook: Hook,
    #[source]
    pub source: NodeError,
}

impl NodeRuntimeError {
    pub fn is_fatal(&self) -> bool {
        self.source.is_fatal()
    }
}

/// Clock information for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    pub tick: u64,
    pub elapsed: Duration,
    pub dt: Duration,
    pub now: DateTime<Utc>,
}

/// Result of ticking one node.
#[derive(Debug)]
pub enum TickOutcome {
    /// The node ran and its outputs are ready for routing.
    Ran,
    /// The node is not running (errored at startup, disabled, stopped).
    Skipped,
    /// The tick hook failed; the node stays scheduled.
    Failed(NodeRuntimeError),
    /// The tick hook failed and the node hit its error threshold.
    Disabled(NodeRuntimeError),
    /// The tick hook raised a fatal error.
    Fatal(NodeRuntimeError),
}

/// A node plus its runtime state.
pub struct NodeInstance {
    id: String,
    handle: String,
    params: Params,
    node: Box<dyn Node>,
    state: NodeState,
    started: bool,
    inputs: BTreeMap<String, VecDeque<FrameRef>>,
    outputs: PortFrames,
    last_outputs: PortFrames,
    max_queued_frames: usize,
    error_policy: ErrorPolicy,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
    total_errors: u64,
    dropped_frames: u64,
}

impl NodeInstance {
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        params: Params,
        node: Box<dyn Node>,
        config: &NodeConfig,
        max_queued_frames: usize,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            params,
            node,
            state: NodeState::Created,
            started: false,
            inputs: BTreeMap::new(),
            outputs: PortFrames::new(),
            last_outputs: PortFrames::new(),
            max_queued_frames: max_queued_frames.max(1),
            error_policy: config.error_policy,
            max_consecutive_errors: config.max_consecutive_errors,
            consecutive_errors: 0,
            total_errors: 0,
            dropped_frames: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        self.node.ports()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Whether the node is scheduled on ticks.
    pub fn is_runnable(&self) -> bool {
        self.started && matches!(self.state, NodeState::Running | NodeState::Errored)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    /// Frames dropped from this node's input queues because they were full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    fn fail(&self, hook: Hook, source: NodeError) -> NodeRuntimeError {
        NodeRuntimeError {
            node: self.id.clone(),
            hook,
            source,
        }
    }

    // ── Lifecycle ──

    pub fn configure(&mut self) -> Result<(), NodeRuntimeError> {
        if self.state != NodeState::Created {
            return Ok(());
        }
        match self.node.configure(&self.params) {
            Ok(()) => {
                self.state = NodeState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = NodeState::Errored;
                Err(self.fail(Hook::Configure, e))
            }
        }
    }

    pub fn start(&mut self) -> Result<(), NodeRuntimeError> {
        if self.state != NodeState::Ready {
            return Ok(());
        }
        match self.node.start() {
            Ok(()) => {
                self.state = NodeState::Running;
                self.started = true;
                Ok(())
            }
            Err(e) => {
                self.state = NodeState::Errored;
                Err(self.fail(Hook::Start, e))
            }
        }
    }

    /// Run the stop hook once, for nodes that were started.
    pub fn stop(&mut self) -> Result<(), NodeRuntimeError> {
        if !self.started || self.state == NodeState::Terminated {
            return Ok(());
        }
        self.state = NodeState::Terminated;
        self.node.stop().map_err(|e| self.fail(Hook::Stop, e))
    }

    // ── Data path ──

    /// Queue a frame on an input port. Returns `false` if the queue was full and
    /// its oldest frame was dropped to make room.
    pub fn enqueue(&mut self, port: &str, frame: FrameRef) -> bool {
        let queue = self.inputs.entry(port.to_string()).or_default();
        let mut kept = true;
        if queue.len() >= self.max_queued_frames {
            queue.pop_front();
            self.dropped_frames += 1;
            kept = false;
        }
        queue.push_back(frame);
        kept
    }

    pub fn has_pending_input(&self) -> bool {
        self.inputs.values().any(|q| !q.is_empty())
    }

    pub fn queued_frames(&self, port: &str) -> usize {
        self.inputs.get(port).map(VecDeque::len).unwrap_or(0)
    }

    /// Discard all queued input (forced shutdown).
    pub fn clear_inputs(&mut self) {
        self.inputs.values_mut().for_each(VecDeque::clear);
    }

    fn drain_inputs(&mut self) -> PortFrames {
        self.inputs
            .iter_mut()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(port, queue)| (port.clone(), queue.drain(..).collect()))
            .collect()
    }

    /// Run one tick: drain the input queues into the node and collect its outputs.
    pub fn tick(&mut self, graph: &str, clock: TickClock) -> TickOutcome {
        self.outputs.clear();
        if !self.is_runnable() {
            self.clear_inputs();
            return TickOutcome::Skipped;
        }

        let inputs = self.drain_inputs();
        let mut outputs = PortFrames::new();
        let result = {
            let mut ctx = NodeContext::new(
                &inputs,
                &mut outputs,
                graph,
                &self.id,
                clock.tick,
                clock.elapsed,
                clock.dt,
                clock.now,
            );
            self.node.tick(&mut ctx)
        };

        match result {
            Ok(()) => {
                self.state = NodeState::Running;
                self.consecutive_errors = 0;
                self.last_outputs.clone_from(&outputs);
                self.outputs = outputs;
                TickOutcome::Ran
            }
            Err(e) => {
                self.consecutive_errors += 1;
                self.total_errors += 1;
                if self.error_policy == ErrorPolicy::RepeatLast {
                    self.outputs.clone_from(&self.last_outputs);
                }

                let fatal = e.is_fatal();
                let err = self.fail(Hook::Tick, e);
                if fatal {
                    self.state = NodeState::Errored;
                    TickOutcome::Fatal(err)
                } else if self.max_consecutive_errors > 0
                    && self.consecutive_errors >= self.max_consecutive_errors
                {
                    self.state = NodeState::Disabled;
                    self.clear_inputs();
                    TickOutcome::Disabled(err)
                } else {
                    self.state = NodeState::Errored;
                    TickOutcome::Failed(err)
                }
            }
        }
    }

    /// Outputs of the most recent tick.
    pub fn outputs(&self) -> &PortFrames {
        &self.outputs
    }

    /// Move the most recent outputs out for routing.
    pub fn take_outputs(&mut self) -> PortFrames {
        std::mem::take(&mut self.outputs)
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("consecutive_errors", &self.consecutive_errors)
            .finish()
    }
}
