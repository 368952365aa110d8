//! Node runtime and per-graph execution.
//!
//! Frames flow between nodes along intra-graph edges. Every graph runs on its
//! own scheduler thread at its own rate; nodes within a graph run strictly
//! sequentially in topological order.
//!
//! # Architecture
//!
//! ```text
//! [signal] ──► [filter] ──► [publish] ─ ─ broker ─ ─► [subscribe] ──► [recorder]
//!  \____________ graph A @ 10 Hz ______/               \___ graph B @ 1 Hz ___/
//! ```
//!
//! # Design
//!
//! - **Trait-object dispatch**: every node is a `Box<dyn Node>` built by a
//!   registered factory; capability hooks default to no-ops.
//! - **Shared immutable frames**: `FrameRef = Arc<Frame>`; fan-out clones the
//!   pointer, never the data.
//! - **One tick of latency per edge**: outputs are routed after the whole graph
//!   has ticked.
//! - **Dedicated thread**: the scheduler is driven through `SchedulerHandle`
//!   over a crossbeam channel.

pub mod bridge;
pub mod frame;
pub mod id;
pub mod instance;
pub mod node;
pub mod params;
pub mod port;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod throttle;

pub use bridge::{SchedulerCommand, SchedulerHandle, ShutdownMode};
pub use frame::{Frame, FrameBuilder, FrameError, FrameRef, Metadata};
pub use id::{EdgeId, NodeIndex};
pub use instance::{NodeInstance, NodeRuntimeError, NodeState, TickClock, TickOutcome};
pub use node::{Hook, Node, NodeContext, NodeError, NodeResult, PortFrames};
pub use params::{ParamValue, Params};
pub use port::{PortDescriptor, PortDirection, PortKind, DEFAULT_INPUT, DEFAULT_OUTPUT};
pub use registry::{NodeFactory, NodeRegistry};
pub use router::{Delivery, Router};
pub use scheduler::{GraphOutcome, Scheduler, SchedulerReport, SchedulerStats, TickReport};
pub use throttle::LogThrottle;
