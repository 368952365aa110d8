//! # fluxgraph: declarative dataflow engine
//!
//! Graphs of computational nodes, wired by directed edges and described in
//! YAML, TOML or JSON. Each graph runs on its own thread at its own fixed
//! rate; graphs exchange data across threads and processes through a
//! publish/subscribe broker.
//!
//! ## Architecture
//!
//! - **Graph**: parsing, validation and compilation of descriptions into a
//!   topological order plus routing table
//! - **Pipeline**: node trait, lifecycle, routing and the per-graph scheduler
//! - **Broker**: TCP pub/sub server and the clients used by publish/subscribe nodes
//! - **Nodes**: built-in reference nodes
//! - **Engine**: loads many graphs and runs one scheduler per valid graph
//!
//! ## Example
//!
//! ```ignore
//! use fluxgraph::{config::EngineConfig, engine::Engine};
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! let engine = Engine::new(EngineConfig::default());
//! let stop = AtomicBool::new(false);
//! let report = engine.run(&["graphs.yaml"], Some(Duration::from_secs(10)), &stop)?;
//! std::process::exit(report.exit_code());
//! ```

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod nodes;
pub mod pipeline;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{Engine, EngineReport};
pub use error::{EngineError, Result, ResultExt};
pub use graph::{GraphDefinition, GraphLoader};
pub use pipeline::{Frame, FrameBuilder, Node, NodeContext, NodeRegistry, Params, Scheduler};
