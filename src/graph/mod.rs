//! Graph descriptions, validation and plan compilation.
//!
//! # Architecture
//!
//! ```text
//! text ──parse──► GraphDefinition ──load──► LoadedGraph
//!                                   │         ├── Vec<NodeInstance>
//!                       NodeRegistry┘         └── CompiledPlan (order + routes)
//! ```
//!
//! Loading checks, in order: rate, node id uniqueness, edge node references,
//! implementation handles, edge ports, and finally acyclicity.

pub mod compiled_plan;
pub mod compiler;
pub mod definition;
pub mod error;
pub mod loader;

pub use compiled_plan::{CompiledPlan, PlanStats, Route, RoutingTable};
pub use compiler::PlanCompiler;
pub use definition::{EdgeSpec, Endpoint, GraphDefinition, GraphDocument, NodeSpec};
pub use error::DefinitionError;
pub use loader::{DescriptionFormat, GraphLoad, GraphLoader, LoadedGraph};
