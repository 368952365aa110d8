//! Graph description loading and validation.
//!
//! Parsing turns text into `GraphDefinition`s. Loading validates one definition
//! against a `NodeRegistry`, instantiates its nodes and compiles its plan. A
//! failure is scoped to the graph it occurs in.

use super::compiled_plan::{CompiledPlan, Route};
use super::compiler::PlanCompiler;
use super::definition::{GraphDefinition, GraphDocument};
use super::error::DefinitionError;
use crate::config::{EngineConfig, FileFormat, NodeConfig, DEFAULT_MAX_QUEUED_FRAMES};
use crate::pipeline::id::{EdgeId, NodeIndex};
use crate::pipeline::instance::NodeInstance;
use crate::pipeline::port::{exposes, PortDirection};
use crate::pipeline::registry::NodeRegistry;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Formats accepted for graph descriptions.
pub type DescriptionFormat = FileFormat;

/// A validated graph with live node instances, ready to be scheduled.
#[derive(Debug)]
pub struct LoadedGraph {
    pub definition: GraphDefinition,
    pub nodes: Vec<NodeInstance>,
    pub plan: CompiledPlan,
    /// Tick period, checked at load time.
    pub period: Duration,
}

impl LoadedGraph {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn rate(&self) -> f64 {
        self.definition.rate
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

/// Load result for one graph of a multi-graph description.
#[derive(Debug)]
pub struct GraphLoad {
    pub graph: String,
    pub result: Result<LoadedGraph, DefinitionError>,
}

/// Loads graph descriptions into runnable graphs.
#[derive(Debug, Clone)]
pub struct GraphLoader {
    node_config: NodeConfig,
    max_queued_frames: usize,
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new(NodeConfig::default(), DEFAULT_MAX_QUEUED_FRAMES)
    }
}

impl GraphLoader {
    pub fn new(node_config: NodeConfig, max_queued_frames: usize) -> Self {
        Self {
            node_config,
            max_queued_frames,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.nodes.clone(), config.scheduler.max_queued_frames)
    }

    /// Parse a description document.
    pub fn parse_str(
        text: &str,
        format: DescriptionFormat,
    ) -> Result<Vec<GraphDefinition>, DefinitionError> {
        format
            .parse::<GraphDocument>(text)
            .map(GraphDocument::into_graphs)
            .map_err(DefinitionError::Parse)
    }

    /// Read and parse a description file; the format comes from the extension.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<GraphDefinition>, DefinitionError> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path).ok_or_else(|| {
            DefinitionError::Parse(format!(
                "Unsupported graph description extension: {}",
                path.display()
            ))
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, format)
            .map_err(|e| DefinitionError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Validate one graph and instantiate its nodes.
    pub fn load(
        &self,
        definition: GraphDefinition,
        registry: &NodeRegistry,
    ) -> Result<LoadedGraph, DefinitionError> {
        let graph = definition.id.clone();

        let Some(period) = definition.period() else {
            return Err(DefinitionError::InvalidRate {
                graph,
                rate: definition.rate,
            });
        };

        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
        for (i, spec) in definition.nodes.iter().enumerate() {
            if index_of.insert(spec.id.as_str(), NodeIndex::from(i)).is_some() {
                return Err(DefinitionError::DuplicateNodeId {
                    graph,
                    node: spec.id.clone(),
                });
            }
        }

        // Resolve endpoints before touching the registry
        let mut routes = Vec::with_capacity(definition.edges.len());
        for (i, edge) in definition.edges.iter().enumerate() {
            let resolve = |node: &str| {
                index_of
                    .get(node)
                    .copied()
                    .ok_or_else(|| DefinitionError::UnknownNodeReference {
                        graph: graph.clone(),
                        edge: edge.to_string(),
                        node: node.to_string(),
                    })
            };
            let from = resolve(&edge.source.node)?;
            let to = resolve(&edge.target.node)?;
            routes.push(Route {
                edge: EdgeId(i as u32),
                from,
                output: edge.source_port().to_string(),
                to,
                input: edge.target_port().to_string(),
            });
        }

        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for spec in &definition.nodes {
            let node = registry
                .create(&spec.handle)
                .ok_or_else(|| DefinitionError::UnknownHandle {
                    graph: graph.clone(),
                    node: spec.id.clone(),
                    handle: spec.handle.clone(),
                })?;
            nodes.push(NodeInstance::new(
                spec.id.clone(),
                spec.handle.clone(),
                spec.params(),
                node,
                &self.node_config,
                self.max_queued_frames,
            ));
        }

        for (route, edge) in routes.iter().zip(&definition.edges) {
            let checks = [
                (route.from, &route.output, PortDirection::Output),
                (route.to, &route.input, PortDirection::Input),
            ];
            for (idx, port, direction) in checks {
                let instance = &nodes[idx.index()];
                if port.is_empty() || !exposes(instance.ports(), direction, port) {
                    return Err(DefinitionError::InvalidPortReference {
                        graph,
                        node: instance.id().to_string(),
                        port: port.clone(),
                        direction,
                        edge: edge.to_string(),
                    });
                }
            }
        }

        let node_ids: Vec<&str> = definition.nodes.iter().map(|n| n.id.as_str()).collect();
        let plan = PlanCompiler::compile(&graph, &node_ids, routes)?;

        tracing::debug!(
            graph = %graph,
            nodes = plan.stats.total_nodes,
            edges = plan.stats.total_edges,
            depth = plan.stats.depth,
            "Compiled graph"
        );
        if plan.stats.isolated_nodes > 0 && plan.stats.total_nodes > 1 {
            tracing::debug!(
                graph = %graph,
                isolated = plan.stats.isolated_nodes,
                "Graph has nodes without edges"
            );
        }

        Ok(LoadedGraph {
            definition,
            nodes,
            plan,
            period,
        })
    }

    /// Load every graph of a description. Each graph gets its own result so an
    /// invalid graph never blocks the others.
    pub fn load_all(
        &self,
        definitions: Vec<GraphDefinition>,
        registry: &NodeRegistry,
    ) -> Vec<GraphLoad> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for def in &definitions {
            *counts.entry(def.id.clone()).or_default() += 1;
        }

        let mut seen = HashSet::new();
        definitions
            .into_iter()
            .map(|def| {
                let graph = def.id.clone();
                let result = if counts.get(&graph).copied().unwrap_or(0) > 1 {
                    Err(DefinitionError::DuplicateGraphId {
                        graph: graph.clone(),
                    })
                } else {
                    self.load(def, registry)
                };
                if let Err(e) = &result {
                    if seen.insert(e.to_string()) {
                        tracing::error!(graph = %graph, error = %e, "Graph failed validation");
                    }
                }
                GraphLoad { graph, result }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node::{Node, NodeContext, NodeResult};
    use crate::pipeline::params::Params;
    use crate::pipeline::port::PortDescriptor;

    struct Source;
    struct Sink;
    struct Merge;

    static SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];
    static SINK_PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];
    static MERGE_PORTS: &[PortDescriptor] = &[
        PortDescriptor::dynamic_input("in_"),
        PortDescriptor::output("out"),
    ];

    impl Node for Source {
        fn ports(&self) -> &[PortDescriptor] {
            SOURCE_PORTS
        }
        fn tick(&mut self, _ctx: &mut NodeContext) -> NodeResult<()> {
            Ok(())
        }
    }

    impl Node for Sink {
        fn ports(&self) -> &[PortDescriptor] {
            SINK_PORTS
        }
    }

    impl Node for Merge {
        fn ports(&self) -> &[PortDescriptor] {
            MERGE_PORTS
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register("source", || Box::new(Source))
            .register("sink", || Box::new(Sink))
            .register("merge", || Box::new(Merge));
        registry
    }

    fn chain() -> GraphDefinition {
        GraphDefinition::new("g", 10.0)
            .node("a", "source", Params::default())
            .node("b", "sink", Params::default())
            .edge("a", "b")
    }

    #[test]
    fn test_load_chain() {
        let loaded = GraphLoader::default().load(chain(), &registry()).unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.plan.order, vec![NodeIndex(0), NodeIndex(1)]);
        let route = &loaded.plan.routes.routes()[0];
        assert_eq!((route.output.as_str(), route.input.as_str()), ("out", "in"));
        assert_eq!(loaded.period(), Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_rate() {
        // 1e-20 Hz overflows a Duration; 1e300 Hz rounds to a zero period
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-20, 1e300] {
            let mut def = chain();
            def.rate = rate;
            let err = GraphLoader::default().load(def, &registry()).unwrap_err();
            assert!(matches!(err, DefinitionError::InvalidRate { .. }));
        }
    }

    #[test]
    fn test_extreme_but_valid_rates() {
        let mut def = chain();
        def.rate = 1e-6;
        let slow = GraphLoader::default().load(def, &registry()).unwrap();
        assert!((slow.period().as_secs_f64() - 1e6).abs() < 1.0);

        let mut def = chain();
        def.rate = 1e6;
        let fast = GraphLoader::default().load(def, &registry()).unwrap();
        assert!((999..=1_000).contains(&fast.period().as_nanos()));
    }

    #[test]
    fn test_duplicate_node() {
        let def = chain().node("a", "sink", Params::default());
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateNodeId { ref node, .. } if node == "a"));
    }

    #[test]
    fn test_unknown_node_reference() {
        let def = chain().edge("a", "ghost");
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownNodeReference { ref node, .. } if node == "ghost"));
    }

    #[test]
    fn test_unknown_handle() {
        let def = chain().node("c", "octa", Params::default());
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownHandle { ref handle, .. } if handle == "octa"));
    }

    #[test]
    fn test_invalid_ports() {
        // Sink has no output
        let def = chain().edge("b", "a");
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        match err {
            DefinitionError::InvalidPortReference { node, direction, .. } => {
                assert_eq!(node, "b");
                assert_eq!(direction, PortDirection::Output);
            }
            other => panic!("unexpected {other}"),
        }

        let def = chain().edge("a", "b:aux");
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidPortReference { ref port, .. } if port == "aux"));
    }

    #[test]
    fn test_dynamic_ports() {
        let def = GraphDefinition::new("g", 1.0)
            .node("a", "source", Params::default())
            .node("b", "source", Params::default())
            .node("m", "merge", Params::default())
            .edge("a", "m:in_left")
            .edge("b", "m:in_right");
        let loaded = GraphLoader::default().load(def, &registry()).unwrap();
        assert_eq!(loaded.plan.routes.len(), 2);

        let def = GraphDefinition::new("g", 1.0)
            .node("a", "source", Params::default())
            .node("m", "merge", Params::default())
            .edge("a", "m");
        assert!(GraphLoader::default().load(def, &registry()).is_err());
    }

    #[test]
    fn test_cycle_through_loader() {
        let def = GraphDefinition::new("g", 1.0)
            .node("m1", "merge", Params::default())
            .node("m2", "merge", Params::default())
            .edge("m1", "m2:in_a")
            .edge("m2", "m1:in_b");
        let err = GraphLoader::default().load(def, &registry()).unwrap_err();
        assert!(matches!(err, DefinitionError::CyclicGraph { .. }));
    }

    #[test]
    fn test_load_all_isolates_failures() {
        let bad = GraphDefinition::new("bad", 1.0).node("x", "nope", Params::default());
        let mut dup = chain();
        dup.id = "twice".into();
        let results = GraphLoader::default().load_all(
            vec![chain(), bad, dup.clone(), dup],
            &registry(),
        );
        assert_eq!(results.len(), 4);
        assert!(results[0].result.is_ok());
        assert!(matches!(results[1].result, Err(DefinitionError::UnknownHandle { .. })));
        assert!(matches!(results[2].result, Err(DefinitionError::DuplicateGraphId { .. })));
        assert!(matches!(results[3].result, Err(DefinitionError::DuplicateGraphId { .. })));
    }

    #[test]
    fn test_parse_formats() {
        let toml = r#"
[[graphs]]
id = "g"
rate = 5

[[graphs.nodes]]
id = "a"
handle = "source"

[[graphs.nodes]]
id = "b"
handle = "sink"

[[graphs.edges]]
source = "a:out"
target = "b:in"
"#;
        let defs = GraphLoader::parse_str(toml, DescriptionFormat::Toml).unwrap();
        assert_eq!(defs[0].rate, 5.0);
        assert_eq!(defs[0].edges.len(), 1);

        let err = GraphLoader::parse_str("graphs: [", DescriptionFormat::Yaml).unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }
}
