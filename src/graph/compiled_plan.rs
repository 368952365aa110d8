use crate::pipeline::id::{EdgeId, NodeIndex};

/// One resolved edge: frames emitted on `from:output` are queued on `to:input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub edge: EdgeId,
    pub from: NodeIndex,
    pub output: String,
    pub to: NodeIndex,
    pub input: String,
}

/// Routes of a graph in declaration order, indexed by source node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
    by_source: Vec<Vec<usize>>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>, node_count: usize) -> Self {
        let mut by_source = vec![Vec::new(); node_count];
        for (i, route) in routes.iter().enumerate() {
            if let Some(slot) = by_source.get_mut(route.from.index()) {
                slot.push(i);
            }
        }
        Self { routes, by_source }
    }

    /// All routes in declaration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Routes leaving `node`, in declaration order.
    pub fn routes_from(&self, node: NodeIndex) -> impl Iterator<Item = &Route> + '_ {
        self.by_source
            .get(node.index())
            .into_iter()
            .flatten()
            .map(move |&i| &self.routes[i])
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Compiled execution plan for one graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPlan {
    /// Node indices in topological order
    pub order: Vec<NodeIndex>,

    /// Edge routing
    pub routes: RoutingTable,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanStats {
    /// Total number of nodes in the graph
    pub total_nodes: usize,

    /// Number of edges
    pub total_edges: usize,

    /// Nodes without incoming edges
    pub source_nodes: usize,

    /// Nodes without outgoing edges
    pub sink_nodes: usize,

    /// Nodes with no edge at all
    pub isolated_nodes: usize,

    /// Length of the longest path, in nodes
    pub depth: usize,
}

impl CompiledPlan {
    /// Check if the plan has any nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Topological order reversed, used for stop hooks.
    pub fn reverse_order(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.order.iter().rev().copied()
    }
}
