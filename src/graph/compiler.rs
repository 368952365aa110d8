use super::compiled_plan::{CompiledPlan, PlanStats, Route, RoutingTable};
use super::error::DefinitionError;
use crate::pipeline::id::NodeIndex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Compiles a graph's resolved edges into an execution plan
pub struct PlanCompiler;

impl PlanCompiler {
    /// Compile a graph into an execution plan.
    ///
    /// Ordering uses Kahn's algorithm with a min-heap on node index, so among the
    /// nodes that are ready at any point the one declared first runs first. The
    /// same description therefore always compiles to the same plan.
    ///
    /// # Arguments
    /// * `graph` - Graph id, for error reporting
    /// * `node_ids` - Node ids in declaration order
    /// * `routes` - Resolved edges in declaration order
    ///
    /// # Returns
    /// A `CompiledPlan`, or `CyclicGraph` naming the nodes that could not be ordered
    pub fn compile(
        graph: &str,
        node_ids: &[&str],
        routes: Vec<Route>,
    ) -> Result<CompiledPlan, DefinitionError> {
        let n = node_ids.len();
        let (fwd_adj, in_degree) = Self::build_adjacency(n, &routes);

        let order = Self::topological_sort(&fwd_adj, in_degree.clone());
        if order.len() < n {
            let mut scheduled = vec![false; n];
            for idx in &order {
                scheduled[idx.index()] = true;
            }
            let nodes = (0..n)
                .filter(|&i| !scheduled[i])
                .map(|i| node_ids[i].to_string())
                .collect();
            return Err(DefinitionError::CyclicGraph {
                graph: graph.to_string(),
                nodes,
            });
        }

        let stats = PlanStats {
            total_nodes: n,
            total_edges: routes.len(),
            source_nodes: in_degree.iter().filter(|&&d| d == 0).count(),
            sink_nodes: fwd_adj.iter().filter(|adj| adj.is_empty()).count(),
            isolated_nodes: (0..n)
                .filter(|&i| in_degree[i] == 0 && fwd_adj[i].is_empty())
                .count(),
            depth: Self::longest_path(&order, &fwd_adj),
        };

        Ok(CompiledPlan {
            order,
            routes: RoutingTable::new(routes, n),
            stats,
        })
    }

    /// Build forward adjacency and in-degrees. Parallel edges count once.
    fn build_adjacency(n: usize, routes: &[Route]) -> (Vec<Vec<usize>>, Vec<usize>) {
        let mut fwd_adj = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];

        for route in routes {
            let from = route.from.index();
            let to = route.to.index();
            if from >= n || to >= n || fwd_adj[from].contains(&to) {
                continue;
            }
            fwd_adj[from].push(to);
            in_degree[to] += 1;
        }

        (fwd_adj, in_degree)
    }

    /// Kahn's algorithm, tie-broken by declaration order.
    fn topological_sort(fwd_adj: &[Vec<usize>], mut in_degree: Vec<usize>) -> Vec<NodeIndex> {
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut result = Vec::with_capacity(fwd_adj.len());

        while let Some(Reverse(node)) = ready.pop() {
            result.push(NodeIndex::from(node));
            for &neighbor in &fwd_adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        result
    }

    fn longest_path(order: &[NodeIndex], fwd_adj: &[Vec<usize>]) -> usize {
        let mut depth = vec![1usize; fwd_adj.len()];
        for idx in order {
            let i = idx.index();
            for &next in &fwd_adj[i] {
                depth[next] = depth[next].max(depth[i] + 1);
            }
        }
        depth.into_iter().max().unwrap_or(0)
    }
}
