//! Intra-graph frame delivery.
//!
//! After every node of a graph has ticked, the router moves each node's outputs
//! into the input queues of the nodes its edges point at. Frames are shared by
//! `Arc`: an output feeding several edges hands every target the same frame.
//! Outputs without an outgoing edge are dropped here.

use crate::graph::RoutingTable;
use crate::pipeline::id::NodeIndex;
use crate::pipeline::instance::NodeInstance;
use crate::pipeline::node::PortFrames;

/// What one delivery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Frames queued on a target input.
    pub routed: u64,
    /// Frames that pushed an older frame out of a full queue.
    pub dropped: u64,
    /// Target ports that overflowed, one entry per drop.
    pub overflowed: Vec<(NodeIndex, String)>,
}

pub struct Router;

impl Router {
    /// Deliver the outputs of the tick that just finished.
    ///
    /// Routes are walked in declaration order, and frames of one port keep
    /// their emission order, so each edge is FIFO.
    pub fn deliver(routes: &RoutingTable, nodes: &mut [NodeInstance]) -> Delivery {
        let outputs: Vec<PortFrames> = nodes.iter_mut().map(NodeInstance::take_outputs).collect();
        let mut delivery = Delivery::default();

        for route in routes.routes() {
            let Some(frames) = outputs
                .get(route.from.index())
                .and_then(|ports| ports.get(&route.output))
            else {
                continue;
            };
            let Some(target) = nodes.get_mut(route.to.index()) else {
                continue;
            };
            for frame in frames {
                delivery.routed += 1;
                if !target.enqueue(&route.input, frame.clone()) {
                    delivery.dropped += 1;
                    delivery.overflowed.push((route.to, route.input.clone()));
                }
            }
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::graph::Route;
    use crate::pipeline::frame::{Frame, FrameRef};
    use crate::pipeline::id::EdgeId;
    use crate::pipeline::instance::TickClock;
    use crate::pipeline::node::{Node, NodeContext, NodeResult};
    use crate::pipeline::params::Params;
    use crate::pipeline::port::PortDescriptor;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    static PORTS: &[PortDescriptor] = &[
        PortDescriptor::input("in"),
        PortDescriptor::output("out"),
        PortDescriptor::output("aux"),
    ];

    /// Emits `count` frames on `out` and one on `aux`.
    struct Burst {
        count: usize,
    }

    impl Node for Burst {
        fn ports(&self) -> &[PortDescriptor] {
            PORTS
        }

        fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
            for i in 0..self.count {
                let frame = Frame::empty(vec![format!("c{i}")]);
                ctx.emit("out", frame);
            }
            ctx.emit("aux", Frame::empty(vec!["aux".into()]));
            Ok(())
        }
    }

    fn instance(id: &str, count: usize, max_queued: usize) -> NodeInstance {
        let mut inst = NodeInstance::new(
            id,
            "burst",
            Params::default(),
            Box::new(Burst { count }),
            &NodeConfig::default(),
            max_queued,
        );
        inst.configure().unwrap();
        inst.start().unwrap();
        inst
    }

    fn route(edge: u32, from: u32, output: &str, to: u32) -> Route {
        Route {
            edge: EdgeId(edge),
            from: NodeIndex(from),
            output: output.into(),
            to: NodeIndex(to),
            input: "in".into(),
        }
    }

    fn tick(node: &mut NodeInstance) {
        let clock = TickClock {
            tick: 0,
            elapsed: Duration::ZERO,
            dt: Duration::ZERO,
            now: Utc::now(),
        };
        node.tick("g", clock);
    }

    #[test]
    fn test_fan_out_shares_frames() {
        let mut nodes = vec![instance("src", 2, 8), instance("a", 0, 8), instance("b", 0, 8)];
        let table = RoutingTable::new(vec![route(0, 0, "out", 1), route(1, 0, "out", 2)], 3);

        tick(&mut nodes[0]);
        let emitted: Vec<FrameRef> = nodes[0].outputs()["out"].clone();
        let delivery = Router::deliver(&table, &mut nodes);

        assert_eq!(delivery.routed, 4);
        assert_eq!(delivery.dropped, 0);
        assert_eq!(nodes[1].queued_frames("in"), 2);
        assert_eq!(nodes[2].queued_frames("in"), 2);
        // Same allocation: the emitted Arc plus one per target
        assert_eq!(Arc::strong_count(&emitted[0]), 3);
    }

    #[test]
    fn test_unrouted_outputs_are_discarded() {
        let mut nodes = vec![instance("src", 1, 8), instance("a", 0, 8)];
        let table = RoutingTable::new(vec![route(0, 0, "out", 1)], 2);

        tick(&mut nodes[0]);
        Router::deliver(&table, &mut nodes);

        assert_eq!(nodes[1].queued_frames("in"), 1);
        assert!(nodes[0].outputs().is_empty());
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut nodes = vec![instance("src", 3, 8), instance("a", 0, 2)];
        let table = RoutingTable::new(vec![route(0, 0, "out", 1)], 2);

        tick(&mut nodes[0]);
        let delivery = Router::deliver(&table, &mut nodes);

        assert_eq!(delivery.routed, 3);
        assert_eq!(delivery.dropped, 1);
        assert_eq!(delivery.overflowed, vec![(NodeIndex(1), "in".to_string())]);
        assert_eq!(nodes[1].queued_frames("in"), 2);
    }
}
