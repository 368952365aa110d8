//! DisplayNode: logs every received frame.

use crate::pipeline::node::{Node, NodeContext, NodeResult};
use crate::pipeline::port::PortDescriptor;

static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];

#[derive(Debug, Default)]
pub struct DisplayNode {
    frames_seen: u64,
}

impl DisplayNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Node for DisplayNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        for frame in ctx.input("in") {
            self.frames_seen += 1;
            let span_ms = match (frame.first_timestamp(), frame.last_timestamp()) {
                (Some(first), Some(last)) => (last - first).num_microseconds().unwrap_or(0) as f64 / 1000.0,
                _ => 0.0,
            };
            tracing::info!(
                graph = ctx.graph,
                node = ctx.node,
                tick = ctx.tick,
                rows = frame.len(),
                channels = ?frame.channels(),
                span_ms,
                "Frame received"
            );
        }
        Ok(())
    }
}
