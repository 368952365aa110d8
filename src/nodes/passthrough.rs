//! PassthroughNode: forwards `in` to `out` unchanged.

use crate::pipeline::node::{Node, NodeContext, NodeResult};
use crate::pipeline::port::PortDescriptor;

static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in"), PortDescriptor::output("out")];

#[derive(Debug, Default)]
pub struct PassthroughNode;

impl PassthroughNode {
    pub fn new() -> Self {
        Self
    }
}

impl Node for PassthroughNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        let frames = ctx.input("in").to_vec();
        for frame in frames {
            ctx.emit("out", frame);
        }
        Ok(())
    }
}
