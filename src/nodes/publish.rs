//! PublishNode: sends every frame it receives to a broker topic.
//!
//! Publishing is best-effort. When the broker cannot be reached the frame is
//! dropped and a rate-limited warning is logged; the tick itself never fails.

use crate::broker::Publisher;
use crate::pipeline::node::{Node, NodeContext, NodeError, NodeResult};
use crate::pipeline::params::Params;
use crate::pipeline::port::PortDescriptor;
use crate::pipeline::throttle::LogThrottle;

static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];

pub struct PublishNode {
    publisher: Box<dyn Publisher>,
    topic: String,
    published: u64,
    dropped: u64,
    throttle: LogThrottle,
}

impl PublishNode {
    pub fn new(publisher: Box<dyn Publisher>) -> Self {
        Self {
            publisher,
            topic: String::new(),
            published: 0,
            dropped: 0,
            throttle: LogThrottle::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Frames lost to transport failures.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Node for PublishNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn configure(&mut self, params: &Params) -> NodeResult<()> {
        let topic = params.require_str("topic")?;
        if topic.is_empty() {
            return Err(NodeError::Config("parameter `topic` must not be empty".into()));
        }
        self.topic = topic.to_string();
        Ok(())
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        for frame in ctx.input("in") {
            match self.publisher.publish(&self.topic, frame) {
                Ok(()) => self.published += 1,
                Err(e) => {
                    self.dropped += 1;
                    if let Some(suppressed) = self.throttle.check("publish") {
                        tracing::warn!(
                            graph = ctx.graph,
                            node = ctx.node,
                            topic = %self.topic,
                            error = %e,
                            suppressed,
                            "Publish failed, frame dropped"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
