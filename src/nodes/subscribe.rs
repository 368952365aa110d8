//! SubscribeNode: emits frames received from broker topics.
//!
//! A `SubscriberListener` thread receives frames in the background; each tick
//! drains whatever accumulated since the previous one and emits it on `out`.
//! Frames from every subscribed topic share the one output port.

use crate::broker::{BrokerEndpoint, SubscriberListener};
use crate::config::BrokerConfig;
use crate::pipeline::node::{Node, NodeContext, NodeError, NodeResult};
use crate::pipeline::params::Params;
use crate::pipeline::port::PortDescriptor;

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];

pub struct SubscribeNode {
    endpoint: BrokerEndpoint,
    config: BrokerConfig,
    topics: Vec<String>,
    listener: Option<SubscriberListener>,
    received: u64,
}

impl SubscribeNode {
    pub fn new(endpoint: BrokerEndpoint, config: BrokerConfig) -> Self {
        Self {
            endpoint,
            config,
            topics: Vec::new(),
            listener: None,
            received: 0,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Frames emitted so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_connected(&self) -> bool {
        self.listener.as_ref().is_some_and(SubscriberListener::is_connected)
    }
}

impl Node for SubscribeNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn configure(&mut self, params: &Params) -> NodeResult<()> {
        let topics = params
            .string_list("topics")?
            .ok_or_else(|| NodeError::Config("missing required parameter `topics`".into()))?;
        if topics.is_empty() || topics.iter().any(String::is_empty) {
            return Err(NodeError::Config(
                "parameter `topics` must name at least one non-empty topic".into(),
            ));
        }
        self.topics = topics;
        Ok(())
    }

    fn start(&mut self) -> NodeResult<()> {
        let listener =
            SubscriberListener::spawn(self.endpoint.clone(), &self.config, self.topics.clone())
                .map_err(|e| NodeError::runtime(format!("failed to start listener: {e}")))?;
        tracing::debug!(broker = %self.endpoint, topics = ?self.topics, "Subscriber started");
        self.listener = Some(listener);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };
        for frame in listener.drain() {
            self.received += 1;
            ctx.emit("out", frame);
        }
        Ok(())
    }

    fn stop(&mut self) -> NodeResult<()> {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
            if listener.dropped_frames() > 0 {
                tracing::warn!(
                    topics = ?self.topics,
                    dropped = listener.dropped_frames(),
                    "Subscriber dropped frames while its queue was full"
                );
            }
        }
        Ok(())
    }
}
