//! Built-in node implementations.
//!
//! These are reference nodes that let a graph run end to end: a synthetic
//! source, a log sink, a CSV recorder, and the publish/subscribe endpoints of
//! the broker bridge.

pub mod display;
pub mod passthrough;
pub mod publish;
pub mod recorder;
pub mod signal;
pub mod subscribe;

pub use display::DisplayNode;
pub use passthrough::PassthroughNode;
pub use publish::PublishNode;
pub use recorder::RecorderNode;
pub use signal::SignalNode;
pub use subscribe::SubscribeNode;

use crate::broker::{BrokerEndpoint, PublisherConnection};
use crate::config::BrokerConfig;
use crate::pipeline::registry::NodeRegistry;

/// Register every built-in node under its handle.
///
/// Broker-aware nodes capture `endpoint` and `config`; each instance opens its
/// own connection.
pub fn register_builtin(registry: &mut NodeRegistry, endpoint: &BrokerEndpoint, config: &BrokerConfig) {
    registry
        .register("signal", || Box::new(SignalNode::new()))
        .register("display", || Box::new(DisplayNode::new()))
        .register("recorder", || Box::new(RecorderNode::new()))
        .register("passthrough", || Box::new(PassthroughNode::new()));

    let (pub_endpoint, pub_config) = (endpoint.clone(), config.clone());
    registry.register("publish", move || {
        let connection = PublisherConnection::new(pub_endpoint.clone(), &pub_config);
        Box::new(PublishNode::new(Box::new(connection)))
    });

    let (sub_endpoint, sub_config) = (endpoint.clone(), config.clone());
    registry.register("subscribe", move || {
        Box::new(SubscribeNode::new(sub_endpoint.clone(), sub_config.clone()))
    });
}

/// Registry holding every built-in node.
pub fn builtin_registry(endpoint: &BrokerEndpoint, config: &BrokerConfig) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin(&mut registry, endpoint, config);
    registry
}
