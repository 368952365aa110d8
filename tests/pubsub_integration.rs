//! Integration tests for the broker bridge between independently clocked
//! graphs.

mod common;

use common::builders::{add_test_nodes, eeg_frame, Tap};
use common::{fast_broker_config, unused_address, wait_for};
use fluxgraph::broker::{Broker, BrokerEndpoint};
use fluxgraph::config::{BrokerConfig, SchedulerConfig};
use fluxgraph::graph::{GraphDefinition, GraphLoader};
use fluxgraph::nodes::builtin_registry;
use fluxgraph::pipeline::{GraphOutcome, NodeRegistry, Params, Scheduler, SchedulerHandle};
use serial_test::serial;
use std::time::Duration;

fn registry(config: &BrokerConfig, tap: &Tap) -> NodeRegistry {
    let mut registry = builtin_registry(&BrokerEndpoint::from(config), config);
    add_test_nodes(&mut registry, tap);
    registry
}

fn spawn(definition: GraphDefinition, registry: &NodeRegistry) -> SchedulerHandle {
    let graph = GraphLoader::default().load(definition, registry).unwrap();
    Scheduler::new(graph, SchedulerConfig::default()).spawn().unwrap()
}

fn producer(topic: &str) -> GraphDefinition {
    GraphDefinition::new("producer", 20.0)
        .node("src", "repeater", Params::default())
        .node("pub", "publish", Params::default().with("topic", topic))
        .edge("src", "pub")
}

fn consumer(topics: Vec<&str>) -> GraphDefinition {
    GraphDefinition::new("consumer", 20.0)
        .node("sub", "subscribe", Params::default().with("topics", topics))
        .node("sink", "collector", Params::default())
        .edge("sub", "sink")
}

#[test]
#[serial]
fn test_frame_round_trip_through_broker() {
    let broker = Broker::bind("127.0.0.1:0").unwrap();
    let config = fast_broker_config(&broker.local_addr().to_string());
    let tap = Tap::new();
    let registry = registry(&config, &tap);

    let consumer = spawn(consumer(vec!["eeg"]), &registry);
    assert!(wait_for(Duration::from_secs(3), || broker.subscriber_count("eeg") == 1));
    let producer = spawn(producer("eeg"), &registry);

    assert!(wait_for(Duration::from_secs(3), || !tap.frames().is_empty()));
    let producer = producer.shutdown(Duration::from_secs(1));
    let consumer = consumer.shutdown(Duration::from_secs(1));

    let (_, received) = &tap.frames()[0];
    let expected = eeg_frame();
    assert_eq!(received.timestamps(), expected.timestamps());
    assert_eq!(received.channels(), expected.channels());
    assert_eq!(received.rows(), expected.rows());
    assert_eq!(received.meta(), expected.meta());
    assert_eq!(**received, expected);

    assert_eq!(producer.outcome, GraphOutcome::Completed);
    assert_eq!(consumer.outcome, GraphOutcome::Completed);
}

#[test]
#[serial]
fn test_topics_are_isolated() {
    let broker = Broker::bind("127.0.0.1:0").unwrap();
    let config = fast_broker_config(&broker.local_addr().to_string());
    let tap = Tap::new();
    let registry = registry(&config, &tap);

    let consumer = spawn(consumer(vec!["emg"]), &registry);
    assert!(wait_for(Duration::from_secs(3), || broker.subscriber_count("emg") == 1));
    let producer = spawn(producer("eeg"), &registry);

    std::thread::sleep(Duration::from_millis(300));
    producer.shutdown(Duration::from_secs(1));
    consumer.shutdown(Duration::from_secs(1));

    assert!(tap.frames().is_empty());
}

#[test]
#[serial]
fn test_publisher_survives_missing_broker() {
    let config = fast_broker_config(&unused_address());
    let tap = Tap::new();
    let registry = registry(&config, &tap);

    let producer = spawn(producer("eeg"), &registry);
    std::thread::sleep(Duration::from_millis(300));
    let report = producer.shutdown(Duration::from_secs(1));

    assert_eq!(report.outcome, GraphOutcome::Completed);
    assert!(report.stats.ticks >= 3);
    assert_eq!(report.stats.node_errors, 0);
}

#[test]
#[serial]
fn test_subscriber_picks_up_late_broker() {
    let address = unused_address();
    let config = fast_broker_config(&address);
    let tap = Tap::new();
    let registry = registry(&config, &tap);

    // Subscriber starts first and keeps retrying
    let consumer = spawn(consumer(vec!["eeg"]), &registry);
    std::thread::sleep(Duration::from_millis(100));

    let broker = Broker::bind(&address).unwrap();
    assert!(wait_for(Duration::from_secs(3), || broker.subscriber_count("eeg") == 1));
    let producer = spawn(producer("eeg"), &registry);

    assert!(wait_for(Duration::from_secs(3), || !tap.frames().is_empty()));
    producer.shutdown(Duration::from_secs(1));
    let report = consumer.shutdown(Duration::from_secs(1));
    assert!(report.outcome.is_success());
}
