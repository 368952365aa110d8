//! Integration tests for graph scheduling: latency, isolation, shutdown and
//! concurrent graphs at different rates.

mod common;

use common::builders::{test_registry, Tap, STUCK_STOP_DELAY};
use fluxgraph::config::{ErrorPolicy, NodeConfig, SchedulerConfig};
use fluxgraph::graph::{GraphDefinition, GraphLoader};
use fluxgraph::pipeline::{
    GraphOutcome, NodeState, Params, Scheduler, SchedulerReport, ShutdownMode,
};
use serial_test::serial;
use std::time::{Duration, Instant};

fn scheduler(definition: GraphDefinition, tap: &Tap) -> Scheduler {
    scheduler_with(definition, tap, GraphLoader::default())
}

fn scheduler_with(definition: GraphDefinition, tap: &Tap, loader: GraphLoader) -> Scheduler {
    let graph = loader.load(definition, &test_registry(tap)).unwrap();
    let mut scheduler = Scheduler::new(graph, SchedulerConfig::default());
    scheduler.configure_all().unwrap();
    scheduler.start_all().unwrap();
    scheduler
}

fn chain() -> GraphDefinition {
    GraphDefinition::new("chain", 100.0)
        .node("a", "tick_source", Params::default())
        .node("b", "collector", Params::default())
        .edge("a", "b")
}

#[test]
fn test_frame_reaches_next_node_one_tick_later() {
    let tap = Tap::new();
    let mut scheduler = scheduler(chain(), &tap);

    for _ in 0..4 {
        scheduler.step();
    }

    // A emits its tick index; B sees it on the following tick
    assert_eq!(tap.values(), vec![(1, 0.0), (2, 1.0), (3, 2.0)]);
}

#[test]
fn test_failing_node_does_not_starve_siblings() {
    let tap = Tap::new();
    let definition = GraphDefinition::new("isolation", 100.0)
        .node("a", "tick_source", Params::default())
        .node("bad", "faulty", Params::default())
        .node("sink", "collector", Params::default())
        .edge("a", "bad")
        .edge("a", "sink");
    let mut scheduler = scheduler(definition, &tap);

    let first = scheduler.step();
    assert_eq!(first.nodes_failed, 1);
    scheduler.step();
    scheduler.step();

    assert_eq!(tap.values().len(), 2);
    assert_eq!(scheduler.node("bad").unwrap().state(), NodeState::Errored);
    assert_eq!(scheduler.node("sink").unwrap().state(), NodeState::Running);
    assert_eq!(scheduler.stats().node_errors, 3);
}

#[test]
fn test_repeated_failures_disable_node() {
    let tap = Tap::new();
    let definition = GraphDefinition::new("disable", 100.0)
        .node("a", "tick_source", Params::default())
        .node("bad", "faulty", Params::default())
        .edge("a", "bad");
    let loader = GraphLoader::new(
        NodeConfig {
            error_policy: ErrorPolicy::Silence,
            max_consecutive_errors: 2,
        },
        16,
    );
    let mut scheduler = scheduler_with(definition, &tap, loader);

    for _ in 0..5 {
        scheduler.step();
    }

    let bad = scheduler.node("bad").unwrap();
    assert_eq!(bad.state(), NodeState::Disabled);
    assert_eq!(bad.total_errors(), 2);
    assert_eq!(tap.ticks(), 5);
}

#[test]
fn test_graceful_shutdown_drains_and_stops_in_reverse_order() {
    let tap = Tap::new();
    let definition = GraphDefinition::new("drain", 100.0)
        .node("a", "tick_source", Params::default())
        .node("p", "passthrough", Params::default())
        .node("b", "collector", Params::default())
        .edge("a", "p")
        .edge("p", "b");
    let mut scheduler = scheduler(definition, &tap);

    scheduler.step();
    assert!(tap.frames().is_empty());

    scheduler.shutdown(ShutdownMode::Graceful);
    assert_eq!(tap.values().len(), 1);
    assert_eq!(tap.stops(), ["collector", "tick_source"]);
}

#[test]
fn test_forced_shutdown_abandons_buffers_but_stops_nodes() {
    let tap = Tap::new();
    let mut scheduler = scheduler(chain(), &tap);

    scheduler.step();
    scheduler.shutdown(ShutdownMode::Forced);

    assert!(tap.frames().is_empty());
    assert_eq!(tap.stops(), ["collector", "tick_source"]);
}

fn run_for(definition: GraphDefinition, tap: &Tap) -> fluxgraph::pipeline::SchedulerHandle {
    let graph = GraphLoader::default()
        .load(definition, &test_registry(tap))
        .unwrap();
    Scheduler::new(graph, SchedulerConfig::default()).spawn().unwrap()
}

#[test]
#[serial]
fn test_concurrent_graphs_tick_at_their_own_rates() {
    let fast_tap = Tap::new();
    let slow_tap = Tap::new();
    let fast = run_for(
        GraphDefinition::new("fast", 50.0).node("s", "tick_source", Params::default()),
        &fast_tap,
    );
    let slow = run_for(
        GraphDefinition::new("slow", 5.0).node("s", "tick_source", Params::default()),
        &slow_tap,
    );

    std::thread::sleep(Duration::from_secs(1));
    fast.stop(ShutdownMode::Graceful);
    slow.stop(ShutdownMode::Graceful);
    let fast: SchedulerReport = fast.join();
    let slow: SchedulerReport = slow.join();

    assert_eq!(fast.outcome, GraphOutcome::Completed);
    assert_eq!(slow.outcome, GraphOutcome::Completed);
    assert!(
        (40..=55).contains(&fast.stats.ticks),
        "fast graph ticked {} times",
        fast.stats.ticks
    );
    assert!(
        (4..=6).contains(&slow.stats.ticks),
        "slow graph ticked {} times",
        slow.stats.ticks
    );
    assert_eq!(fast_tap.ticks(), fast.stats.ticks);
    common::assert_float_eq(
        fast.stats.ticks as f64 / slow.stats.ticks as f64,
        10.0,
        3.0,
    );
}

#[test]
#[serial]
fn test_spawned_graph_stops_within_timeout() {
    let tap = Tap::new();
    let handle = run_for(chain(), &tap);

    assert!(common::wait_for(Duration::from_secs(2), || tap.values().len() >= 3));
    let report = handle.shutdown(Duration::from_secs(1));

    assert!(report.outcome.is_success());
    assert_eq!(tap.stops(), ["collector", "tick_source"]);
}

#[test]
#[serial]
fn test_shutdown_gives_up_on_a_hanging_stop_hook() {
    let tap = Tap::new();
    let definition = GraphDefinition::new("hang", 50.0)
        .node("a", "tick_source", Params::default())
        .node("stuck", "stuck_on_stop", Params::default())
        .edge("a", "stuck");
    let handle = run_for(definition, &tap);
    assert!(common::wait_for(Duration::from_secs(2), || tap.ticks() >= 3));

    let started = Instant::now();
    let report = handle.shutdown(Duration::from_millis(200));
    let waited = started.elapsed();

    assert!(waited < STUCK_STOP_DELAY / 2, "shutdown blocked for {waited:?}");
    assert_eq!(report.graph, "hang");
    assert_eq!(report.outcome, GraphOutcome::TimedOut);
    assert!(!report.outcome.is_success());
}
