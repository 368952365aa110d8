//! Per-graph scheduler: the tick loop.
//!
//! A scheduler owns one loaded graph and runs on a dedicated thread. Each tick:
//! 1. Run every runnable node in topological order, handing it the frames that
//!    were queued on its inputs since the previous tick.
//! 2. Route the tick's outputs into downstream input queues.
//! 3. Sleep until the next absolute deadline `start + n * period`.
//!
//! Because routing happens after all nodes ran, a frame emitted at tick `t` is
//! consumed at tick `t + 1`, whatever the topology.

use crate::config::SchedulerConfig;
use crate::error::EngineError;
use crate::graph::{CompiledPlan, LoadedGraph};
use crate::pipeline::bridge::{
    command_channel, FinishGuard, SchedulerCommand, SchedulerHandle, ShutdownMode,
};
use crate::pipeline::instance::{NodeInstance, NodeRuntimeError, TickClock, TickOutcome};
use crate::pipeline::router::Router;
use crate::pipeline::throttle::LogThrottle;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep, so the running flag is observed promptly.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Below this the final stretch to a deadline is spun rather than slept.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Counters accumulated over a scheduler's lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Ticks whose processing exceeded the period.
    pub overruns: u64,
    pub frames_routed: u64,
    pub frames_dropped: u64,
    pub node_errors: u64,
    /// Shutdown passes over nodes with pending input; not counted in `ticks`.
    pub drain_passes: u64,
    pub max_tick_time: Duration,
    /// Nominal tick count (elapsed / period) minus actual ticks.
    pub drift_ticks: f64,
}

/// Result of one `step`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub nodes_run: usize,
    pub nodes_failed: usize,
    pub frames_routed: u64,
    pub frames_dropped: u64,
    pub elapsed: Duration,
}

/// How a graph ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOutcome {
    /// Stopped on request.
    Completed,
    /// A node raised a fatal error; the graph was shut down.
    Fatal { node: String, cause: String },
    /// The scheduler thread panicked.
    Panicked,
    /// The thread was still running its stop hooks when the shutdown timeout
    /// ran out and was left behind.
    TimedOut,
}

impl GraphOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GraphOutcome::Completed)
    }
}

/// Final report returned when a scheduler exits.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerReport {
    pub graph: String,
    pub outcome: GraphOutcome,
    pub stats: SchedulerStats,
}

/// Drives one graph.
pub struct Scheduler {
    graph: String,
    rate: f64,
    period: Duration,
    nodes: Vec<NodeInstance>,
    plan: CompiledPlan,
    throttle: LogThrottle,
    stats: SchedulerStats,
    tick: u64,
    start_time: Option<Instant>,
    last_tick_time: Option<Instant>,
    commands: Option<Receiver<SchedulerCommand>>,
    /// Set from the handle to cut a graceful drain short.
    force: Arc<AtomicBool>,
    fatal: Option<NodeRuntimeError>,
    stopped: bool,
}

impl Scheduler {
    pub fn new(graph: LoadedGraph, config: SchedulerConfig) -> Self {
        let period = graph.period();
        let rate = graph.rate();
        let LoadedGraph {
            definition,
            nodes,
            plan,
            ..
        } = graph;
        Self {
            graph: definition.id,
            rate,
            period,
            nodes,
            plan,
            throttle: LogThrottle::new(config.log_interval()),
            stats: SchedulerStats::default(),
            tick: 0,
            start_time: None,
            last_tick_time: None,
            commands: None,
            force: Arc::new(AtomicBool::new(false)),
            fatal: None,
            stopped: false,
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn nodes(&self) -> &[NodeInstance] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// The first fatal node error seen, if any.
    pub fn fatal_error(&self) -> Option<&NodeRuntimeError> {
        self.fatal.as_ref()
    }

    // ── Lifecycle ──

    /// Run `configure` on every node in topological order. Non-fatal failures
    /// leave the node errored and are logged; a fatal one is returned.
    pub fn configure_all(&mut self) -> Result<(), NodeRuntimeError> {
        for pos in 0..self.plan.order.len() {
            let idx = self.plan.order[pos].index();
            if let Err(e) = self.nodes[idx].configure() {
                self.startup_failure(e)?;
            }
        }
        Ok(())
    }

    /// Run `start` on every configured node in topological order.
    pub fn start_all(&mut self) -> Result<(), NodeRuntimeError> {
        for pos in 0..self.plan.order.len() {
            let idx = self.plan.order[pos].index();
            if let Err(e) = self.nodes[idx].start() {
                self.startup_failure(e)?;
            }
        }
        Ok(())
    }

    fn startup_failure(&mut self, err: NodeRuntimeError) -> Result<(), NodeRuntimeError> {
        self.stats.node_errors += 1;
        if err.is_fatal() {
            return Err(err);
        }
        tracing::error!(
            graph = %self.graph,
            node = %err.node,
            hook = %err.hook,
            error = %err.source,
            "Node failed to initialize and will be skipped"
        );
        Ok(())
    }

    // ── Tick execution ──

    /// Execute exactly one tick and route its outputs.
    pub fn step(&mut self) -> TickReport {
        self.execute(false)
    }

    fn execute(&mut self, pending_only: bool) -> TickReport {
        let now = Instant::now();
        let start = *self.start_time.get_or_insert(now);
        let dt = self
            .last_tick_time
            .map(|t| now.duration_since(t))
            .unwrap_or(self.period);
        self.last_tick_time = Some(now);

        let clock = TickClock {
            tick: self.tick,
            elapsed: now.duration_since(start),
            dt,
            now: Utc::now(),
        };
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for pos in 0..self.plan.order.len() {
            let idx = self.plan.order[pos].index();
            let node = &mut self.nodes[idx];
            if pending_only && !node.has_pending_input() {
                continue;
            }
            let outcome = node.tick(&self.graph, clock);
            self.record_outcome(outcome, &mut report);
        }

        let delivery = Router::deliver(&self.plan.routes, &mut self.nodes);
        for (idx, port) in &delivery.overflowed {
            let node = self.nodes[idx.index()].id();
            let key = format!("overflow:{}:{}", node, port);
            if let Some(suppressed) = self.throttle.check(&key) {
                tracing::warn!(
                    graph = %self.graph,
                    node = %node,
                    port = %port,
                    suppressed,
                    "Input queue full, dropped oldest frame"
                );
            }
        }

        report.frames_routed = delivery.routed;
        report.frames_dropped = delivery.dropped;
        report.elapsed = now.elapsed();

        if pending_only {
            self.stats.drain_passes += 1;
        } else {
            self.tick += 1;
            self.stats.ticks += 1;
        }
        self.stats.frames_routed += delivery.routed;
        self.stats.frames_dropped += delivery.dropped;
        self.stats.max_tick_time = self.stats.max_tick_time.max(report.elapsed);
        report
    }

    fn record_outcome(&mut self, outcome: TickOutcome, report: &mut TickReport) {
        match outcome {
            TickOutcome::Ran => report.nodes_run += 1,
            TickOutcome::Skipped => {}
            TickOutcome::Failed(err) => {
                report.nodes_failed += 1;
                self.stats.node_errors += 1;
                let key = format!("tick:{}", err.node);
                if let Some(suppressed) = self.throttle.check(&key) {
                    tracing::warn!(
                        graph = %self.graph,
                        node = %err.node,
                        tick = report.tick,
                        error = %err.source,
                        suppressed,
                        "Node tick failed"
                    );
                }
            }
            TickOutcome::Disabled(err) => {
                report.nodes_failed += 1;
                self.stats.node_errors += 1;
                tracing::error!(
                    graph = %self.graph,
                    node = %err.node,
                    tick = report.tick,
                    error = %err.source,
                    "Node disabled after repeated failures"
                );
            }
            TickOutcome::Fatal(err) => {
                report.nodes_failed += 1;
                self.stats.node_errors += 1;
                tracing::error!(
                    graph = %self.graph,
                    node = %err.node,
                    tick = report.tick,
                    error = %err.source,
                    "Fatal node error, shutting graph down"
                );
                if self.fatal.is_none() {
                    self.fatal = Some(err);
                }
            }
        }
    }

    // ── Run loop ──

    /// Configure, start and tick the graph until `running` is cleared, a stop
    /// command arrives, or a node fails fatally. Always shuts the graph down.
    pub fn run(&mut self, running: Arc<AtomicBool>) -> SchedulerReport {
        tracing::info!(
            graph = %self.graph,
            rate = self.rate,
            nodes = self.nodes.len(),
            "Scheduler started"
        );

        let startup = self.configure_all().and_then(|()| self.start_all());
        let mode = match startup {
            Ok(()) => self.tick_loop(&running),
            Err(err) => {
                tracing::error!(
                    graph = %self.graph,
                    node = %err.node,
                    hook = %err.hook,
                    error = %err.source,
                    "Fatal node error during startup"
                );
                self.fatal = Some(err);
                ShutdownMode::Forced
            }
        };

        self.shutdown(mode);
        let report = self.report();
        tracing::info!(
            graph = %self.graph,
            ticks = report.stats.ticks,
            overruns = report.stats.overruns,
            dropped = report.stats.frames_dropped,
            "Scheduler exiting"
        );
        report
    }

    fn tick_loop(&mut self, running: &AtomicBool) -> ShutdownMode {
        let origin = Instant::now();
        let mut deadline = origin;

        loop {
            if !running.load(Ordering::Acquire) {
                return ShutdownMode::Graceful;
            }
            if let Some(mode) = self.poll_command() {
                return mode;
            }

            let report = self.step();
            if self.fatal.is_some() {
                return ShutdownMode::Forced;
            }

            deadline += self.period;
            let now = Instant::now();
            if now > deadline {
                self.stats.overruns += 1;
                if let Some(suppressed) = self.throttle.check("overrun") {
                    tracing::warn!(
                        graph = %self.graph,
                        tick = report.tick,
                        elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                        period_ms = self.period.as_secs_f64() * 1000.0,
                        suppressed,
                        "Scheduling overrun"
                    );
                }
                // Re-anchor instead of bursting to catch up
                deadline = now;
            } else if let Some(mode) = self.wait_until(deadline, running) {
                return mode;
            }

            let nominal = origin.elapsed().as_secs_f64() / self.period.as_secs_f64();
            self.stats.drift_ticks = nominal - self.stats.ticks as f64;
        }
    }

    fn poll_command(&mut self) -> Option<ShutdownMode> {
        let rx = self.commands.as_ref()?;
        match rx.try_recv() {
            Ok(SchedulerCommand::Stop(mode)) => Some(mode),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                // Handle dropped
                Some(ShutdownMode::Graceful)
            }
        }
    }

    /// Sleep until `deadline`, waking early for commands or a cleared flag.
    fn wait_until(&mut self, deadline: Instant, running: &AtomicBool) -> Option<ShutdownMode> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let remaining = deadline - now;
            if remaining <= SPIN_THRESHOLD {
                while Instant::now() < deadline {
                    std::hint::spin_loop();
                }
                return None;
            }

            let slice = (remaining - SPIN_THRESHOLD).min(MAX_SLEEP_SLICE);
            match &self.commands {
                Some(rx) => match rx.recv_timeout(slice) {
                    Ok(SchedulerCommand::Stop(mode)) => return Some(mode),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return Some(ShutdownMode::Graceful),
                },
                None => std::thread::sleep(slice),
            }

            if !running.load(Ordering::Acquire) {
                return Some(ShutdownMode::Graceful);
            }
        }
    }

    // ── Shutdown ──

    /// Shut the graph down. Graceful mode first drains queued frames through
    /// the graph; both modes then call `stop` in reverse topological order.
    /// Runs at most once.
    pub fn shutdown(&mut self, mode: ShutdownMode) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if mode == ShutdownMode::Graceful {
            self.drain();
        }
        self.abandon_inputs();

        let order: Vec<_> = self.plan.reverse_order().collect();
        for idx in order {
            let node = &mut self.nodes[idx.index()];
            if let Err(e) = node.stop() {
                tracing::warn!(
                    graph = %self.graph,
                    node = %e.node,
                    error = %e.source,
                    "Node failed to stop cleanly"
                );
            }
        }
        tracing::debug!(graph = %self.graph, ?mode, "Graph shut down");
    }

    /// Extra passes over nodes with pending input. The graph is acyclic, so
    /// one pass per node is enough to flush every path. A forced stop from the
    /// handle ends the drain before the next pass.
    fn drain(&mut self) {
        for _ in 0..self.nodes.len() {
            if self.force.load(Ordering::Acquire) {
                tracing::debug!(graph = %self.graph, "Drain interrupted by forced stop");
                break;
            }
            let pending = self
                .nodes
                .iter()
                .any(|n| n.is_runnable() && n.has_pending_input());
            if !pending {
                break;
            }
            self.execute(true);
        }
    }

    /// Drop whatever is still queued. Empty after a complete drain.
    fn abandon_inputs(&mut self) {
        let abandoned = self.nodes.iter().filter(|n| n.has_pending_input()).count();
        if abandoned > 0 {
            tracing::debug!(
                graph = %self.graph,
                nodes = abandoned,
                "Shutdown abandons queued frames"
            );
        }
        self.nodes.iter_mut().for_each(NodeInstance::clear_inputs);
    }

    fn report(&self) -> SchedulerReport {
        let outcome = match &self.fatal {
            Some(err) => GraphOutcome::Fatal {
                node: err.node.clone(),
                cause: err.source.to_string(),
            },
            None => GraphOutcome::Completed,
        };
        SchedulerReport {
            graph: self.graph.clone(),
            outcome,
            stats: self.stats.clone(),
        }
    }

    /// Run the scheduler on its own named thread.
    pub fn spawn(mut self) -> Result<SchedulerHandle, EngineError> {
        let (cmd_tx, cmd_rx) = command_channel();
        self.commands = Some(cmd_rx);

        let graph = self.graph.clone();
        let running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));

        let force = Arc::clone(&self.force);
        let thread_running = Arc::clone(&running);
        let guard = FinishGuard(Arc::clone(&finished));
        let join = std::thread::Builder::new()
            .name(format!("fluxgraph-{}", graph))
            .spawn(move || {
                let _guard = guard;
                self.run(thread_running)
            })
            .map_err(|source| EngineError::Spawn {
                graph: graph.clone(),
                source,
            })?;

        Ok(SchedulerHandle::new(graph, cmd_tx, running, force, finished, join))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("graph", &self.graph)
            .field("rate", &self.rate)
            .field("tick", &self.tick)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
