//! Process-level orchestration.
//!
//! The engine loads graph descriptions, starts one scheduler thread per valid
//! graph and collects every scheduler's report once the run ends. A graph that
//! fails validation is reported and skipped; the others still run.

use crate::broker::BrokerEndpoint;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{DefinitionError, GraphDefinition, GraphLoader, LoadedGraph};
use crate::nodes;
use crate::pipeline::bridge::{SchedulerHandle, ShutdownMode};
use crate::pipeline::registry::NodeRegistry;
use crate::pipeline::scheduler::{GraphOutcome, Scheduler, SchedulerReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the engine checks for stop conditions while graphs run.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A description or graph that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    /// File the failure came from, if loaded from disk.
    pub file: Option<PathBuf>,
    /// Graph id, when the failure is scoped to one graph.
    pub graph: Option<String>,
    pub error: DefinitionError,
}

/// Outcome of loading a set of descriptions.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub graphs: Vec<LoadedGraph>,
    pub failures: Vec<LoadFailure>,
}

impl LoadSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Final result of an engine run.
#[derive(Debug, Default)]
pub struct EngineReport {
    pub graphs: Vec<SchedulerReport>,
    pub failures: Vec<LoadFailure>,
}

impl EngineReport {
    /// 0 when every graph loaded and completed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        let failed = !self.failures.is_empty()
            || self.graphs.iter().any(|r| !r.outcome.is_success());
        i32::from(failed)
    }
}

/// Graphs currently running on their scheduler threads.
#[derive(Debug)]
pub struct RunningGraphs {
    handles: Vec<SchedulerHandle>,
    shutdown_timeout: Duration,
}

impl RunningGraphs {
    pub fn graphs(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(SchedulerHandle::graph)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn all_finished(&self) -> bool {
        self.handles.iter().all(SchedulerHandle::is_finished)
    }

    /// Block until `stop` is set, `duration` elapses, or every graph has ended
    /// on its own.
    pub fn wait(&self, stop: &AtomicBool, duration: Option<Duration>) {
        let deadline = duration.map(|d| Instant::now() + d);
        loop {
            if stop.load(Ordering::Acquire) {
                tracing::info!("Stop requested");
                return;
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                tracing::info!("Run duration elapsed");
                return;
            }
            if self.all_finished() {
                tracing::info!("All graphs finished");
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Shut every graph down and collect the reports.
    ///
    /// Graceful stops are requested from all graphs at once so they drain in
    /// parallel; each gets the configured timeout before being forced.
    pub fn shutdown(self) -> Vec<SchedulerReport> {
        for handle in &self.handles {
            handle.stop(ShutdownMode::Graceful);
        }
        let timeout = self.shutdown_timeout;
        self.handles
            .into_iter()
            .map(|handle| handle.shutdown(timeout))
            .collect()
    }
}

/// Loads and runs graphs.
pub struct Engine {
    config: EngineConfig,
    registry: NodeRegistry,
    loader: GraphLoader,
}

impl Engine {
    /// Engine with the built-in nodes registered against the configured broker.
    pub fn new(config: EngineConfig) -> Self {
        let endpoint = BrokerEndpoint::from(&config.broker);
        let registry = nodes::builtin_registry(&endpoint, &config.broker);
        Self::with_registry(config, registry)
    }

    /// Engine with a caller-supplied registry.
    pub fn with_registry(config: EngineConfig, registry: NodeRegistry) -> Self {
        let loader = GraphLoader::from_config(&config);
        Self {
            config,
            registry,
            loader,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register additional node types before loading.
    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    /// Parse and load every file. Graph ids must be unique across all files.
    pub fn load_files<P: AsRef<Path>>(&self, files: &[P]) -> LoadSummary {
        let mut definitions = Vec::new();
        let mut failures = Vec::new();
        for file in files {
            let file = file.as_ref();
            match GraphLoader::parse_file(file) {
                Ok(defs) => {
                    tracing::debug!(file = %file.display(), graphs = defs.len(), "Parsed description");
                    definitions.extend(defs);
                }
                Err(error) => {
                    tracing::error!(file = %file.display(), error = %error, "Failed to read description");
                    failures.push(LoadFailure {
                        file: Some(file.to_path_buf()),
                        graph: None,
                        error,
                    });
                }
            }
        }

        let mut summary = self.load_definitions(definitions);
        failures.append(&mut summary.failures);
        summary.failures = failures;
        summary
    }

    /// Validate and instantiate already parsed definitions.
    pub fn load_definitions(&self, definitions: Vec<GraphDefinition>) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for load in self.loader.load_all(definitions, &self.registry) {
            match load.result {
                Ok(graph) => summary.graphs.push(graph),
                Err(error) => summary.failures.push(LoadFailure {
                    file: None,
                    graph: Some(load.graph),
                    error,
                }),
            }
        }
        summary
    }

    /// Start one scheduler thread per graph.
    ///
    /// If a thread cannot be created the graphs already started are shut down
    /// and the spawn error is returned.
    pub fn start(&self, graphs: Vec<LoadedGraph>) -> Result<RunningGraphs> {
        let mut running = RunningGraphs {
            handles: Vec::with_capacity(graphs.len()),
            shutdown_timeout: self.config.scheduler.shutdown_timeout(),
        };
        for graph in graphs {
            let scheduler = Scheduler::new(graph, self.config.scheduler.clone());
            match scheduler.spawn() {
                Ok(handle) => running.handles.push(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Aborting startup");
                    running.shutdown();
                    return Err(e);
                }
            }
        }
        tracing::info!(graphs = running.len(), "Engine started");
        Ok(running)
    }

    /// Load `files`, run every valid graph until `stop` is set, `duration`
    /// elapses or all graphs end, then shut down.
    pub fn run<P: AsRef<Path>>(
        &self,
        files: &[P],
        duration: Option<Duration>,
        stop: &AtomicBool,
    ) -> Result<EngineReport> {
        // Failures are logged as they are found
        let summary = self.load_files(files);
        let running = self.start(summary.graphs)?;
        if !running.is_empty() {
            running.wait(stop, duration);
        }
        let graphs = running.shutdown();

        for report in &graphs {
            match &report.outcome {
                GraphOutcome::Completed => tracing::info!(
                    graph = %report.graph,
                    ticks = report.stats.ticks,
                    overruns = report.stats.overruns,
                    "Graph completed"
                ),
                GraphOutcome::Fatal { node, cause } => tracing::error!(
                    graph = %report.graph,
                    node = %node,
                    cause = %cause,
                    "Graph ended fatally"
                ),
                GraphOutcome::Panicked => {
                    tracing::error!(graph = %report.graph, "Graph panicked")
                }
                GraphOutcome::TimedOut => {
                    tracing::error!(graph = %report.graph, "Graph did not stop within the shutdown timeout")
                }
            }
        }

        Ok(EngineReport {
            graphs,
            failures: summary.failures,
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("broker", &self.config.broker.address)
            .field("registry", &self.registry)
            .finish()
    }
}
