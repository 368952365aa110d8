//! Thread boundary between a graph scheduler and the engine.
//!
//! Each scheduler runs on its own thread. The engine keeps a `SchedulerHandle`
//! per graph to request shutdown and collect the final `SchedulerReport`.

use crate::pipeline::scheduler::{GraphOutcome, SchedulerReport, SchedulerStats};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How a graph is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drain queued frames through the graph, then stop every node.
    Graceful,
    /// Abandon queued frames and stop every node.
    Forced,
}

/// Commands sent from the engine to a scheduler thread.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Leave the tick loop and shut the graph down.
    Stop(ShutdownMode),
}

/// Channel capacity for commands (engine → scheduler).
const CMD_CHANNEL_CAPACITY: usize = 16;

/// Create the command channel: `(sender for the handle, receiver for the scheduler)`.
pub(crate) fn command_channel() -> (Sender<SchedulerCommand>, Receiver<SchedulerCommand>) {
    bounded(CMD_CHANNEL_CAPACITY)
}

/// Sets the finished flag when the scheduler thread exits, panics included.
pub(crate) struct FinishGuard(pub(crate) Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Engine-side handle for one running scheduler.
pub struct SchedulerHandle {
    graph: String,
    cmd_tx: Sender<SchedulerCommand>,
    running: Arc<AtomicBool>,
    force: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    join: JoinHandle<SchedulerReport>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        graph: String,
        cmd_tx: Sender<SchedulerCommand>,
        running: Arc<AtomicBool>,
        force: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
        join: JoinHandle<SchedulerReport>,
    ) -> Self {
        Self {
            graph,
            cmd_tx,
            running,
            force,
            finished,
            join,
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Ask the scheduler to shut down. Returns immediately.
    ///
    /// A forced stop also reaches a scheduler that is already draining.
    pub fn stop(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Forced {
            self.force.store(true, Ordering::Release);
        }
        match self.cmd_tx.try_send(SchedulerCommand::Stop(mode)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                // Fall back to the flag, which the loop checks every tick
                self.running.store(false, Ordering::Release);
            }
        }
    }

    /// Whether the scheduler thread has exited.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the thread to exit.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop gracefully and escalate to a forced stop after `timeout`. If the
    /// thread is still busy after a second `timeout` it is detached and the
    /// report says `TimedOut`. Never waits longer than twice `timeout`.
    pub fn shutdown(self, timeout: Duration) -> SchedulerReport {
        self.stop(ShutdownMode::Graceful);
        if self.wait(timeout) {
            return self.join();
        }

        tracing::warn!(
            graph = %self.graph,
            timeout_ms = timeout.as_millis() as u64,
            "Graceful shutdown timed out, forcing"
        );
        self.stop(ShutdownMode::Forced);
        if self.wait(timeout) {
            return self.join();
        }

        tracing::error!(
            graph = %self.graph,
            "Scheduler did not stop in time, abandoning its thread"
        );
        SchedulerReport {
            graph: self.graph,
            outcome: GraphOutcome::TimedOut,
            stats: SchedulerStats::default(),
        }
    }

    /// Block until the scheduler thread exits and return its report.
    pub fn join(self) -> SchedulerReport {
        let graph = self.graph;
        self.join.join().unwrap_or_else(|_| {
            tracing::error!(graph = %graph, "Scheduler thread panicked");
            SchedulerReport {
                graph,
                outcome: GraphOutcome::Panicked,
                stats: SchedulerStats::default(),
            }
        })
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("graph", &self.graph)
            .field("finished", &self.is_finished())
            .finish()
    }
}
