//! Test data builders and scripted nodes

use chrono::{TimeZone, Utc};
use fluxgraph::pipeline::{
    Frame, FrameBuilder, FrameRef, Node, NodeContext, NodeError, NodeRegistry, NodeResult,
    PortDescriptor,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Three timestamps by two channels, with metadata.
pub fn eeg_frame() -> Frame {
    let mut b = FrameBuilder::new(["Fp1", "Fp2"])
        .meta("rate", 250)
        .meta("unit", "uV");
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    for (i, values) in [[1.5, -2.25], [3.0, 0.125], [-7.75, 42.0]].into_iter().enumerate() {
        let ts = base + chrono::Duration::microseconds(4_000 * i as i64 + 17);
        b.push_row(ts, values.to_vec()).unwrap();
    }
    b.build()
}

/// One-row frame carrying `value` on channel `x`.
pub fn value_frame(value: f64) -> Frame {
    let mut b = FrameBuilder::new(["x"]);
    b.push_row(Utc::now(), vec![value]).unwrap();
    b.build()
}

/// Shared view into what scripted nodes saw.
#[derive(Clone, Default)]
pub struct Tap {
    frames: Arc<Mutex<Vec<(u64, FrameRef)>>>,
    ticks: Arc<AtomicU64>,
    stops: Arc<Mutex<Vec<String>>>,
}

impl Tap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(tick, frame)` pairs received by collectors.
    pub fn frames(&self) -> Vec<(u64, FrameRef)> {
        self.frames.lock().clone()
    }

    /// Values of channel `x` received by collectors, with their tick.
    pub fn values(&self) -> Vec<(u64, f64)> {
        self.frames
            .lock()
            .iter()
            .flat_map(|(tick, frame)| {
                frame
                    .channel("x")
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |v| (*tick, v))
            })
            .collect()
    }

    /// Ticks seen by counters.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Node ids in the order their `stop` hooks ran.
    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().clone()
    }
}

static SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];
static SINK_PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];
static FILTER_PORTS: &[PortDescriptor] = &[PortDescriptor::input("in"), PortDescriptor::output("out")];

/// Emits the tick index on `x` every tick.
pub struct TickSource {
    tap: Tap,
}

impl Node for TickSource {
    fn ports(&self) -> &[PortDescriptor] {
        SOURCE_PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        self.tap.ticks.fetch_add(1, Ordering::Relaxed);
        ctx.emit("out", value_frame(ctx.tick as f64));
        Ok(())
    }

    fn stop(&mut self) -> NodeResult<()> {
        self.tap.stops.lock().push("tick_source".into());
        Ok(())
    }
}

/// Emits the same frame every tick.
pub struct Repeater {
    frame: FrameRef,
}

impl Node for Repeater {
    fn ports(&self) -> &[PortDescriptor] {
        SOURCE_PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        ctx.emit("out", Arc::clone(&self.frame));
        Ok(())
    }
}

/// Records every received frame with the tick it arrived on.
pub struct Collector {
    tap: Tap,
}

impl Node for Collector {
    fn ports(&self) -> &[PortDescriptor] {
        SINK_PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        let mut frames = self.tap.frames.lock();
        for frame in ctx.input("in") {
            frames.push((ctx.tick, Arc::clone(frame)));
        }
        Ok(())
    }

    fn stop(&mut self) -> NodeResult<()> {
        self.tap.stops.lock().push("collector".into());
        Ok(())
    }
}

/// Fails every tick.
pub struct Faulty;

impl Node for Faulty {
    fn ports(&self) -> &[PortDescriptor] {
        FILTER_PORTS
    }

    fn tick(&mut self, _ctx: &mut NodeContext) -> NodeResult<()> {
        Err(NodeError::runtime("sensor glitch"))
    }
}

/// Sink whose `stop` hook blocks for a long time.
pub struct StuckOnStop;

/// How long `StuckOnStop::stop` blocks.
pub const STUCK_STOP_DELAY: std::time::Duration = std::time::Duration::from_secs(3);

impl Node for StuckOnStop {
    fn ports(&self) -> &[PortDescriptor] {
        SINK_PORTS
    }

    fn stop(&mut self) -> NodeResult<()> {
        std::thread::sleep(STUCK_STOP_DELAY);
        Ok(())
    }
}

/// Registry with the passthrough node plus the scripted ones, all reporting
/// to `tap`.
pub fn test_registry(tap: &Tap) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("passthrough", || Box::new(fluxgraph::nodes::PassthroughNode::new()));
    add_test_nodes(&mut registry, tap);
    registry
}

/// Register the scripted nodes on an existing registry.
pub fn add_test_nodes(registry: &mut NodeRegistry, tap: &Tap) {
    let source_tap = tap.clone();
    let collector_tap = tap.clone();
    let eeg = eeg_frame().into_shared();
    registry
        .register("tick_source", move || {
            Box::new(TickSource {
                tap: source_tap.clone(),
            })
        })
        .register("collector", move || {
            Box::new(Collector {
                tap: collector_tap.clone(),
            })
        })
        .register("repeater", move || {
            Box::new(Repeater {
                frame: Arc::clone(&eeg),
            })
        })
        .register("faulty", || Box::new(Faulty))
        .register("stuck_on_stop", || Box::new(StuckOnStop));
}
