//! Benchmarks for the per-tick hot path: routing frames along edges and
//! merging queued frames.
//!
//! Run with: cargo bench

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fluxgraph::config::SchedulerConfig;
use fluxgraph::graph::{GraphDefinition, GraphLoader};
use fluxgraph::pipeline::{
    Frame, FrameBuilder, FrameRef, Node, NodeContext, NodeRegistry, NodeResult, Params,
    PortDescriptor, Scheduler,
};
use std::sync::Arc;

static SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];
static SINK_PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];

fn make_frame(rows: usize, channels: usize) -> Frame {
    let names: Vec<String> = (0..channels).map(|c| format!("ch{c}")).collect();
    let mut b = FrameBuilder::new(names).with_capacity(rows);
    let base = Utc::now();
    for i in 0..rows {
        let values = (0..channels).map(|c| (i * channels + c) as f64).collect();
        b.push_row(base + ChronoDuration::microseconds(i as i64 * 4_000), values)
            .unwrap();
    }
    b.build()
}

struct Source {
    frame: FrameRef,
}

impl Node for Source {
    fn ports(&self) -> &[PortDescriptor] {
        SOURCE_PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        ctx.emit("out", Arc::clone(&self.frame));
        Ok(())
    }
}

struct Sink;

impl Node for Sink {
    fn ports(&self) -> &[PortDescriptor] {
        SINK_PORTS
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        black_box(ctx.input("in").len());
        Ok(())
    }
}

fn fan_out_scheduler(fan_out: usize) -> Scheduler {
    let frame = make_frame(32, 8).into_shared();
    let mut registry = NodeRegistry::new();
    registry
        .register("source", move || {
            Box::new(Source {
                frame: Arc::clone(&frame),
            })
        })
        .register("sink", || Box::new(Sink));

    let mut definition = GraphDefinition::new("bench", 1000.0).node("src", "source", Params::default());
    for i in 0..fan_out {
        let id = format!("sink{i}");
        definition = definition
            .node(id.as_str(), "sink", Params::default())
            .edge("src", &id);
    }

    let graph = GraphLoader::default().load(definition, &registry).unwrap();
    let mut scheduler = Scheduler::new(graph, SchedulerConfig::default());
    scheduler.configure_all().unwrap();
    scheduler.start_all().unwrap();
    scheduler
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_fan_out");

    for fan_out in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*fan_out as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fan_out), fan_out, |b, &fan_out| {
            let mut scheduler = fan_out_scheduler(fan_out);
            b.iter(|| black_box(scheduler.step()));
        });
    }

    group.finish();
}

fn bench_concat(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_concat");

    for count in [2, 16, 128].iter() {
        let frames: Vec<FrameRef> = (0..*count).map(|_| make_frame(32, 8).into_shared()).collect();
        group.throughput(Throughput::Elements(*count as u64 * 32));
        group.bench_with_input(BenchmarkId::from_parameter(count), &frames, |b, frames| {
            b.iter(|| black_box(Frame::concat(black_box(frames)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_concat);
criterion_main!(benches);
