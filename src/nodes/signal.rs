//! SignalNode: synthetic multichannel source.
//!
//! Behaves like an acquisition driver sampling at a fixed rate: every tick it
//! emits the samples that became due since the previous tick, stamped with the
//! wall-clock time at which they were nominally taken. Each channel carries a
//! sine wave, phase-shifted per channel so the traces are distinguishable.

use crate::pipeline::frame::FrameBuilder;
use crate::pipeline::node::{Node, NodeContext, NodeError, NodeResult};
use crate::pipeline::params::{ParamValue, Params};
use crate::pipeline::port::PortDescriptor;
use chrono::{DateTime, Utc};
use std::f64::consts::{PI, TAU};
use std::time::Duration;

static PORTS: &[PortDescriptor] = &[PortDescriptor::output("out")];

const DEFAULT_SAMPLE_RATE: f64 = 250.0;
const DEFAULT_CHANNELS: usize = 8;
const DEFAULT_FREQUENCY: f64 = 10.0;

/// Longest backlog emitted in one tick; older samples are skipped after a stall.
const MAX_BACKLOG: Duration = Duration::from_secs(1);

pub struct SignalNode {
    sample_rate: f64,
    channels: Vec<String>,
    frequency: f64,
    amplitude: f64,
    /// Wall clock and scheduler clock at the first tick.
    origin: Option<(DateTime<Utc>, Duration)>,
    /// Index of the next sample to emit.
    next_sample: u64,
}

impl SignalNode {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: default_channels(DEFAULT_CHANNELS),
            frequency: DEFAULT_FREQUENCY,
            amplitude: 1.0,
            origin: None,
            next_sample: 0,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    fn sample_time(&self, origin: DateTime<Utc>, index: u64) -> DateTime<Utc> {
        let offset_ns = (index as f64 * 1e9 / self.sample_rate).round() as i64;
        origin + chrono::Duration::nanoseconds(offset_ns)
    }

    fn sample(&self, index: u64) -> Vec<f64> {
        let t = index as f64 / self.sample_rate;
        let width = self.channels.len().max(1) as f64;
        (0..self.channels.len())
            .map(|ch| self.amplitude * (TAU * self.frequency * t + ch as f64 * PI / width).sin())
            .collect()
    }
}

impl Default for SignalNode {
    fn default() -> Self {
        Self::new()
    }
}

fn default_channels(count: usize) -> Vec<String> {
    (1..=count).map(|i| i.to_string()).collect()
}

impl Node for SignalNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn configure(&mut self, params: &Params) -> NodeResult<()> {
        self.sample_rate = params.float_or("rate", DEFAULT_SAMPLE_RATE)?;
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(NodeError::Config(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }

        self.channels = match params.get("channels") {
            Some(ParamValue::Int(count)) if *count > 0 => default_channels(*count as usize),
            Some(ParamValue::Int(count)) => {
                return Err(NodeError::Config(format!(
                    "channel count must be positive, got {count}"
                )))
            }
            _ => params
                .string_list("channels")?
                .unwrap_or_else(|| default_channels(DEFAULT_CHANNELS)),
        };
        if self.channels.is_empty() {
            return Err(NodeError::Config("at least one channel is required".into()));
        }

        self.frequency = params.float_or("frequency", DEFAULT_FREQUENCY)?;
        self.amplitude = params.float_or("amplitude", 1.0)?;
        Ok(())
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        let (origin, origin_elapsed) = *self.origin.get_or_insert((ctx.now, ctx.elapsed));
        let since = ctx.elapsed.saturating_sub(origin_elapsed).as_secs_f64();
        let due = (since * self.sample_rate).floor() as u64 + 1;

        let max_backlog = (MAX_BACKLOG.as_secs_f64() * self.sample_rate).ceil() as u64;
        if due.saturating_sub(self.next_sample) > max_backlog {
            tracing::warn!(
                graph = ctx.graph,
                node = ctx.node,
                skipped = due - max_backlog - self.next_sample,
                "Signal source fell behind, skipping samples"
            );
            self.next_sample = due - max_backlog;
        }
        if due <= self.next_sample {
            return Ok(());
        }

        let mut builder = FrameBuilder::new(self.channels.iter().cloned())
            .with_capacity((due - self.next_sample) as usize)
            .meta("rate", self.sample_rate);
        for index in self.next_sample..due {
            builder.push_row(self.sample_time(origin, index), self.sample(index))?;
        }
        self.next_sample = due;

        ctx.emit("out", builder.build());
        Ok(())
    }
}
