//! RecorderNode: appends frames to a CSV file.
//!
//! Rows go to `<path>/<stream>.csv`, one line per timestamp with a
//! `timestamp,<channels...>` header. Fields are quoted as needed, so channel
//! names may contain separators. Appending to an existing non-empty file
//! keeps its header. The channel layout is fixed by the first frame written;
//! a frame with a different layout fails the tick and is not written.

use crate::pipeline::node::{Node, NodeContext, NodeError, NodeResult};
use crate::pipeline::params::Params;
use crate::pipeline::port::PortDescriptor;
use chrono::SecondsFormat;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::PathBuf;

static PORTS: &[PortDescriptor] = &[PortDescriptor::input("in")];

const DEFAULT_STREAM: &str = "stream";

pub struct RecorderNode {
    file_path: PathBuf,
    writer: Option<csv::Writer<BufWriter<File>>>,
    header_written: bool,
    /// Channel layout fixed by the first frame.
    columns: Option<Vec<String>>,
    rows_written: u64,
}

impl RecorderNode {
    pub fn new() -> Self {
        Self {
            file_path: PathBuf::new(),
            writer: None,
            header_written: false,
            columns: None,
            rows_written: 0,
        }
    }

    pub fn file_path(&self) -> &std::path::Path {
        &self.file_path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl Default for RecorderNode {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(action: &str, path: &std::path::Path, e: impl std::fmt::Display) -> NodeError {
    NodeError::runtime(format!("failed to {} {}: {}", action, path.display(), e))
}

impl Node for RecorderNode {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn configure(&mut self, params: &Params) -> NodeResult<()> {
        let dir = params.require_str("path")?;
        let stream = params.str_or("stream", DEFAULT_STREAM)?;
        if stream.is_empty() || stream.contains(['/', '\\']) {
            return Err(NodeError::Config(format!("invalid stream name `{stream}`")));
        }
        self.file_path = PathBuf::from(dir).join(format!("{stream}.csv"));
        Ok(())
    }

    fn start(&mut self) -> NodeResult<()> {
        if let Some(dir) = self.file_path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error("create", dir, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| io_error("open", &self.file_path, e))?;
        let existing = file
            .metadata()
            .map_err(|e| io_error("inspect", &self.file_path, e))?
            .len();
        self.header_written = existing > 0;
        self.writer = Some(
            csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(BufWriter::new(file)),
        );
        tracing::debug!(path = %self.file_path.display(), "Recorder opened");
        Ok(())
    }

    fn tick(&mut self, ctx: &mut NodeContext) -> NodeResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(NodeError::runtime("recorder is not open"));
        };

        for frame in ctx.input("in") {
            match &self.columns {
                Some(columns) if columns.as_slice() != frame.channels() => {
                    return Err(NodeError::runtime(format!(
                        "channel layout changed from {:?} to {:?}",
                        columns,
                        frame.channels()
                    )));
                }
                Some(_) => {}
                None => {
                    if !self.header_written {
                        let header = std::iter::once("timestamp")
                            .chain(frame.channels().iter().map(String::as_str));
                        writer
                            .write_record(header)
                            .map_err(|e| io_error("write", &self.file_path, e))?;
                        self.header_written = true;
                    }
                    self.columns = Some(frame.channels().to_vec());
                }
            }

            for (timestamp, values) in frame.iter() {
                let record = std::iter::once(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
                    .chain(values.iter().map(f64::to_string));
                writer
                    .write_record(record)
                    .map_err(|e| io_error("write", &self.file_path, e))?;
                self.rows_written += 1;
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> NodeResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| io_error("flush", &self.file_path, e))?;
            tracing::info!(path = %self.file_path.display(), rows = self.rows_written, "Recorder closed");
        }
        Ok(())
    }
}
