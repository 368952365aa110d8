//! Frames: the unit of data moved between nodes.
//!
//! A `Frame` is an ordered batch of timestamped rows over a fixed list of named
//! channels, plus a free-form metadata mapping. Frames are immutable once built;
//! the runtime shares them between consumers as `FrameRef` (an `Arc<Frame>`), so
//! fanning out along several edges never copies sample data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Shared, immutable handle to a frame.
pub type FrameRef = Arc<Frame>;

/// Metadata attached to a frame (e.g. `{"rate": 250}`).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Shape errors raised when constructing or combining frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("frame has {timestamps} timestamps but {rows} rows")]
    LengthMismatch { timestamps: usize, rows: usize },

    #[error("row {row} has {width} values, expected {expected} (one per channel)")]
    RowWidth {
        row: usize,
        width: usize,
        expected: usize,
    },

    #[error("cannot concatenate frames with different channels: {left:?} vs {right:?}")]
    ChannelMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
}

/// Immutable, timestamped batch of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameParts")]
pub struct Frame {
    timestamps: Vec<DateTime<Utc>>,
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(default)]
    meta: Metadata,
}

/// Unvalidated wire shape of a frame; decoding goes through `Frame::new`.
#[derive(Deserialize)]
struct FrameParts {
    timestamps: Vec<DateTime<Utc>>,
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(default)]
    meta: Metadata,
}

impl TryFrom<FrameParts> for Frame {
    type Error = FrameError;

    fn try_from(parts: FrameParts) -> Result<Self, Self::Error> {
        Frame::new(parts.timestamps, parts.channels, parts.rows, parts.meta)
    }
}

impl Frame {
    /// Build a frame, checking that there is one row per timestamp and one value
    /// per channel in every row.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        channels: Vec<String>,
        rows: Vec<Vec<f64>>,
        meta: Metadata,
    ) -> Result<Self, FrameError> {
        if timestamps.len() != rows.len() {
            return Err(FrameError::LengthMismatch {
                timestamps: timestamps.len(),
                rows: rows.len(),
            });
        }
        for (row, values) in rows.iter().enumerate() {
            if values.len() != channels.len() {
                return Err(FrameError::RowWidth {
                    row,
                    width: values.len(),
                    expected: channels.len(),
                });
            }
        }
        Ok(Self {
            timestamps,
            channels,
            rows,
            meta,
        })
    }

    /// A frame with channels but no rows.
    pub fn empty(channels: Vec<String>) -> Self {
        Self {
            timestamps: Vec::new(),
            channels,
            rows: Vec::new(),
            meta: Metadata::new(),
        }
    }

    /// Convert into a shared handle.
    pub fn into_shared(self) -> FrameRef {
        Arc::new(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of channels (columns).
    #[inline]
    pub fn width(&self) -> usize {
        self.channels.len()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn row(&self, index: usize) -> Option<(&DateTime<Utc>, &[f64])> {
        Some((self.timestamps.get(index)?, self.rows.get(index)?.as_slice()))
    }

    /// Iterate `(timestamp, row)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &[f64])> {
        self.timestamps
            .iter()
            .zip(self.rows.iter().map(|r| r.as_slice()))
    }

    /// Column view of a single channel.
    pub fn channel(&self, name: &str) -> Option<Vec<f64>> {
        let col = self.channels.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[col]).collect())
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Concatenate frames in order into one frame.
    ///
    /// Frames without rows are skipped; the remaining frames must share the same
    /// channel list. Metadata is merged with later frames overriding earlier keys.
    /// Returns `Ok(None)` when `frames` is empty.
    pub fn concat(frames: &[FrameRef]) -> Result<Option<Frame>, FrameError> {
        let Some(first) = frames.iter().find(|f| !f.is_empty()).or(frames.first()) else {
            return Ok(None);
        };

        let total: usize = frames.iter().map(|f| f.len()).sum();
        let mut timestamps = Vec::with_capacity(total);
        let mut rows = Vec::with_capacity(total);
        let mut meta = Metadata::new();

        for frame in frames {
            meta.extend(frame.meta.iter().map(|(k, v)| (k.clone(), v.clone())));
            if frame.is_empty() {
                continue;
            }
            if frame.channels != first.channels {
                return Err(FrameError::ChannelMismatch {
                    left: first.channels.clone(),
                    right: frame.channels.clone(),
                });
            }
            timestamps.extend_from_slice(&frame.timestamps);
            rows.extend(frame.rows.iter().cloned());
        }

        Ok(Some(Frame {
            timestamps,
            channels: first.channels.clone(),
            rows,
            meta,
        }))
    }
}

/// Incremental frame construction, one row at a time.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    timestamps: Vec<DateTime<Utc>>,
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
    meta: Metadata,
}

impl FrameBuilder {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamps: Vec::new(),
            channels: channels.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            meta: Metadata::new(),
        }
    }

    pub fn with_capacity(mut self, rows: usize) -> Self {
        self.timestamps.reserve(rows);
        self.rows.reserve(rows);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Append one row. The row must hold one value per channel.
    pub fn push_row(&mut self, timestamp: DateTime<Utc>, values: Vec<f64>) -> Result<(), FrameError> {
        if values.len() != self.channels.len() {
            return Err(FrameError::RowWidth {
                row: self.rows.len(),
                width: values.len(),
                expected: self.channels.len(),
            });
        }
        self.timestamps.push(timestamp);
        self.rows.push(values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn build(self) -> Frame {
        Frame {
            timestamps: self.timestamps,
            channels: self.channels,
            rows: self.rows,
            meta: self.meta,
        }
    }
}
