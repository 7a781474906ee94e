//! Per-frame timing diagnostics
//!
//! Every controller cycle records four monotonic timestamps:
//!
//! 1. `t0` - frame-ready event received
//! 2. `t1` - frame handed to a worker
//! 3. `t2` - pose collected from the next worker
//! 4. `t3` - user callback returned
//!
//! The records live in a fixed-capacity ring; the oldest record is evicted
//! when a new one arrives at capacity.

use crate::config::DEFAULT_TIMING_CAPACITY;
use crate::error::{PipelineError, Result, ResultExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// Timestamps of one controller cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRecord {
    pub frame_ready: Instant,
    pub submitted: Instant,
    pub collected: Instant,
    pub callback_done: Instant,
}

impl TimingRecord {
    /// Time spent blocked in `collect`
    pub fn wait(&self) -> Duration {
        self.collected.saturating_duration_since(self.submitted)
    }

    /// Time spent in the user callback
    pub fn callback(&self) -> Duration {
        self.callback_done.saturating_duration_since(self.collected)
    }

    /// Whole cycle
    pub fn total(&self) -> Duration {
        self.callback_done.saturating_duration_since(self.frame_ready)
    }

    fn as_array(&self) -> [Instant; 4] {
        [
            self.frame_ready,
            self.submitted,
            self.collected,
            self.callback_done,
        ]
    }
}

/// Aggregate over the records currently in the ring
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSummary {
    /// Records the summary is computed from
    pub frames: usize,
    /// Mean time between consecutive frame-ready events
    pub avg_period: Duration,
    /// `1 / avg_period`
    pub fps: f64,
    /// Longest time between consecutive frame-ready events
    pub max_period: Duration,
    /// Mean time blocked waiting for a worker
    pub avg_wait: Duration,
    /// Mean time spent in the callback
    pub avg_callback: Duration,
}

impl std::fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames processed with average time {:.6}s (-> {:.1} fps) and maximum time {:.6}s",
            self.frames,
            self.avg_period.as_secs_f64(),
            self.fps,
            self.max_period.as_secs_f64()
        )
    }
}

/// Bounded ring of timing records
#[derive(Debug, Clone)]
pub struct Diagnostics {
    records: VecDeque<TimingRecord>,
    capacity: usize,
    /// Zero point for exported timestamps
    epoch: Instant,
    /// Records pushed since creation, including evicted ones
    total: u64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_TIMING_CAPACITY)
    }
}

impl Diagnostics {
    /// Ring holding at most `capacity` records (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            epoch: Instant::now(),
            total: 0,
        }
    }

    pub fn record(&mut self, record: TimingRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records pushed over the whole run
    pub fn total_recorded(&self) -> u64 {
        self.total
    }

    /// Oldest first
    pub fn records(&self) -> impl Iterator<Item = &TimingRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records as seconds since the ring was created, oldest first
    pub fn rows(&self) -> Vec<[f64; 4]> {
        self.records
            .iter()
            .map(|record| {
                record
                    .as_array()
                    .map(|t| t.saturating_duration_since(self.epoch).as_secs_f64())
            })
            .collect()
    }

    /// Summary over the current records, `None` with fewer than two
    pub fn summary(&self) -> Option<TimingSummary> {
        let n = self.records.len();
        if n < 2 {
            return None;
        }
        let first = self.records.front()?;
        let last = self.records.back()?;

        let span = last.frame_ready.saturating_duration_since(first.frame_ready);
        let avg_period = span / (n as u32 - 1);
        let max_period = self
            .records
            .iter()
            .zip(self.records.iter().skip(1))
            .map(|(a, b)| b.frame_ready.saturating_duration_since(a.frame_ready))
            .max()
            .unwrap_or_default();

        let avg_wait = self.records.iter().map(TimingRecord::wait).sum::<Duration>() / n as u32;
        let avg_callback =
            self.records.iter().map(TimingRecord::callback).sum::<Duration>() / n as u32;

        let secs = avg_period.as_secs_f64();
        Some(TimingSummary {
            frames: n,
            avg_period,
            fps: if secs > 0.0 { 1.0 / secs } else { 0.0 },
            max_period,
            avg_wait,
            avg_callback,
        })
    }

    /// Write the records as a delimited table, one row per cycle
    pub fn write_table<W: Write>(&self, mut writer: W, delimiter: char) -> Result<()> {
        for row in self.rows() {
            let line = row
                .iter()
                .map(|v| format!("{:.9}", v))
                .collect::<Vec<_>>()
                .join(&delimiter.to_string());
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the table to `path`
    pub fn export(&self, path: impl AsRef<Path>, delimiter: char) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(PipelineError::from)
            .with_context(|| format!("Failed to create {:?}", path))?;
        self.write_table(std::io::BufWriter::new(file), delimiter)
            .with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!("Exported {} timing records to {:?}", self.len(), path);
        Ok(())
    }
}
