//! InferenceEngine trait for a unified accelerator interface
//!
//! This module provides the boundary to the accelerator runtime. A worker
//! context owns exactly one engine, created on the worker's own thread through
//! an [`EngineLoader`], so both real runtimes and mock engines for testing
//! plug into the same worker loop.

use crate::error::Result;
use crate::types::{FrameShape, Pose};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Size of the rolling window for recent inference times
const RECENT_WINDOW_SIZE: usize = 100;

/// A loaded model bound to one accelerator device
///
/// Implementations must be `Send` so they can be created on, and moved into,
/// the worker thread. They are never shared: one engine per worker context.
pub trait InferenceEngine: Send {
    /// Input tensor shape (height, width, 3)
    fn input_shape(&self) -> FrameShape;

    /// Run one inference
    ///
    /// `input` holds exactly `input_shape().len()` RGB bytes. The engine
    /// writes the 17 keypoints into `output`. Blocks until the accelerator
    /// has finished.
    fn invoke(&mut self, input: &[u8], output: &mut Pose) -> Result<()>;

    /// Short name used in log messages
    fn name(&self) -> &str {
        "engine"
    }
}

/// Creates engines for worker contexts
///
/// `load` runs on the worker thread itself. A failure is fatal for that
/// worker and is reported synchronously from `WorkerContext::create`.
pub trait EngineLoader: Send + Sync {
    /// Load `model_path` onto accelerator `device_id`
    fn load(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn InferenceEngine>>;
}

/// Statistics for the inferences run by one worker
///
/// Updated by the controller side whenever a result is collected.
#[derive(Debug, Clone)]
pub struct InferenceStats {
    /// Number of inferences that completed successfully
    pub completed: u64,
    /// Number of inferences the engine reported as failed
    pub failed: u64,
    /// Total inference time in microseconds
    pub total_time_us: u64,
    /// Last inference time in microseconds
    pub last_time_us: u64,
    /// Minimum inference time observed (microseconds)
    pub min_time_us: u64,
    /// Maximum inference time observed (microseconds)
    pub max_time_us: u64,
    /// Rolling window of recent inference times for jitter calculation
    pub recent_times: VecDeque<u64>,
}

impl Default for InferenceStats {
    fn default() -> Self {
        Self {
            completed: 0,
            failed: 0,
            total_time_us: 0,
            last_time_us: 0,
            min_time_us: u64::MAX,
            max_time_us: 0,
            recent_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl InferenceStats {
    /// Average inference time in microseconds
    pub fn avg_time_us(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.completed as f64
        }
    }

    /// Record a completed inference
    pub fn record_success(&mut self, elapsed: Duration) {
        let time_us = elapsed.as_micros() as u64;
        self.completed += 1;
        self.total_time_us += time_us;
        self.last_time_us = time_us;
        self.min_time_us = self.min_time_us.min(time_us);
        self.max_time_us = self.max_time_us.max(time_us);

        self.recent_times.push_back(time_us);
        if self.recent_times.len() > RECENT_WINDOW_SIZE {
            self.recent_times.pop_front();
        }
    }

    /// Record a failed inference
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Jitter (max - min) over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }
}
