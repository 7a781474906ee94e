//! Per-frame controller
//!
//! The controller owns the worker pool and the frame source. For every
//! frame-ready event it runs one cycle on the calling thread:
//!
//! ```text
//! t0  frame ready
//!     pool.step(frame)   submit to head, rotate, collect from new head
//! t1  (after submit)
//! t2  (after collect)
//!     callback(frame, pose)
//! t3  callback returned -> Diagnostics
//! ```
//!
//! The pose handed to the callback belongs to a frame `depth` cycles older
//! than the one it is paired with. [`PipelineController::last_origin`] tells
//! which.

use crate::backend::EngineLoader;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::pipeline::diagnostics::{Diagnostics, TimingRecord, TimingSummary};
use crate::pipeline::pool::WorkerPool;
use crate::source::{noise_frame, FrameSource};
use crate::types::{Frame, FrameOrigin, FrameShape, Pose};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often `run` re-checks the stop flag while no frame arrives
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Seed of the random warm-up frame
const WARMUP_SEED: u64 = 0x5EED;

/// User callback, called with each frame and the pose collected in the same cycle
pub type PoseCallback = Box<dyn FnMut(&Frame, &Pose) + Send>;

/// Drives frames from a source through a worker pool
pub struct PipelineController {
    pool: WorkerPool,
    source: Box<dyn FrameSource>,
    frames: Option<Receiver<Frame>>,
    callback: PoseCallback,
    diagnostics: Diagnostics,
    running: Arc<AtomicBool>,
    frames_handled: u64,
    last_origin: Option<FrameOrigin>,
    last_device: Option<u32>,
    terminated: bool,
}

impl PipelineController {
    pub fn new(
        pool: WorkerPool,
        source: Box<dyn FrameSource>,
        callback: PoseCallback,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            pool,
            source,
            frames: None,
            callback,
            diagnostics,
            running: Arc::new(AtomicBool::new(false)),
            frames_handled: 0,
            last_origin: None,
            last_device: None,
            terminated: false,
        }
    }

    /// Spawn the configured workers, seed them with a random frame of the
    /// source's output size and wire up the controller
    pub fn from_config(
        config: &PipelineConfig,
        loader: Arc<dyn EngineLoader>,
        source: Box<dyn FrameSource>,
        callback: PoseCallback,
    ) -> Result<Self> {
        config.validate()?;

        let shape = source.output_shape();
        let warmup = noise_frame(FrameShape::rgb(shape.height, shape.width), WARMUP_SEED);
        let pool = WorkerPool::spawn(config, loader, &warmup).context("Failed to start workers")?;

        Ok(Self::new(
            pool,
            source,
            callback,
            Diagnostics::new(config.diagnostics.capacity),
        ))
    }

    /// Start the frame source
    pub fn start(&mut self) -> Result<()> {
        if self.terminated {
            return Err(PipelineError::Source(
                "pipeline is terminated".to_string(),
            ));
        }
        if self.frames.is_some() {
            return Ok(());
        }
        let rx = self.source.start().context("Failed to start frame source")?;
        self.frames = Some(rx);
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Pipeline started with {} workers (depth {})",
            self.pool.len(),
            self.pool.depth()
        );
        Ok(())
    }

    /// Run one cycle for `frame`
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<()> {
        let frame_ready = Instant::now();

        let step = self.pool.step(frame)?;
        (self.callback)(frame, step.pose);
        let callback_done = Instant::now();

        self.last_origin = Some(step.origin);
        self.last_device = Some(step.device_id);
        self.diagnostics.record(TimingRecord {
            frame_ready,
            submitted: step.submitted_at,
            collected: step.collected_at,
            callback_done,
        });
        self.frames_handled += 1;
        Ok(())
    }

    /// Handle frames until the source ends or the stop handle is cleared
    ///
    /// Returns the number of frames handled by this call. The stop handle is
    /// cleared when the source ends.
    pub fn run(&mut self) -> Result<u64> {
        self.run_until(None)
    }

    /// Like [`run`](Self::run), returning at the latest after `duration`
    pub fn run_for(&mut self, duration: Duration) -> Result<u64> {
        self.run_until(Some(Instant::now() + duration))
    }

    pub fn run_until(&mut self, deadline: Option<Instant>) -> Result<u64> {
        if self.terminated {
            return Ok(0);
        }
        self.start()?;
        let Some(rx) = self.frames.clone() else {
            return Ok(0);
        };

        let handled_before = self.frames_handled;
        while self.running.load(Ordering::SeqCst) {
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };

            match rx.recv_timeout(timeout) {
                Ok(frame) => {
                    if let Err(e) = self.handle_frame(&frame) {
                        tracing::error!("Frame {} failed: {}", self.frames_handled, e);
                        return Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("Frame source ended");
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        Ok(self.frames_handled - handled_before)
    }

    /// Clearing the returned flag makes `run` return after the current cycle
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Stop the source, then terminate every worker. Idempotent; nothing is drained.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.running.store(false, Ordering::SeqCst);
        self.source.stop();
        self.frames = None;
        self.pool.terminate();
        tracing::info!(
            "Pipeline terminated after {} frames",
            self.frames_handled
        );
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Timing table of the last cycles, seconds since the controller was built
    pub fn times(&self) -> Vec<[f64; 4]> {
        self.diagnostics.rows()
    }

    pub fn summary(&self) -> Option<TimingSummary> {
        self.diagnostics.summary()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Write the timing table to `path`
    pub fn export_times(&self, path: impl AsRef<Path>, delimiter: char) -> Result<()> {
        self.diagnostics.export(path, delimiter)
    }

    /// Origin of the pose passed to the most recent callback
    pub fn last_origin(&self) -> Option<FrameOrigin> {
        self.last_origin
    }

    /// Device that produced the pose passed to the most recent callback
    pub fn last_device(&self) -> Option<u32> {
        self.last_device
    }

    pub fn frames_handled(&self) -> u64 {
        self.frames_handled
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.terminate();
    }
}
