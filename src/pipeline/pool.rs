//! Round-robin worker pool
//!
//! The pool keeps its workers in a fixed-length array with an explicit head
//! index. Each [`WorkerPool::step`] submits the new frame to the head, rotates
//! the head to the tail and collects from the new head: the worker that
//! received a frame N−1 steps earlier. With N workers up to N−1 inferences
//! overlap the acquisition of the next frames.
//!
//! ```text
//! step(f3), N = 3
//!
//!   head                      head
//!    v                         v
//!  [w0 idle, w1 f1, w2 f2]  -> [w0 f3, w1 f1, w2 f2] -> collect w1 -> pose(f1)
//! ```
//!
//! At construction every worker is seeded with a warm-up frame and the head's
//! warm-up result is collected again immediately, so the steady state "every
//! worker but the head has a result pending" holds from the first step on.
//! The first N−1 steps therefore return warm-up poses, tagged
//! [`FrameOrigin::WarmUp`].

use crate::backend::{EngineLoader, InferenceStats, WorkerContext};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::types::{Frame, FrameOrigin, Pose};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one [`WorkerPool::step`]
#[derive(Debug, Clone, Copy)]
pub struct StepResult<'a> {
    /// Pose collected from the new head, valid until the next step
    pub pose: &'a Pose,
    /// Which frame the pose was computed from
    pub origin: FrameOrigin,
    /// Device that produced the pose
    pub device_id: u32,
    /// After the frame was handed to the old head
    pub submitted_at: Instant,
    /// After the pose was collected from the new head
    pub collected_at: Instant,
}

/// Fixed set of workers used in rotation
pub struct WorkerPool {
    workers: Box<[WorkerContext]>,
    head: usize,
    steps: u64,
    terminated: bool,
}

impl WorkerPool {
    /// Build a pool from ready workers, in the given rotation order
    pub fn new(workers: Vec<WorkerContext>, warmup: &Frame) -> Result<Self> {
        if workers.is_empty() {
            return Err(PipelineError::Config(
                "a worker pool needs at least one worker".to_string(),
            ));
        }

        let mut workers = workers.into_boxed_slice();
        for worker in workers.iter_mut() {
            let device_id = worker.device_id();
            worker
                .submit_as(warmup, FrameOrigin::WarmUp)
                .with_context(|| format!("seeding worker {} with the warm-up frame", device_id))?;
        }

        // The head must be idle before the first step
        let head_device = workers[0].device_id();
        workers[0]
            .collect_tagged()
            .map(|_| ())
            .with_context(|| format!("collecting warm-up from worker {}", head_device))?;

        tracing::info!(
            "Worker pool ready: {} workers, pipeline depth {}",
            workers.len(),
            workers.len() - 1
        );

        Ok(Self {
            workers,
            head: 0,
            steps: 0,
            terminated: false,
        })
    }

    /// Create one worker per configured device and build the pool
    ///
    /// Workers are created one after another; the first failure aborts and
    /// the workers created so far are terminated.
    pub fn spawn(
        config: &PipelineConfig,
        loader: Arc<dyn EngineLoader>,
        warmup: &Frame,
    ) -> Result<Self> {
        let workers = config
            .workers
            .iter()
            .map(|w| WorkerContext::create(&config.model_path, w.device_id, &w.context, loader.clone()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(workers, warmup)
    }

    /// Submit `frame` to the head, rotate, collect from the new head
    ///
    /// Blocks until the new head's inference has finished.
    pub fn step(&mut self, frame: &Frame) -> Result<StepResult<'_>> {
        if self.terminated {
            return Err(PipelineError::Terminated {
                device_id: self.workers[self.head].device_id(),
            });
        }

        let origin = FrameOrigin::Frame(self.steps);
        self.workers[self.head].submit_as(frame, origin)?;
        self.steps += 1;
        let submitted_at = Instant::now();

        self.head = (self.head + 1) % self.workers.len();

        let worker = &mut self.workers[self.head];
        let device_id = worker.device_id();
        let (origin, pose) = worker.collect_tagged()?;
        let collected_at = Instant::now();

        Ok(StepResult {
            pose,
            origin,
            device_id,
            submitted_at,
            collected_at,
        })
    }

    /// Terminate every worker. Idempotent; pending results are abandoned.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        for worker in self.workers.iter_mut() {
            worker.terminate();
        }
        tracing::info!("Worker pool terminated after {} steps", self.steps);
    }

    /// True once every worker thread has finished
    pub fn has_exited(&self) -> bool {
        self.workers.iter().all(|w| w.has_exited())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of steps between submitting a frame and getting its pose back
    pub fn depth(&self) -> usize {
        self.workers.len() - 1
    }

    /// Number of completed submissions
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Device ids in rotation order, starting at the head
    pub fn order(&self) -> Vec<u32> {
        self.rotation().map(|w| w.device_id()).collect()
    }

    /// Per-device inference statistics in rotation order
    pub fn stats(&self) -> Vec<(u32, &InferenceStats)> {
        self.rotation().map(|w| (w.device_id(), w.stats())).collect()
    }

    fn rotation(&self) -> impl Iterator<Item = &WorkerContext> {
        let (front, back) = self.workers.split_at(self.head);
        back.iter().chain(front.iter())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("order", &self.order())
            .field("steps", &self.steps)
            .field("terminated", &self.terminated)
            .finish()
    }
}
