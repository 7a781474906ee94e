//! Worker Context Implementation
//!
//! A [`WorkerContext`] runs one inference engine on its own OS thread, bound
//! to one accelerator device, and exchanges frames and poses with the
//! controller thread through a three-signal handshake:
//!
//! - **initReady**: the worker has applied its thread placement, loaded its
//!   engine and reported the engine's input shape (or the load error)
//! - **dataReady**: the input buffer holds a new frame
//! - **resultReady**: the output buffer holds the pose for that frame
//!
//! Each signal is a bounded(1) crossbeam channel. The input and output
//! buffers are allocated once at creation and travel with the signals as
//! owned boxes, so at any moment exactly one side holds them and no lock is
//! needed.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Initializing -> Idle <-> AwaitingResult
//!                    \          \          /
//!                     +----------+--> Terminated
//! ```
//!
//! Initialization failures never reach `Idle`: `create` returns the error
//! instead. `terminate` abandons an in-flight inference; the thread exits as
//! soon as the engine returns.
//!
//! # Known limitation
//!
//! `collect` has no timeout. An engine that hangs inside `invoke` blocks the
//! caller indefinitely. An engine that panics is detected through the closed
//! result channel and reported as [`PipelineError::WorkerLost`].

use crate::backend::engine_trait::{EngineLoader, InferenceEngine, InferenceStats};
use crate::backend::platform;
use crate::backend::preprocess::copy_into_input;
use crate::config::WorkerContextConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameOrigin, FrameShape, Pose};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle state of a worker context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Channels allocated, thread not yet started
    Created,
    /// Thread started, waiting for initReady
    Initializing,
    /// Ready for `submit`
    Idle,
    /// A frame was submitted and its result has not been collected
    AwaitingResult,
    /// Terminated by the caller (or the worker thread went away)
    Terminated,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Created => write!(f, "created"),
            WorkerState::Initializing => write!(f, "initializing"),
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::AwaitingResult => write!(f, "awaiting result"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Buffers handed to the worker on dataReady
struct Job {
    origin: FrameOrigin,
    input: Box<[u8]>,
    output: Box<Pose>,
}

/// Buffers handed back on resultReady
struct Completed {
    job: Job,
    outcome: Result<()>,
    elapsed: Duration,
}

/// One engine running on its own thread
pub struct WorkerContext {
    device_id: u32,
    model_path: PathBuf,
    input_shape: FrameShape,
    state: WorkerState,
    /// dataReady (None once terminated)
    data_tx: Option<Sender<Job>>,
    /// resultReady
    result_rx: Receiver<Completed>,
    /// Held here while Idle, with the worker while AwaitingResult
    input: Option<Box<[u8]>>,
    output: Option<Box<Pose>>,
    last_origin: Option<FrameOrigin>,
    submissions: u64,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    stats: InferenceStats,
}

impl WorkerContext {
    /// Spawn a worker bound to `device_id` and block until it is initialized
    ///
    /// The worker thread applies `config` (affinity, scheduling), then loads
    /// `model_path` through `loader`. A load failure is returned as
    /// [`PipelineError::InitFailed`]; there is no retry.
    pub fn create(
        model_path: impl AsRef<Path>,
        device_id: u32,
        config: &WorkerContextConfig,
        loader: Arc<dyn EngineLoader>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();
        tracing::info!(
            "Creating worker for device {} from {:?}",
            device_id,
            model_path
        );

        let (init_tx, init_rx) = bounded::<Result<FrameShape>>(1);
        let (data_tx, data_rx) = bounded::<Job>(1);
        let (result_tx, result_rx) = bounded::<Completed>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let mut state = WorkerState::Created;
        tracing::trace!("worker {} state: {}", device_id, state);

        let thread_stop = stop.clone();
        let thread_config = config.clone();
        let thread_model = model_path.clone();
        let handle = std::thread::Builder::new()
            .name(format!("pose-worker-{}", device_id))
            .spawn(move || {
                worker_main(
                    device_id,
                    thread_model,
                    thread_config,
                    loader,
                    init_tx,
                    data_rx,
                    result_tx,
                    thread_stop,
                )
            })
            .map_err(|e| PipelineError::InitFailed {
                device_id,
                message: format!("failed to spawn worker thread: {}", e),
            })?;

        state = WorkerState::Initializing;
        tracing::trace!("worker {} state: {}", device_id, state);

        // Wait for initReady
        let input_shape = match init_rx.recv() {
            Ok(Ok(shape)) => shape,
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::error!("Worker for device {} failed to initialize: {}", device_id, e);
                return Err(match e {
                    err @ PipelineError::InitFailed { .. } => err,
                    other => PipelineError::InitFailed {
                        device_id,
                        message: other.to_string(),
                    },
                });
            }
            Err(_) => {
                let _ = handle.join();
                tracing::error!("Worker for device {} exited during initialization", device_id);
                return Err(PipelineError::InitFailed {
                    device_id,
                    message: "worker exited during initialization".to_string(),
                });
            }
        };

        if input_shape.channels != 3 || input_shape.is_empty() {
            stop.store(true, Ordering::SeqCst);
            drop(data_tx);
            let _ = handle.join();
            return Err(PipelineError::InitFailed {
                device_id,
                message: format!("engine input shape {} is not a non-empty RGB image", input_shape),
            });
        }

        state = WorkerState::Idle;
        tracing::info!(
            "Worker for device {} ready (input {})",
            device_id,
            input_shape
        );

        Ok(Self {
            device_id,
            model_path,
            input_shape,
            state,
            data_tx: Some(data_tx),
            result_rx,
            input: Some(vec![0u8; input_shape.len()].into_boxed_slice()),
            output: Some(Box::new(Pose::default())),
            last_origin: None,
            submissions: 0,
            stop,
            handle: Some(handle),
            stats: InferenceStats::default(),
        })
    }

    /// Copy `frame` into the input buffer and raise dataReady
    ///
    /// Returns immediately. The frame is resized (nearest neighbor) and
    /// converted to RGB to match [`input_shape`](Self::input_shape).
    pub fn submit(&mut self, frame: &Frame) -> Result<()> {
        let origin = FrameOrigin::Frame(self.submissions);
        self.submit_as(frame, origin)
    }

    /// Submit with an explicit origin tag (used by the pool)
    pub(crate) fn submit_as(&mut self, frame: &Frame, origin: FrameOrigin) -> Result<()> {
        match self.state {
            WorkerState::Idle => {}
            WorkerState::Terminated => {
                return Err(PipelineError::Terminated {
                    device_id: self.device_id,
                })
            }
            other => {
                return Err(PipelineError::Handshake {
                    device_id: self.device_id,
                    message: format!("submit while {}", other),
                })
            }
        }

        let (Some(mut input), Some(output)) = (self.input.take(), self.output.take()) else {
            return Err(PipelineError::Handshake {
                device_id: self.device_id,
                message: "buffers not held by controller".to_string(),
            });
        };

        copy_into_input(frame, &mut input, self.input_shape);

        let Some(data_tx) = self.data_tx.as_ref() else {
            return Err(PipelineError::Terminated {
                device_id: self.device_id,
            });
        };

        match data_tx.try_send(Job {
            origin,
            input,
            output,
        }) {
            Ok(()) => {
                self.submissions += 1;
                self.state = WorkerState::AwaitingResult;
                tracing::trace!("worker {}: dataReady ({:?})", self.device_id, origin);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                self.input = Some(job.input);
                self.output = Some(job.output);
                Err(PipelineError::Handshake {
                    device_id: self.device_id,
                    message: "dataReady already raised".to_string(),
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("Worker for device {} is gone", self.device_id);
                self.mark_lost();
                Err(PipelineError::WorkerLost {
                    device_id: self.device_id,
                })
            }
        }
    }

    /// Block until resultReady and return the pose
    ///
    /// The reference is valid until the next `submit`. Copy the pose if it
    /// needs to outlive that.
    pub fn collect(&mut self) -> Result<&Pose> {
        self.collect_tagged().map(|(_, pose)| pose)
    }

    /// Like [`collect`](Self::collect), also returning which frame the pose belongs to
    pub fn collect_tagged(&mut self) -> Result<(FrameOrigin, &Pose)> {
        match self.state {
            WorkerState::AwaitingResult => {}
            WorkerState::Terminated => {
                return Err(PipelineError::Terminated {
                    device_id: self.device_id,
                })
            }
            other => {
                return Err(PipelineError::Handshake {
                    device_id: self.device_id,
                    message: format!("collect while {}", other),
                })
            }
        }

        let completed = match self.result_rx.recv() {
            Ok(completed) => completed,
            Err(_) => {
                tracing::error!(
                    "Worker for device {} exited with a result pending",
                    self.device_id
                );
                self.mark_lost();
                return Err(PipelineError::WorkerLost {
                    device_id: self.device_id,
                });
            }
        };

        let Completed {
            job,
            outcome,
            elapsed,
        } = completed;
        let origin = job.origin;
        self.input = Some(job.input);
        self.output = Some(job.output);
        self.last_origin = Some(origin);
        self.state = WorkerState::Idle;
        tracing::trace!("worker {}: resultReady ({:?})", self.device_id, origin);

        match outcome {
            Ok(()) => self.stats.record_success(elapsed),
            Err(e) => {
                self.stats.record_failure();
                tracing::warn!("Inference failed on device {}: {}", self.device_id, e);
                return Err(e);
            }
        }

        match self.output.as_deref() {
            Some(pose) => Ok((origin, pose)),
            None => Err(PipelineError::Handshake {
                device_id: self.device_id,
                message: "output buffer missing after collect".to_string(),
            }),
        }
    }

    /// Stop the worker without waiting for an in-flight inference
    ///
    /// Idempotent. If no inference is in flight the thread is joined (it is
    /// parked on dataReady and exits at once); otherwise it is detached and
    /// exits when its engine returns.
    pub fn terminate(&mut self) {
        if self.state == WorkerState::Terminated && self.data_tx.is_none() {
            return;
        }

        let in_flight = self.state == WorkerState::AwaitingResult;
        self.stop.store(true, Ordering::SeqCst);
        self.data_tx = None;
        self.state = WorkerState::Terminated;

        if !in_flight {
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("Worker for device {} panicked", self.device_id);
                }
            }
        }

        tracing::info!(
            "Terminated worker for device {}{}",
            self.device_id,
            if in_flight { " (inference abandoned)" } else { "" }
        );
    }

    /// True once the worker thread has finished
    pub fn has_exited(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Fixed engine input shape
    pub fn input_shape(&self) -> FrameShape {
        self.input_shape
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Origin of the most recently collected pose
    pub fn last_origin(&self) -> Option<FrameOrigin> {
        self.last_origin
    }

    /// Number of successful submissions
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn stats(&self) -> &InferenceStats {
        &self.stats
    }

    fn mark_lost(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.data_tx = None;
        self.state = WorkerState::Terminated;
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("device_id", &self.device_id)
            .field("input_shape", &self.input_shape)
            .field("state", &self.state)
            .field("submissions", &self.submissions)
            .finish()
    }
}

/// Body of the worker thread
#[allow(clippy::too_many_arguments)]
fn worker_main(
    device_id: u32,
    model_path: PathBuf,
    config: WorkerContextConfig,
    loader: Arc<dyn EngineLoader>,
    init_tx: Sender<Result<FrameShape>>,
    data_rx: Receiver<Job>,
    result_tx: Sender<Completed>,
    stop: Arc<AtomicBool>,
) {
    if let Err(e) = platform::apply_worker_context(&config) {
        tracing::warn!(
            "Could not apply thread placement for device {} ({:?}): {}",
            device_id,
            config,
            e
        );
    }

    let mut engine: Box<dyn InferenceEngine> = match loader.load(&model_path, device_id) {
        Ok(engine) => engine,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    // initReady
    if init_tx.send(Ok(engine.input_shape())).is_err() {
        return;
    }
    drop(init_tx);
    tracing::debug!("worker {}: {} loaded", device_id, engine.name());

    // Wait for dataReady; a closed channel means terminate
    while let Ok(mut job) = data_rx.recv() {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let start = Instant::now();
        let outcome = engine.invoke(&job.input, &mut job.output);
        let elapsed = start.elapsed();

        // resultReady
        if result_tx
            .send(Completed {
                job,
                outcome,
                elapsed,
            })
            .is_err()
        {
            break;
        }
    }

    tracing::debug!("worker {}: exiting", device_id);
}
