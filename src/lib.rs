//! # pose-pipeline: pipelined pose estimation on multiple accelerators
//!
//! Streams frames into one or more inference accelerators and reports 17
//! MoveNet keypoints per frame at the camera's cadence. Each accelerator is
//! driven by a worker thread; the controller submits every new frame to one
//! worker and collects the pose of an earlier frame from the next, so
//! inference latency overlaps frame acquisition.
//!
//! ## Architecture
//!
//! - **Backend**: worker contexts, each running one inference engine on its own thread
//! - **Pipeline**: the round-robin worker pool, the per-frame controller and timing diagnostics
//! - **Source**: frame producers with latest-frame delivery
//! - **Communication**: crossbeam channels carrying owned buffers between threads
//!
//! ## Configuration
//!
//! Pipeline settings are read from `pipeline.toml` in the platform config
//! directory under `pose-pipeline`:
//!
//! - **Linux**: `~/.config/pose-pipeline/`
//! - **macOS**: `~/Library/Application Support/pose-pipeline/`
//! - **Windows**: `%APPDATA%\pose-pipeline\`
//!
//! ## Example
//!
//! ```ignore
//! use pose_pipeline::{
//!     backend::MockEngineLoader,
//!     config::PipelineConfig,
//!     pipeline::PipelineController,
//!     source::SyntheticSource,
//!     types::{FrameShape, KeypointIndex},
//! };
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::load_or_default();
//! let loader = Arc::new(MockEngineLoader::new(FrameShape::rgb(192, 192)));
//! let source = Box::new(SyntheticSource::new(config.source.clone()));
//!
//! let mut controller = PipelineController::from_config(
//!     &config,
//!     loader,
//!     source,
//!     Box::new(|_frame, pose| {
//!         println!("nose at {:?}", pose.get(KeypointIndex::Nose));
//!     }),
//! )?;
//!
//! controller.run_for(std::time::Duration::from_secs(5))?;
//! controller.terminate();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use backend::{EngineLoader, InferenceEngine, WorkerContext, WorkerState};
pub use config::{PipelineConfig, WorkerContextConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineController, WorkerPool};
pub use types::{Frame, FrameOrigin, Keypoint, KeypointIndex, Pose};
