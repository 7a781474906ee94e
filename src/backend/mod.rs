//! Backend module: worker contexts and the inference engines they run
//!
//! Every worker context owns one engine on its own OS thread and talks to the
//! controller thread only through crossbeam channels.
//!
//! # Components
//!
//! - [`WorkerContext`] - one engine bound to one accelerator device, driven by
//!   a submit/collect handshake
//! - [`InferenceEngine`] / [`EngineLoader`] - the boundary to the accelerator
//!   runtime
//! - [`MockEngineLoader`] - deterministic engines for tests and the demo
//! - `OnnxEngineLoader` - ONNX Runtime engines (feature `onnx`)
//! - [`platform`] - CPU affinity and real-time scheduling for worker threads
//!
//! # Example
//!
//! ```ignore
//! use pose_pipeline::backend::{MockEngineLoader, WorkerContext};
//! use pose_pipeline::config::WorkerContextConfig;
//! use pose_pipeline::types::{Frame, FrameShape};
//! use std::sync::Arc;
//!
//! let loader = Arc::new(MockEngineLoader::new(FrameShape::rgb(192, 192)));
//! let mut worker = WorkerContext::create("model.onnx", 0, &WorkerContextConfig::default(), loader)?;
//!
//! worker.submit(&Frame::black(240, 240))?;
//! let pose = worker.collect()?;
//! println!("nose: {:?}", pose.keypoints[0]);
//!
//! worker.terminate();
//! ```

pub mod engine_trait;
pub mod mock_engine;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod platform;
pub mod preprocess;
pub mod worker;

pub use engine_trait::{EngineLoader, InferenceEngine, InferenceStats};
pub use mock_engine::{MockEngine, MockEngineLoader, MockFailure, MockPosePattern};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxEngine, OnnxEngineLoader};
pub use worker::{WorkerContext, WorkerState};
