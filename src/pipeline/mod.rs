//! Pipelined pose estimation over a rotation of workers.
//!
//! Frames flow from a [`FrameSource`](crate::source::FrameSource) into the
//! [`PipelineController`], which hands each one to the [`WorkerPool`] and
//! passes the pose that comes back to a user callback.
//!
//! # Architecture
//!
//! ```text
//! [FrameSource] ──► [PipelineController] ──► WorkerPool::step ──► [w0] [w1] ... [wN-1]
//!                          │                        ▲                   │
//!                          │                        └──── pose ◄────────┘
//!                          ├──► callback(frame, pose)
//!                          └──► Diagnostics [t0, t1, t2, t3]
//! ```
//!
//! # Design
//!
//! - **Round robin with explicit head** — workers sit in a fixed array; only the head index moves.
//! - **Depth N−1** — a pose comes back N−1 cycles after its frame was submitted.
//! - **Single-threaded controller** — the callback runs on the controller thread.
//! - **Bounded diagnostics** — the last 500 cycles by default.

pub mod controller;
pub mod diagnostics;
pub mod pool;

pub use controller::{PipelineController, PoseCallback};
pub use diagnostics::{Diagnostics, TimingRecord, TimingSummary};
pub use pool::{StepResult, WorkerPool};
