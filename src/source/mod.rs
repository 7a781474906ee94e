//! Frame sources
//!
//! A [`FrameSource`] pushes frames into a crossbeam channel that the
//! controller drains. Live sources deliver with latest-frame semantics: the
//! channel holds at most one frame and a stale frame is dropped in favor of
//! the newest one, so a slow consumer never builds up latency.
//!
//! - [`SyntheticSource`] - generated frames at a fixed rate (no camera needed)
//! - [`ReplaySource`] - a fixed list of frames, delivered in order without drops

pub mod replay;
pub mod synthetic;

pub use replay::ReplaySource;
pub use synthetic::{noise_frame, SyntheticPattern, SyntheticSource};

use crate::error::Result;
use crate::types::{Frame, FrameShape};
use crossbeam_channel::Receiver;

/// Producer of frame-ready events
pub trait FrameSource: Send {
    /// Start producing; frames arrive on the returned channel
    ///
    /// The channel disconnects when the source runs out of frames or is
    /// stopped. Starting a running source is an error.
    fn start(&mut self) -> Result<Receiver<Frame>>;

    /// Stop producing. Idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Shape of delivered frames
    fn output_shape(&self) -> FrameShape;
}
