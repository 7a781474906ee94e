//! Fixed list of frames
//!
//! Delivers every frame exactly once, in order, then disconnects. The channel
//! is sized to hold the whole list, so nothing is dropped no matter how slow
//! the consumer is.

use super::FrameSource;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameShape};
use crossbeam_channel::{bounded, Receiver};

#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: Vec<Frame>,
    shape: FrameShape,
    running: bool,
    started: bool,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        let shape = frames.first().map(Frame::shape).unwrap_or(FrameShape {
            height: 0,
            width: 0,
            channels: 3,
        });
        Self {
            frames,
            shape,
            running: false,
            started: false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn start(&mut self) -> Result<Receiver<Frame>> {
        if self.started {
            return Err(PipelineError::Source(
                "replay source can only be started once".to_string(),
            ));
        }
        self.started = true;
        self.running = true;

        let (tx, rx) = bounded(self.frames.len().max(1));
        for frame in self.frames.drain(..) {
            // Cannot fail: the channel has room for every frame and rx is alive
            let _ = tx.send(frame);
        }
        tracing::debug!("Replay source queued {} frames", rx.len());
        Ok(rx)
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn output_shape(&self) -> FrameShape {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order_then_disconnects() {
        let frames: Vec<Frame> = (0..4u8)
            .map(|v| {
                let mut f = Frame::black(1, 1);
                f.data_mut()[0] = v;
                f
            })
            .collect();
        let mut source = ReplaySource::new(frames);
        assert_eq!(source.output_shape(), FrameShape::rgb(1, 1));

        let rx = source.start().unwrap();
        let values: Vec<u8> = rx.iter().map(|f| f.data()[0]).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);

        assert!(source.start().is_err());
        source.stop();
        assert!(!source.is_running());
    }
}
