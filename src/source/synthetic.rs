//! Generated frames at a fixed rate
//!
//! The producer thread renders a full capture frame, crops it as configured
//! (320x240 minus 40 px left and right gives 240x240 by default) and hands it
//! over with latest-frame semantics.

use super::FrameSource;
use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, FrameShape, PixelFormat};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What the synthetic frames show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntheticPattern {
    /// Uniform random bytes
    #[default]
    Noise,
    /// Every byte has the same value
    Solid(u8),
    /// A white vertical bar sweeping left to right on black
    MovingBar,
}

/// Frame source backed by a generator thread
pub struct SyntheticSource {
    config: SourceConfig,
    pattern: SyntheticPattern,
    max_frames: Option<u64>,
    seed: u64,
    running: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            pattern: SyntheticPattern::default(),
            max_frames: None,
            seed: 0x9E37_79B9_7F4A_7C15,
            running: Arc::new(AtomicBool::new(false)),
            produced: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    pub fn with_pattern(mut self, pattern: SyntheticPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Stop after this many frames (the channel then disconnects)
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        // xorshift state must be non-zero
        self.seed = seed.max(1);
        self
    }

    /// Frames generated so far
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    /// Frames replaced by a newer one before the consumer took them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self) -> Result<Receiver<Frame>> {
        if self.handle.is_some() {
            return Err(PipelineError::Source(
                "synthetic source is already started".to_string(),
            ));
        }
        if self.config.output_shape().is_empty() {
            return Err(PipelineError::Source(format!(
                "crop {:?} leaves no pixels of a {}x{} capture",
                self.config.crop, self.config.height, self.config.width
            )));
        }

        let (tx, rx) = bounded::<Frame>(1);
        self.running.store(true, Ordering::SeqCst);
        self.produced.store(0, Ordering::SeqCst);
        self.dropped.store(0, Ordering::SeqCst);

        let producer = Producer {
            config: self.config.clone(),
            pattern: self.pattern,
            max_frames: self.max_frames,
            rng: XorShift(self.seed),
            running: self.running.clone(),
            produced: self.produced.clone(),
            dropped: self.dropped.clone(),
        };
        let stale = rx.clone();
        let handle = std::thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || producer.run(tx, stale))?;
        self.handle = Some(handle);

        tracing::info!(
            "Synthetic source started: {:?} at {} fps, {}",
            self.pattern,
            self.config.fps,
            self.config.output_shape()
        );
        Ok(rx)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Synthetic source thread panicked");
            }
            tracing::info!(
                "Synthetic source stopped ({} frames, {} dropped)",
                self.produced(),
                self.dropped()
            );
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn output_shape(&self) -> FrameShape {
        self.config.output_shape()
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Producer {
    config: SourceConfig,
    pattern: SyntheticPattern,
    max_frames: Option<u64>,
    rng: XorShift,
    running: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl Producer {
    /// `stale` is a second handle on the consumer side of `tx`, used to evict
    /// an unconsumed frame
    fn run(mut self, tx: Sender<Frame>, stale: Receiver<Frame>) {
        let period = self.config.frame_period();
        let mut next = Instant::now();
        let mut index = 0u64;

        while self.running.load(Ordering::SeqCst) {
            if self.max_frames.is_some_and(|max| index >= max) {
                break;
            }

            let frame = match self.render(index) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Synthetic source failed to render frame {}: {}", index, e);
                    break;
                }
            };
            index += 1;
            self.produced.fetch_add(1, Ordering::SeqCst);

            if !self.deliver(&tx, &stale, frame) {
                break;
            }

            if !period.is_zero() {
                next += period;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    // Fell behind; don't try to catch up with a burst
                    next = now;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::debug!("Synthetic source producer exiting after {} frames", index);
    }

    /// Hand `frame` over, replacing an unconsumed one. False once the consumer is gone.
    fn deliver(&self, tx: &Sender<Frame>, stale: &Receiver<Frame>, frame: Frame) -> bool {
        // `stale` keeps the channel connected, so count the consumer's handle instead
        if stale.receiver_count() <= 1 {
            tracing::debug!("Synthetic source consumer dropped its receiver");
            return false;
        }
        let mut frame = frame;
        loop {
            match tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if stale.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::SeqCst);
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    fn render(&mut self, index: u64) -> Result<Frame> {
        let SourceConfig {
            width,
            height,
            pixel_format,
            ..
        } = self.config;
        let capture = match self.pattern {
            SyntheticPattern::Noise => {
                let mut frame = Frame::filled(height, width, pixel_format, 0);
                self.rng.fill(frame.data_mut());
                frame
            }
            SyntheticPattern::Solid(value) => Frame::filled(height, width, pixel_format, value),
            SyntheticPattern::MovingBar => moving_bar(height, width, pixel_format, index),
        };

        let crop = self.config.crop;
        if crop.is_empty() {
            return Ok(capture);
        }
        capture.crop(
            crop.top,
            crop.left,
            self.config.output_height(),
            self.config.output_width(),
        )
    }
}

fn moving_bar(height: usize, width: usize, format: PixelFormat, index: u64) -> Frame {
    let mut frame = Frame::filled(height, width, format, 0);
    if width == 0 {
        return frame;
    }
    let bar = (width / 8).max(1);
    let start = ((index as usize) * 4) % width;
    let channels = format.channels();
    let data = frame.data_mut();
    for row in 0..height {
        for col in start..(start + bar).min(width) {
            let offset = (row * width + col) * channels;
            data[offset..offset + channels].fill(255);
        }
    }
    frame
}

/// Random RGB frame, e.g. for seeding the worker pool
pub fn noise_frame(shape: FrameShape, seed: u64) -> Frame {
    let mut frame = Frame::black(shape.height, shape.width);
    XorShift(seed.max(1)).fill(frame.data_mut());
    frame
}

/// xorshift64 generator
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        s
    }

    fn fill(&mut self, bytes: &mut [u8]) {
        for chunk in bytes.chunks_mut(8) {
            let value = self.next().to_le_bytes();
            chunk.copy_from_slice(&value[..chunk.len()]);
        }
    }
}
