//! Per-component settings
//!
//! These structs are embedded in [`PipelineConfig`](super::PipelineConfig)
//! and can also be built directly when wiring a pipeline by hand.
//!
//! # Main Types
//!
//! - [`WorkerContextConfig`] - CPU pinning and scheduling class for one worker thread
//! - [`SourceConfig`] - Frame rate, capture resolution, crop and pixel format
//! - [`DiagnosticsConfig`] - Timing ring capacity and export options

use crate::types::{FrameShape, PixelFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default capture frame rate
pub const DEFAULT_FPS: u32 = 75;

/// Default capture width in pixels
pub const DEFAULT_CAPTURE_WIDTH: usize = 320;

/// Default capture height in pixels
pub const DEFAULT_CAPTURE_HEIGHT: usize = 240;

/// Default number of timing records kept
pub const DEFAULT_TIMING_CAPACITY: usize = 500;

/// Default real-time priority when a real-time policy is selected
pub const DEFAULT_RT_PRIORITY: i32 = 50;

/// Scheduling class requested for a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Leave the thread in the default time-sharing class
    #[default]
    Normal,
    /// First-in first-out real-time class
    Fifo,
    /// Round-robin real-time class
    RoundRobin,
}

impl SchedulingPolicy {
    pub fn is_realtime(&self) -> bool {
        !matches!(self, SchedulingPolicy::Normal)
    }
}

impl std::fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingPolicy::Normal => write!(f, "normal"),
            SchedulingPolicy::Fifo => write!(f, "fifo"),
            SchedulingPolicy::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// Placement and priority of one worker thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkerContextConfig {
    /// Logical CPUs the worker may run on (empty = no pinning)
    #[serde(default)]
    pub cpu_affinity: Vec<usize>,

    /// Scheduling class
    #[serde(default)]
    pub scheduling_policy: SchedulingPolicy,

    /// Priority within the scheduling class (ignored for `Normal`)
    #[serde(default)]
    pub priority: i32,
}

impl WorkerContextConfig {
    /// Pin to the given CPUs with a real-time FIFO priority
    pub fn realtime(cpus: impl Into<Vec<usize>>, priority: i32) -> Self {
        Self {
            cpu_affinity: cpus.into(),
            scheduling_policy: SchedulingPolicy::Fifo,
            priority,
        }
    }

    /// Pin to the given CPUs without changing the scheduling class
    pub fn pinned(cpus: impl Into<Vec<usize>>) -> Self {
        Self {
            cpu_affinity: cpus.into(),
            ..Self::default()
        }
    }

    /// Placement of the `index`-th worker by default: pinned to its own
    /// reserved CPU with real-time FIFO priority
    pub fn reserved(index: usize) -> Self {
        let cpus = crate::backend::platform::reserved_cpu(index)
            .into_iter()
            .collect::<Vec<_>>();
        Self::realtime(cpus, DEFAULT_RT_PRIORITY)
    }

    /// True if applying this config requires any platform call
    pub fn is_default(&self) -> bool {
        self.cpu_affinity.is_empty() && !self.scheduling_policy.is_realtime()
    }
}

/// Pixels removed from each edge of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CropRegion {
    #[serde(default)]
    pub top: usize,
    #[serde(default)]
    pub bottom: usize,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
}

impl CropRegion {
    /// Crop the same amount from left and right
    pub fn horizontal(pixels: usize) -> Self {
        Self {
            left: pixels,
            right: pixels,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }
}

/// Frame source settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Frames per second
    pub fps: u32,
    /// Capture width before cropping
    pub width: usize,
    /// Capture height before cropping
    pub height: usize,
    /// Region removed after capture
    #[serde(default)]
    pub crop: CropRegion,
    /// Pixel format delivered to the pipeline
    #[serde(default)]
    pub pixel_format: PixelFormat,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            // 320x240 -> 240x240
            crop: CropRegion::horizontal(40),
            pixel_format: PixelFormat::Rgb8,
        }
    }
}

impl SourceConfig {
    /// Height of delivered frames after cropping
    pub fn output_height(&self) -> usize {
        self.height
            .saturating_sub(self.crop.top + self.crop.bottom)
    }

    /// Width of delivered frames after cropping
    pub fn output_width(&self) -> usize {
        self.width.saturating_sub(self.crop.left + self.crop.right)
    }

    /// Shape of delivered frames after cropping
    pub fn output_shape(&self) -> FrameShape {
        FrameShape {
            height: self.output_height(),
            width: self.output_width(),
            channels: self.pixel_format.channels(),
        }
    }

    /// Time between frames (zero fps means as fast as possible)
    pub fn frame_period(&self) -> Duration {
        if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(1_000_000 / self.fps as u64)
        }
    }
}

/// Diagnostics settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Number of timing records kept before the oldest is evicted
    pub capacity: usize,
    /// Where to write the timing table on shutdown (None = don't export)
    #[serde(default)]
    pub export_path: Option<PathBuf>,
    /// Column delimiter for the exported table
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Print a timing summary every this many frames (0 = never)
    #[serde(default = "default_report_every")]
    pub report_every: u64,
}

fn default_delimiter() -> char {
    ','
}

fn default_report_every() -> u64 {
    DEFAULT_TIMING_CAPACITY as u64
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TIMING_CAPACITY,
            export_path: Some(PathBuf::from("times.csv")),
            delimiter: default_delimiter(),
            report_every: default_report_every(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_crops_to_square() {
        let source = SourceConfig::default();
        assert_eq!(source.output_shape(), FrameShape::rgb(240, 240));
    }

    #[test]
    fn test_frame_period() {
        let mut source = SourceConfig::default();
        source.fps = 100;
        assert_eq!(source.frame_period(), Duration::from_millis(10));
        source.fps = 0;
        assert_eq!(source.frame_period(), Duration::ZERO);
    }

    #[test]
    fn test_worker_context_config_helpers() {
        assert!(WorkerContextConfig::default().is_default());

        let rt = WorkerContextConfig::realtime(vec![2, 3], 80);
        assert!(!rt.is_default());
        assert!(rt.scheduling_policy.is_realtime());
        assert_eq!(rt.cpu_affinity, vec![2, 3]);

        let pinned = WorkerContextConfig::pinned(vec![1]);
        assert!(!pinned.is_default());
        assert_eq!(pinned.scheduling_policy, SchedulingPolicy::Normal);
    }

    #[test]
    fn test_scheduling_policy_serde_names() {
        let json = serde_json::to_string(&SchedulingPolicy::RoundRobin).unwrap();
        assert_eq!(json, "\"round_robin\"");
    }
}
