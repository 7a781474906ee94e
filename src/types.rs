//! Core data types for the pose pipeline
//!
//! This module contains the data structures that flow through the pipeline:
//! frames going in, poses coming out.
//!
//! # Main Types
//!
//! - [`PixelFormat`] - Channel layout of an incoming frame
//! - [`FrameShape`] - Height, width and channel count of a pixel buffer
//! - [`Frame`] - An owned 8-bit pixel buffer
//! - [`KeypointIndex`] - The fixed 17-keypoint identity mapping
//! - [`Keypoint`] - A single (row, column, confidence) triple
//! - [`Pose`] - Exactly 17 keypoints from one inference
//! - [`FrameOrigin`] - Which submitted frame a pose was computed from

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Number of keypoints in every pose
pub const KEYPOINT_COUNT: usize = 17;

/// Number of values per keypoint (row, column, confidence)
pub const KEYPOINT_VALUES: usize = 3;

/// Channel layout of an 8-bit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// Red, green, blue
    #[default]
    Rgb8,
    /// Blue, green, red
    Bgr8,
    /// Single luminance channel
    Gray8,
}

impl PixelFormat {
    /// Number of bytes per pixel
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Rgb8 => write!(f, "RGB"),
            PixelFormat::Bgr8 => write!(f, "BGR"),
            PixelFormat::Gray8 => write!(f, "GRAY8"),
        }
    }
}

/// Shape of a pixel buffer in height-width-channel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameShape {
    /// Create an RGB shape
    pub const fn rgb(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            channels: 3,
        }
    }

    /// Total number of bytes for this shape
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// True if any dimension is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for FrameShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// An owned 8-bit frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    height: usize,
    width: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing pixel buffer, checking its length against the dimensions
    pub fn new(height: usize, width: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = height * width * format.channels();
        if data.len() != expected {
            return Err(PipelineError::Source(format!(
                "frame buffer holds {} bytes, {}x{} {} needs {}",
                data.len(),
                height,
                width,
                format,
                expected
            )));
        }
        Ok(Self {
            height,
            width,
            format,
            data,
        })
    }

    /// A frame with every byte set to `value`
    pub fn filled(height: usize, width: usize, format: PixelFormat, value: u8) -> Self {
        Self {
            height,
            width,
            format,
            data: vec![value; height * width * format.channels()],
        }
    }

    /// An all-black RGB frame
    pub fn black(height: usize, width: usize) -> Self {
        Self::filled(height, width, PixelFormat::Rgb8, 0)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            height: self.height,
            width: self.width,
            channels: self.format.channels(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte sum over all channels of all pixels
    pub fn byte_sum(&self) -> u64 {
        self.data.iter().map(|&b| b as u64).sum()
    }

    /// RGB triple at (row, column), converting from the stored format
    pub fn rgb_at(&self, row: usize, col: usize) -> [u8; 3] {
        let channels = self.format.channels();
        let offset = (row * self.width + col) * channels;
        match self.format {
            PixelFormat::Rgb8 => [
                self.data[offset],
                self.data[offset + 1],
                self.data[offset + 2],
            ],
            PixelFormat::Bgr8 => [
                self.data[offset + 2],
                self.data[offset + 1],
                self.data[offset],
            ],
            PixelFormat::Gray8 => {
                let v = self.data[offset];
                [v, v, v]
            }
        }
    }

    /// Copy out a rectangular region
    pub fn crop(&self, top: usize, left: usize, height: usize, width: usize) -> Result<Frame> {
        if top + height > self.height || left + width > self.width {
            return Err(PipelineError::Source(format!(
                "crop {}x{} at ({}, {}) exceeds frame {}x{}",
                height, width, top, left, self.height, self.width
            )));
        }
        let channels = self.format.channels();
        let mut data = Vec::with_capacity(height * width * channels);
        for row in top..top + height {
            let start = (row * self.width + left) * channels;
            data.extend_from_slice(&self.data[start..start + width * channels]);
        }
        Ok(Frame {
            height,
            width,
            format: self.format,
            data,
        })
    }
}

/// Index of each of the 17 keypoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = KEYPOINT_COUNT;

    pub const ALL: [KeypointIndex; KEYPOINT_COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lower snake case name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

/// A single keypoint
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    /// Normalized row coordinate
    pub row: f32,
    /// Normalized column coordinate
    pub col: f32,
    /// Confidence score, by convention in [0, 1]
    pub confidence: f32,
}

impl Keypoint {
    pub const fn new(row: f32, col: f32, confidence: f32) -> Self {
        Self {
            row,
            col,
            confidence,
        }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Convert to pixel coordinates as (x, y)
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.col * width as f32) as i32;
        let py = (self.row * height as f32) as i32;
        (px, py)
    }
}

/// Pose made of 17 keypoints
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: [Keypoint; KEYPOINT_COUNT],
}

impl Pose {
    /// Pose with every keypoint set to the same value
    pub fn uniform(keypoint: Keypoint) -> Self {
        Self {
            keypoints: [keypoint; KEYPOINT_COUNT],
        }
    }

    /// Build from a flat `[row, col, confidence] * 17` slice
    ///
    /// Returns `None` when the slice is not exactly 51 values long.
    pub fn from_flat(values: &[f32]) -> Option<Self> {
        if values.len() != KEYPOINT_COUNT * KEYPOINT_VALUES {
            return None;
        }
        let mut pose = Pose::default();
        for (kp, chunk) in pose
            .keypoints
            .iter_mut()
            .zip(values.chunks_exact(KEYPOINT_VALUES))
        {
            *kp = Keypoint::new(chunk[0], chunk[1], chunk[2]);
        }
        Some(pose)
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / KEYPOINT_COUNT as f32
    }
}

/// The frame a collected pose was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOrigin {
    /// The warm-up frame seeded at pool construction
    WarmUp,
    /// The n-th frame passed to `WorkerPool::step` (0-based)
    Frame(u64),
}

impl FrameOrigin {
    pub fn is_warm_up(&self) -> bool {
        matches!(self, FrameOrigin::WarmUp)
    }

    pub fn sequence(&self) -> Option<u64> {
        match self {
            FrameOrigin::WarmUp => None,
            FrameOrigin::Frame(seq) => Some(*seq),
        }
    }
}
