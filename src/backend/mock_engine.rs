//! Mock Inference Engine for Testing
//!
//! This module provides a mock engine that can be used to exercise the
//! pipeline without accelerator hardware. It produces poses from the input
//! buffer with configurable, deterministic patterns.
//!
//! # Features
//!
//! - **Pattern-based poses**: derive keypoints from the frame or the device
//! - **Simulated latency**: sleep inside `invoke` like a real accelerator
//! - **Failure injection**: failing devices at load time, errors or panics at invoke time
//! - **Counters**: shared load and invocation counters for assertions
//!
//! # Pose Patterns
//!
//! - [`MockPosePattern::FrameSum`] - every keypoint is `[sum % 255, 0, 1.0]`
//! - [`MockPosePattern::MeanIntensity`] - every keypoint is `[mean, mean, 1.0]` with mean in [0, 1]
//! - [`MockPosePattern::DeviceSentinel`] - every keypoint is `[device, device, 1.0]`
//! - [`MockPosePattern::BrightestColumn`] - every keypoint sits on the brightest column
//! - [`MockPosePattern::Constant`] - a fixed pose
//!
//! # Example
//!
//! ```ignore
//! use pose_pipeline::backend::{MockEngineLoader, MockPosePattern};
//! use pose_pipeline::types::FrameShape;
//! use std::time::Duration;
//!
//! let loader = MockEngineLoader::new(FrameShape::rgb(192, 192))
//!     .with_pattern(MockPosePattern::FrameSum)
//!     .with_latency(Duration::from_millis(20));
//! ```

use crate::backend::engine_trait::{EngineLoader, InferenceEngine};
use crate::error::{PipelineError, Result};
use crate::types::{FrameShape, Keypoint, Pose};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pattern for generating mock poses
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MockPosePattern {
    /// Byte sum of the input modulo 255 in the row of every keypoint
    #[default]
    FrameSum,
    /// Mean input intensity (0..1) in row and column
    MeanIntensity,
    /// Device index in row and column
    DeviceSentinel,
    /// Column of the brightest image column (normalized), row 0.5
    BrightestColumn,
    /// Always the same pose
    Constant(Pose),
}

impl MockPosePattern {
    /// Generate the pose for `input` (laid out as `shape`) on `device_id`
    pub fn generate(&self, input: &[u8], shape: FrameShape, device_id: u32) -> Pose {
        match self {
            MockPosePattern::FrameSum => {
                let sum: u64 = input.iter().map(|&b| b as u64).sum();
                Pose::uniform(Keypoint::new((sum % 255) as f32, 0.0, 1.0))
            }
            MockPosePattern::MeanIntensity => {
                let mean = if input.is_empty() {
                    0.0
                } else {
                    input.iter().map(|&b| b as f64).sum::<f64>() / (input.len() as f64 * 255.0)
                };
                Pose::uniform(Keypoint::new(mean as f32, mean as f32, 1.0))
            }
            MockPosePattern::DeviceSentinel => {
                let d = device_id as f32;
                Pose::uniform(Keypoint::new(d, d, 1.0))
            }
            MockPosePattern::BrightestColumn => {
                let col = brightest_column(input, shape);
                let x = (col as f32 + 0.5) / shape.width.max(1) as f32;
                Pose::uniform(Keypoint::new(0.5, x, 1.0))
            }
            MockPosePattern::Constant(pose) => *pose,
        }
    }
}

fn brightest_column(input: &[u8], shape: FrameShape) -> usize {
    let row_len = shape.width * shape.channels;
    if row_len == 0 {
        return 0;
    }
    let mut sums = vec![0u64; shape.width];
    for row in input.chunks_exact(row_len) {
        for (sum, pixel) in sums.iter_mut().zip(row.chunks_exact(shape.channels)) {
            *sum += pixel.iter().map(|&b| b as u64).sum::<u64>();
        }
    }
    // First maximum wins
    sums.iter()
        .enumerate()
        .fold((0, 0), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
        .0
}

/// How a mock engine misbehaves at invoke time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// `invoke` returns an engine error
    Error,
    /// `invoke` panics, killing the worker thread
    Panic,
}

/// A mock engine bound to one device
#[derive(Debug)]
pub struct MockEngine {
    device_id: u32,
    input_shape: FrameShape,
    pattern: MockPosePattern,
    latency: Duration,
    failure: Option<MockFailure>,
    invocations: Arc<AtomicU64>,
}

impl MockEngine {
    pub fn new(device_id: u32, input_shape: FrameShape, pattern: MockPosePattern) -> Self {
        Self {
            device_id,
            input_shape,
            pattern,
            latency: Duration::ZERO,
            failure: None,
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Share an invocation counter with the caller
    pub fn with_counter(mut self, invocations: Arc<AtomicU64>) -> Self {
        self.invocations = invocations;
        self
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for MockEngine {
    fn input_shape(&self) -> FrameShape {
        self.input_shape
    }

    fn invoke(&mut self, input: &[u8], output: &mut Pose) -> Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        match self.failure {
            Some(MockFailure::Error) => {
                return Err(PipelineError::Engine(format!(
                    "mock engine on device {} failed",
                    self.device_id
                )))
            }
            Some(MockFailure::Panic) => {
                panic!("mock engine on device {} panicked", self.device_id)
            }
            None => {}
        }

        *output = self.pattern.generate(input, self.input_shape, self.device_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Loader that hands out [`MockEngine`]s
#[derive(Debug, Clone)]
pub struct MockEngineLoader {
    input_shape: FrameShape,
    pattern: MockPosePattern,
    latency: Duration,
    device_latency: HashMap<u32, Duration>,
    failing_devices: HashSet<u32>,
    failure: Option<MockFailure>,
    loads: Arc<AtomicU64>,
    invocations: Arc<AtomicU64>,
}

impl MockEngineLoader {
    pub fn new(input_shape: FrameShape) -> Self {
        Self {
            input_shape,
            pattern: MockPosePattern::default(),
            latency: Duration::ZERO,
            device_latency: HashMap::new(),
            failing_devices: HashSet::new(),
            failure: None,
            loads: Arc::new(AtomicU64::new(0)),
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_pattern(mut self, pattern: MockPosePattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Latency for every device without its own setting
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_device_latency(mut self, device_id: u32, latency: Duration) -> Self {
        self.device_latency.insert(device_id, latency);
        self
    }

    /// Loading onto `device_id` fails as if the device were absent
    pub fn with_failing_device(mut self, device_id: u32) -> Self {
        self.failing_devices.insert(device_id);
        self
    }

    /// Every engine misbehaves at invoke time
    pub fn with_invoke_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Number of engines loaded so far
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Invocations across all engines from this loader
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Shared invocation counter
    pub fn invocation_counter(&self) -> Arc<AtomicU64> {
        self.invocations.clone()
    }
}

impl EngineLoader for MockEngineLoader {
    fn load(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn InferenceEngine>> {
        if self.failing_devices.contains(&device_id) {
            return Err(PipelineError::InitFailed {
                device_id,
                message: format!("mock device {} not present", device_id),
            });
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Mock engine loaded {:?} on device {}",
            model_path,
            device_id
        );

        let latency = self
            .device_latency
            .get(&device_id)
            .copied()
            .unwrap_or(self.latency);

        let mut engine = MockEngine::new(device_id, self.input_shape, self.pattern)
            .with_latency(latency)
            .with_counter(self.invocations.clone());
        if let Some(failure) = self.failure {
            engine = engine.with_failure(failure);
        }
        Ok(Box::new(engine))
    }
}
