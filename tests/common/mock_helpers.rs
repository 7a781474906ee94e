//! Mock construction helpers

use pose_pipeline::backend::{EngineLoader, MockEngineLoader, MockPosePattern, WorkerContext};
use pose_pipeline::config::WorkerContextConfig;
use pose_pipeline::pipeline::WorkerPool;
use pose_pipeline::types::{Frame, FrameShape};
use std::sync::Arc;

/// Engine input shape used throughout the integration tests
pub const TEST_SHAPE: FrameShape = FrameShape::rgb(4, 4);

/// Loader whose poses carry the frame's byte sum
pub fn frame_sum_loader() -> MockEngineLoader {
    MockEngineLoader::new(TEST_SHAPE).with_pattern(MockPosePattern::FrameSum)
}

/// Create workers on devices `0..n` from one loader
pub fn create_test_workers(n: u32, loader: Arc<dyn EngineLoader>) -> Vec<WorkerContext> {
    (0..n)
        .map(|id| {
            WorkerContext::create("mock.model", id, &WorkerContextConfig::default(), loader.clone())
                .expect("mock worker should start")
        })
        .collect()
}

/// Pool of `n` frame-sum workers seeded with `warmup`
pub fn create_test_pool(n: u32, warmup: &Frame) -> WorkerPool {
    let loader: Arc<dyn EngineLoader> = Arc::new(frame_sum_loader());
    WorkerPool::new(create_test_workers(n, loader), warmup).expect("pool should start")
}
