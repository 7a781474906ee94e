//! Integration tests for worker context lifecycle
//!
//! These tests validate the complete worker workflow:
//! - Engine loading on the worker thread and init failures
//! - The submit/collect handshake against a scripted engine
//! - Termination with and without an inference in flight
//! - Lost workers (engine panics)
//! - CPU pinning and scheduling class as seen from the worker thread

mod common;

use common::builders::FrameBuilder;
use common::mock_helpers::TEST_SHAPE;
use mockall::mock;
use mockall::predicate::{always, eq};
use pose_pipeline::backend::{
    EngineLoader, InferenceEngine, MockEngineLoader, MockFailure, WorkerContext, WorkerState,
};
#[cfg(target_os = "linux")]
use pose_pipeline::backend::platform;
#[cfg(target_os = "linux")]
use pose_pipeline::config::PipelineConfig;
use pose_pipeline::config::WorkerContextConfig;
use pose_pipeline::error::{PipelineError, Result};
use pose_pipeline::types::{FrameOrigin, FrameShape, Keypoint, Pose};
use std::path::Path;
use std::sync::Arc;
#[cfg(target_os = "linux")]
use std::sync::Mutex;
use std::time::{Duration, Instant};

mock! {
    pub Engine {}

    impl InferenceEngine for Engine {
        fn input_shape(&self) -> FrameShape;
        fn invoke(&mut self, input: &[u8], output: &mut Pose) -> Result<()>;
    }
}

mock! {
    pub Loader {}

    impl EngineLoader for Loader {
        fn load(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn InferenceEngine>>;
    }
}

fn create_worker(device_id: u32, loader: impl EngineLoader + 'static) -> Result<WorkerContext> {
    WorkerContext::create(
        "scripted.model",
        device_id,
        &WorkerContextConfig::default(),
        Arc::new(loader),
    )
}

/// Engine that writes the input length into every keypoint row
fn length_engine() -> MockEngine {
    let mut engine = MockEngine::new();
    engine.expect_input_shape().return_const(TEST_SHAPE);
    engine.expect_invoke().returning(|input, output| {
        *output = Pose::uniform(Keypoint::new(input.len() as f32, 0.0, 1.0));
        Ok(())
    });
    engine
}

#[test]
fn test_loader_is_called_once_on_the_worker_device() {
    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .with(always(), eq(3))
        .times(1)
        .returning(|_, _| Ok(Box::new(length_engine())));

    let worker = create_worker(3, loader).unwrap();
    assert_eq!(worker.device_id(), 3);
    assert_eq!(worker.state(), WorkerState::Idle);
    assert_eq!(worker.input_shape(), TEST_SHAPE);
}

#[test]
fn test_engine_sees_input_of_its_own_shape() {
    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .returning(|_, _| Ok(Box::new(length_engine())));
    let mut worker = create_worker(0, loader).unwrap();

    // 240x240 frame is resized to the 4x4 input
    worker.submit(&FrameBuilder::new(240, 240).build()).unwrap();
    let pose = *worker.collect().unwrap();
    assert_eq!(pose.keypoints[0].row, TEST_SHAPE.len() as f32);
}

#[test]
fn test_engine_error_leaves_worker_usable() {
    let mut engine = MockEngine::new();
    engine.expect_input_shape().return_const(TEST_SHAPE);
    let mut calls = 0;
    engine.expect_invoke().returning(move |_, output| {
        calls += 1;
        if calls == 1 {
            return Err(PipelineError::Engine("device busy".to_string()));
        }
        *output = Pose::uniform(Keypoint::new(1.0, 1.0, 1.0));
        Ok(())
    });

    let mut loader = MockLoader::new();
    let mut engine = Some(engine);
    loader.expect_load().times(1).returning(move |_, _| {
        let engine = engine.take().expect("loaded once");
        Ok(Box::new(engine) as Box<dyn InferenceEngine>)
    });
    let mut worker = create_worker(0, loader).unwrap();
    let frame = FrameBuilder::shape(TEST_SHAPE).build();

    worker.submit(&frame).unwrap();
    assert!(matches!(worker.collect(), Err(PipelineError::Engine(_))));
    assert_eq!(worker.state(), WorkerState::Idle);
    assert_eq!(worker.stats().failed, 1);

    worker.submit(&frame).unwrap();
    assert_eq!(worker.collect().unwrap().keypoints[0].row, 1.0);
    assert_eq!(worker.stats().completed, 1);
}

#[test]
fn test_load_error_fails_creation() {
    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .returning(|_, _| Err(PipelineError::Engine("no such model".to_string())));

    let err = create_worker(5, loader).unwrap_err();
    match err {
        PipelineError::InitFailed { device_id, message } => {
            assert_eq!(device_id, 5);
            assert!(message.contains("no such model"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_empty_input_shape_fails_creation() {
    let mut loader = MockLoader::new();
    loader.expect_load().returning(|_, _| {
        let mut engine = MockEngine::new();
        engine
            .expect_input_shape()
            .return_const(FrameShape::rgb(0, 192));
        Ok(Box::new(engine))
    });

    assert!(matches!(
        create_worker(0, loader),
        Err(PipelineError::InitFailed { .. })
    ));
}

#[test]
fn test_terminate_idle_worker_joins_thread() {
    let mut worker = create_worker(0, MockEngineLoader::new(TEST_SHAPE)).unwrap();
    worker.terminate();
    assert!(worker.has_exited());
}

#[test]
fn test_terminate_does_not_wait_for_inference() {
    let loader = MockEngineLoader::new(TEST_SHAPE).with_latency(Duration::from_millis(300));
    let mut worker = create_worker(0, loader).unwrap();

    worker.submit(&FrameBuilder::shape(TEST_SHAPE).build()).unwrap();
    let start = Instant::now();
    worker.terminate();
    assert!(start.elapsed() < Duration::from_millis(200));
    assert_eq!(worker.state(), WorkerState::Terminated);

    // The thread finishes on its own once the engine returns
    assert!(common::wait_until(common::test_timeout(), || worker.has_exited()));
    assert!(worker.collect().unwrap_err().is_terminated());
}

#[test]
fn test_panicking_engine_is_reported_as_lost() {
    let loader = MockEngineLoader::new(TEST_SHAPE).with_invoke_failure(MockFailure::Panic);
    let mut worker = create_worker(2, loader).unwrap();

    worker.submit(&FrameBuilder::shape(TEST_SHAPE).build()).unwrap();
    assert!(matches!(
        worker.collect(),
        Err(PipelineError::WorkerLost { device_id: 2 })
    ));
    assert_eq!(worker.state(), WorkerState::Terminated);
    assert!(worker
        .submit(&FrameBuilder::shape(TEST_SHAPE).build())
        .unwrap_err()
        .is_terminated());
}

#[test]
fn test_origins_count_submissions() {
    let mut worker = create_worker(0, MockEngineLoader::new(TEST_SHAPE)).unwrap();
    let frame = FrameBuilder::shape(TEST_SHAPE).build();

    for i in 0..3 {
        worker.submit(&frame).unwrap();
        let (origin, _) = worker.collect_tagged().unwrap();
        assert_eq!(origin, FrameOrigin::Frame(i));
    }
    assert_eq!(worker.submissions(), 3);
}

#[test]
fn test_unprivileged_realtime_request_is_not_fatal() {
    // Without CAP_SYS_NICE the scheduling change fails; the worker still starts
    let worker = WorkerContext::create(
        "mock.model",
        0,
        &WorkerContextConfig::realtime(Vec::<usize>::new(), 50),
        Arc::new(MockEngineLoader::new(TEST_SHAPE)),
    );
    assert!(worker.is_ok());
}

/// Placement seen by the engine loader, which runs on the worker thread
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, PartialEq)]
struct ThreadPlacement {
    affinity: Vec<usize>,
    policy: i32,
}

#[cfg(target_os = "linux")]
fn current_placement() -> ThreadPlacement {
    ThreadPlacement {
        affinity: platform::current_affinity().unwrap(),
        // SAFETY: queries the calling thread only
        policy: unsafe { libc::sched_getscheduler(0) },
    }
}

/// Create a worker with `config` and return the placement its thread had while loading
#[cfg(target_os = "linux")]
fn placement_on_worker(config: &WorkerContextConfig) -> ThreadPlacement {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let mut loader = MockLoader::new();
    loader.expect_load().times(1).returning(move |_, _| {
        *sink.lock().unwrap() = Some(current_placement());
        Ok(Box::new(length_engine()))
    });

    let mut worker = WorkerContext::create("placed.model", 0, config, Arc::new(loader)).unwrap();
    worker.terminate();
    let placement = seen.lock().unwrap().take();
    placement.expect("loader ran on the worker thread")
}

#[cfg(target_os = "linux")]
#[test]
fn test_worker_thread_is_pinned() {
    let allowed = platform::current_affinity().unwrap();
    let cpu = *allowed.last().unwrap();

    let placement = placement_on_worker(&WorkerContextConfig::pinned(vec![cpu]));
    assert_eq!(placement.affinity, vec![cpu]);
    // Pinning alone leaves the inherited scheduling class
    assert_eq!(placement.policy, current_placement().policy);

    // The creating thread keeps its own mask
    assert_eq!(platform::current_affinity().unwrap(), allowed);
}

#[cfg(target_os = "linux")]
#[test]
fn test_worker_thread_gets_realtime_policy_when_permitted() {
    let cpu = platform::current_affinity().unwrap()[0];
    let config = WorkerContextConfig::realtime(vec![cpu], 10);

    // Whether the OS grants SCHED_FIFO depends on privileges; try it on a scratch thread
    let config_copy = config.clone();
    let permitted = std::thread::spawn(move || platform::apply_worker_context(&config_copy).is_ok())
        .join()
        .unwrap();

    let placement = placement_on_worker(&config);
    assert_eq!(placement.affinity, vec![cpu]);
    let expected = if permitted {
        libc::SCHED_FIFO
    } else {
        current_placement().policy
    };
    assert_eq!(placement.policy, expected);
}

#[cfg(target_os = "linux")]
#[test]
fn test_default_worker_config_reaches_worker_thread() {
    let config = PipelineConfig::with_workers(1);
    let context = &config.workers[0].context;
    let placement = placement_on_worker(context);
    assert_eq!(placement.affinity, context.cpu_affinity);
}
