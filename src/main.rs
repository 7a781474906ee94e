//! Pose Pipeline - Demo Entry Point
//!
//! Runs a nose tracker on synthetic frames: it reports whenever the nose
//! crosses the vertical mid-line of the image and logs a timing summary every
//! few hundred frames. On exit (Ctrl-C or `run_seconds`) the timing table is
//! written to the configured export path.
//!
//! Usage: `pose-pipeline [config.toml]` (or set `POSE_PIPELINE_CONFIG`).

use anyhow::Context;
use pose_pipeline::{
    backend::EngineLoader,
    config::PipelineConfig,
    pipeline::PipelineController,
    source::{SyntheticPattern, SyntheticSource},
    types::{Frame, KeypointIndex, Pose},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the config file
const CONFIG_ENV: &str = "POSE_PIPELINE_CONFIG";

/// Granularity of the main loop
const TICK: Duration = Duration::from_millis(250);

/// Nose detections below this confidence are ignored
const MIN_NOSE_CONFIDENCE: f32 = 0.3;

/// Tracks which half of the image the nose is in
#[derive(Debug, Default)]
struct NoseTracker {
    left: bool,
}

impl NoseTracker {
    fn update(&mut self, frame: &Frame, pose: &Pose) {
        let nose = pose.get(KeypointIndex::Nose);
        if !nose.is_valid(MIN_NOSE_CONFIDENCE) {
            tracing::trace!(
                "Nose not found (average confidence {:.2})",
                pose.average_confidence()
            );
            return;
        }

        let left = nose.col < 0.5;
        if left != self.left {
            let (x, y) = nose.to_pixel(frame.width() as u32, frame.height() as u32);
            let half = if left { "left" } else { "right" };
            tracing::info!("Nose position changed to {} half of image at ({}, {})", half, x, y);
        }
        self.left = left;
    }
}

fn load_config() -> anyhow::Result<PipelineConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    let config = match path {
        Some(path) => {
            tracing::info!("Loading config from {}", path);
            PipelineConfig::load(&path).with_context(|| format!("Failed to load {}", path))?
        }
        None => PipelineConfig::load_or_default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(feature = "onnx")]
fn engine_loader() -> Arc<dyn EngineLoader> {
    tracing::info!("Using ONNX Runtime engine");
    Arc::new(pose_pipeline::backend::OnnxEngineLoader::default())
}

#[cfg(not(feature = "onnx"))]
fn engine_loader() -> Arc<dyn EngineLoader> {
    use pose_pipeline::backend::{MockEngineLoader, MockPosePattern};
    use pose_pipeline::types::FrameShape;

    tracing::info!("Using mock engine (build with --features onnx for ONNX Runtime)");
    Arc::new(
        MockEngineLoader::new(FrameShape::rgb(192, 192))
            .with_pattern(MockPosePattern::BrightestColumn)
            .with_latency(Duration::from_millis(12)),
    )
}

fn main() -> anyhow::Result<()> {
    // Log through a background writer so the controller thread never blocks on stderr
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pose_pipeline=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    tracing::info!("Starting pose pipeline");

    let config = load_config()?;
    tracing::info!(
        "{} workers, model {:?}, {} fps",
        config.workers.len(),
        config.model_path,
        config.source.fps
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, interrupted.clone())
        .context("Failed to install SIGTERM handler")?;

    let source = SyntheticSource::new(config.source.clone()).with_pattern(SyntheticPattern::MovingBar);
    let mut tracker = NoseTracker::default();
    let mut controller = PipelineController::from_config(
        &config,
        engine_loader(),
        Box::new(source),
        Box::new(move |frame, pose| tracker.update(frame, pose)),
    )?;
    controller.start()?;

    let deadline = config
        .run_seconds
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    let report_every = config.diagnostics.report_every;
    let mut next_report = report_every;

    println!("Entering main loop, press Ctrl-C to finish.");
    let outcome = loop {
        if interrupted.load(Ordering::SeqCst) {
            println!("terminating by user request");
            break Ok(());
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::info!("Run time elapsed");
            break Ok(());
        }

        if let Err(e) = controller.run_for(TICK) {
            break Err(e);
        }
        if !controller.stop_handle().load(Ordering::SeqCst) {
            // Source ended on its own
            break Ok(());
        }

        if report_every > 0 && controller.frames_handled() >= next_report {
            if let Some(summary) = controller.summary() {
                tracing::info!("{}", summary);
            }
            next_report = controller.frames_handled() + report_every;
        }
    };

    for (device_id, stats) in controller.pool().stats() {
        tracing::info!(
            "Device {}: {} inferences, {} failed, avg {:.0} us, jitter {} us",
            device_id,
            stats.completed,
            stats.failed,
            stats.avg_time_us(),
            stats.jitter_us()
        );
    }
    controller.terminate();

    if let Some(path) = &config.diagnostics.export_path {
        println!("saving time data to {}", path.display());
        controller
            .export_times(path, config.diagnostics.delimiter)
            .with_context(|| format!("Failed to export timing data to {}", path.display()))?;
    }

    outcome.context("Pipeline stopped with an error")?;
    tracing::info!("Pose pipeline shut down");
    Ok(())
}
