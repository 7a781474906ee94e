//! Configuration module for the pose pipeline
//!
//! This module handles pipeline configuration:
//! - Model path and the list of accelerator workers
//! - Frame source settings (rate, capture size, crop, pixel format)
//! - Diagnostics settings (timing ring capacity, export)
//!
//! # Config Location
//!
//! When no path is given, the configuration is read from the platform config
//! directory under `pose-pipeline`:
//!
//! - **Linux**: `~/.config/pose-pipeline/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/pose-pipeline/pipeline.toml`
//! - **Windows**: `%APPDATA%\pose-pipeline\pipeline.toml`
//!
//! Files ending in `.json` are read and written as JSON, everything else as TOML.
//!
//! # Example
//!
//! ```ignore
//! use pose_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::load("pipeline.toml")?;
//! config.validate()?;
//! println!("{} workers on {}", config.workers.len(), config.model_path.display());
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "pose-pipeline";

/// Config filename inside the app config directory
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default model file name
pub const DEFAULT_MODEL_PATH: &str = "movenet_single_pose_lightning.onnx";

/// Default number of accelerator workers
pub const DEFAULT_WORKER_COUNT: u32 = 2;

/// Upper bound on workers in one pool
pub const MAX_WORKERS: usize = 16;

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|p| p.join(CONFIG_FILE))
}

/// One accelerator worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Accelerator device index
    pub device_id: u32,

    /// Thread placement for this worker
    #[serde(default, flatten)]
    pub context: WorkerContextConfig,
}

impl WorkerConfig {
    pub fn new(device_id: u32) -> Self {
        Self {
            device_id,
            context: WorkerContextConfig::default(),
        }
    }

    /// Worker on `device_id` placed on the `index`-th reserved CPU
    pub fn reserved(device_id: u32, index: usize) -> Self {
        Self::new(device_id).with_context(WorkerContextConfig::reserved(index))
    }

    pub fn with_context(mut self, context: WorkerContextConfig) -> Self {
        self.context = context;
        self
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model file loaded by every worker
    pub model_path: PathBuf,

    /// Stop after this many seconds (None = run until stopped)
    #[serde(default)]
    pub run_seconds: Option<f64>,

    /// Workers in initial rotation order
    pub workers: Vec<WorkerConfig>,

    /// Frame source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Diagnostics settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            run_seconds: None,
            workers: reserved_workers(DEFAULT_WORKER_COUNT),
            source: SourceConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Default config with `count` workers on devices `0..count`
    pub fn with_workers(count: u32) -> Self {
        Self {
            workers: reserved_workers(count),
            ..Self::default()
        }
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content).map_err(|e| {
            PipelineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check the config for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(PipelineError::Config(
                "at least one worker is required".to_string(),
            ));
        }
        if self.workers.len() > MAX_WORKERS {
            return Err(PipelineError::Config(format!(
                "{} workers configured, at most {} supported",
                self.workers.len(),
                MAX_WORKERS
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if !seen.insert(worker.device_id) {
                return Err(PipelineError::Config(format!(
                    "device {} is assigned to more than one worker",
                    worker.device_id
                )));
            }
        }

        let shape = self.source.output_shape();
        if shape.height == 0 || shape.width == 0 {
            return Err(PipelineError::Config(format!(
                "crop {:?} leaves no pixels of a {}x{} capture",
                self.source.crop, self.source.height, self.source.width
            )));
        }

        if self.diagnostics.capacity == 0 {
            return Err(PipelineError::Config(
                "diagnostics capacity must be non-zero".to_string(),
            ));
        }

        if let Some(secs) = self.run_seconds {
            if !secs.is_finite() || secs < 0.0 {
                return Err(PipelineError::Config(format!(
                    "run_seconds must be a non-negative number, got {}",
                    secs
                )));
            }
        }

        Ok(())
    }

    /// Device indices in rotation order
    pub fn device_ids(&self) -> Vec<u32> {
        self.workers.iter().map(|w| w.device_id).collect()
    }
}

fn reserved_workers(count: u32) -> Vec<WorkerConfig> {
    (0..count)
        .map(|device_id| WorkerConfig::reserved(device_id, device_id as usize))
        .collect()
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
