//! Error handling for the pose pipeline
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the worker, pool and controller layers.

use thiserror::Error;

/// Main error type for pose pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The worker context was terminated; no further handshakes are possible
    #[error("Worker context for device {device_id} is terminated")]
    Terminated { device_id: u32 },

    /// Loading the model or binding the device failed during worker start-up
    #[error("Worker initialization failed on device {device_id}: {message}")]
    InitFailed { device_id: u32, message: String },

    /// The inference engine reported an error for a single invocation
    #[error("Inference error: {0}")]
    Engine(String),

    /// The worker thread went away while a result was pending
    #[error("Worker for device {device_id} exited unexpectedly")]
    WorkerLost { device_id: u32 },

    /// Submit/collect alternation was violated by the caller
    #[error("Handshake violation on device {device_id}: {message}")]
    Handshake { device_id: u32, message: String },

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by a frame source
    #[error("Frame source error: {0}")]
    Source(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True if this error (or the error it wraps) is a terminated-context error
    pub fn is_terminated(&self) -> bool {
        match self {
            PipelineError::Terminated { .. } => true,
            PipelineError::WithContext { source, .. } => source.is_terminated(),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for PipelineError {
    fn from(err: toml::ser::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

/// Result type alias for pose pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Terminated { device_id: 1 };
        assert_eq!(err.to_string(), "Worker context for device 1 is terminated");
    }

    #[test]
    fn test_error_with_context() {
        let err = PipelineError::Engine("bad tensor".to_string());
        let with_ctx = err.with_context("Failed to step pool");
        assert!(with_ctx.to_string().contains("Failed to step pool"));
        assert!(with_ctx.to_string().contains("bad tensor"));
    }

    #[test]
    fn test_is_terminated_sees_through_context() {
        let err = PipelineError::Terminated { device_id: 0 }.with_context("collect");
        assert!(err.is_terminated());
        assert!(!PipelineError::Config("x".into()).is_terminated());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(PipelineError::Source("camera gone".into()));
        let err = result.context("reading frame").unwrap_err();
        assert!(err.to_string().starts_with("reading frame"));
    }
}
