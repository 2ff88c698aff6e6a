//! Core Error Types

use thiserror::Error;

/// Errors that can occur in the analysis engine core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Analysis already cached for source '{source_id}' stem '{stem_role}'")]
    AlreadyExists {
        source_id: String,
        stem_role: String,
    },

    #[error("Job '{id}' cannot transition from {from}")]
    InvalidJobTransition { id: String, from: String },

    #[error("Job processing failed: {0}")]
    JobProcessing(String),

    #[error("Coordinator already running")]
    AlreadyRunning,

    #[error("Coordinator not running")]
    NotRunning,

    #[error("DSP error: {0}")]
    Dsp(#[from] lumen_dsp::DspError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
