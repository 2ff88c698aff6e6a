//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during analysis operations
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("Cannot decode input as PCM: {0}")]
    Decode(String),

    #[error("Empty sample buffer")]
    EmptyBuffer,

    #[error("Frame size must be positive, got {0}")]
    InvalidFrameSize(usize),

    #[error("Hop size {hop} invalid for frame size {frame}")]
    InvalidHopSize { hop: usize, frame: usize },

    #[error("Detection threshold must be in 0..=1, got {0}")]
    InvalidThreshold(f32),
}
