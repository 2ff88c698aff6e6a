//! Analysis and Coordinator Configuration

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Feature-extraction configuration for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analysis frame size in samples
    pub frame_size: usize,

    /// Hop between frames in samples (must not exceed the frame size)
    pub hop_size: usize,

    /// Transient detection threshold on the normalized flux curve, 0-1
    pub transient_threshold: f32,

    /// Version tag distinguishing algorithm revisions in the cache key space
    pub analysis_version: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            transient_threshold: 0.1,
            analysis_version: "1.0".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Hop duration in seconds at the given sample rate
    pub fn hop_seconds(&self, sample_rate: u32) -> f32 {
        self.hop_size as f32 / sample_rate as f32
    }

    /// Validate configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.frame_size == 0 {
            return Err(CoreError::Validation("frame_size must be positive".into()));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(CoreError::Validation(format!(
                "hop_size {} invalid for frame_size {}",
                self.hop_size, self.frame_size
            )));
        }
        if !(0.0..=1.0).contains(&self.transient_threshold) {
            return Err(CoreError::Validation(format!(
                "transient_threshold must be in 0..=1, got {}",
                self.transient_threshold
            )));
        }
        if self.analysis_version.is_empty() {
            return Err(CoreError::Validation("analysis_version must be set".into()));
        }
        Ok(())
    }
}

/// Job coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Idle sleep between queue polls, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Validation(
                "poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
