//! Display Waveform Summaries
//!
//! Produces the small peak-per-bucket waveform used by file browsers and
//! timeline views. This path never fails an analysis: when the source
//! cannot be interpreted as PCM the caller substitutes a synthetic
//! low-amplitude noise placeholder instead.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pcm::PcmBuffer;

/// Maximum number of points in a waveform summary
pub const MAX_WAVEFORM_POINTS: usize = 2000;

/// Peak amplitude of the synthetic placeholder waveform
const PLACEHOLDER_AMPLITUDE: f32 = 0.05;

/// Downsampled waveform for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformSummary {
    /// Peak absolute amplitude per bucket, at most [`MAX_WAVEFORM_POINTS`]
    pub points: Vec<f32>,
    /// Duration of the summarized audio in seconds
    pub duration_seconds: f32,
    /// Sample rate of the summarized audio
    pub sample_rate: u32,
    /// True when the points are a synthetic placeholder, not real audio
    pub synthetic: bool,
}

impl WaveformSummary {
    /// Summarize a PCM buffer into at most `MAX_WAVEFORM_POINTS` points.
    ///
    /// Each point is the maximum absolute sample in its bucket, so short
    /// peaks survive downsampling.
    pub fn from_pcm(pcm: &PcmBuffer) -> Self {
        let samples = pcm.samples();
        let points_len = samples.len().min(MAX_WAVEFORM_POINTS);
        let samples_per_point = samples.len() / points_len;

        let points = (0..points_len)
            .map(|i| {
                let start = i * samples_per_point;
                let end = if i + 1 == points_len {
                    samples.len()
                } else {
                    start + samples_per_point
                };
                samples[start..end]
                    .iter()
                    .map(|s| s.abs())
                    .fold(0.0f32, f32::max)
            })
            .collect();

        Self {
            points,
            duration_seconds: pcm.duration_seconds(),
            sample_rate: pcm.sample_rate(),
            synthetic: false,
        }
    }

    /// Synthetic low-amplitude noise placeholder for undecodable sources
    pub fn placeholder(duration_seconds: f32, sample_rate: u32) -> Self {
        let mut rng = rand::rng();
        let points = (0..MAX_WAVEFORM_POINTS)
            .map(|_| rng.random_range(0.0..PLACEHOLDER_AMPLITUDE))
            .collect();

        Self {
            points,
            duration_seconds,
            sample_rate,
            synthetic: true,
        }
    }
}
