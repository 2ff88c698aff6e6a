//! Persisted Analysis Artifacts
//!
//! [`AudioFeatureSet`] is the per-(source, stem) feature artifact: one value
//! per analysis frame for every track, all tracks equal length, frame `i`
//! of every track at time `i * hop_seconds`. Artifacts are created once per
//! successful analysis and never mutated; re-analysis under a new version
//! tag supersedes rather than updates.

use chrono::{DateTime, Utc};
use lumen_dsp::{FeatureTracks, SpectralAnalysis, WaveformSummary};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The persisted analysis artifact for one (source, stem role) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFeatureSet {
    pub source_id: String,
    pub stem_role: String,
    pub analysis_version: String,
    pub sample_rate: u32,
    /// Time between consecutive frames in seconds
    pub hop_seconds: f32,
    /// Run-max normalized per-frame feature sequences
    pub tracks: FeatureTracks,
    /// Magnitude spectrum per frame
    pub spectra: Vec<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl AudioFeatureSet {
    /// Assemble an artifact from a completed analysis run.
    ///
    /// Enforces the equal-length invariant across every sequence; the
    /// analyzer upholds it by construction, so a violation here means the
    /// analysis output was corrupted in transit.
    pub fn from_analysis(
        source_id: impl Into<String>,
        stem_role: impl Into<String>,
        analysis_version: impl Into<String>,
        analysis: &SpectralAnalysis,
    ) -> CoreResult<Self> {
        let artifact = Self {
            source_id: source_id.into(),
            stem_role: stem_role.into(),
            analysis_version: analysis_version.into(),
            sample_rate: analysis.sample_rate,
            hop_seconds: analysis.hop_seconds,
            tracks: analysis.tracks.clone(),
            spectra: analysis.spectra.clone(),
            created_at: Utc::now(),
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Number of analysis frames
    pub fn frame_count(&self) -> usize {
        self.tracks.len()
    }

    /// Time of frame `i` in seconds
    pub fn frame_time(&self, i: usize) -> f32 {
        i as f32 * self.hop_seconds
    }

    /// Check the equal-length invariant across all sequences
    pub fn validate(&self) -> CoreResult<()> {
        let n = self.tracks.rms.len();
        let lengths = [
            self.tracks.spectral_centroid.len(),
            self.tracks.loudness.len(),
            self.tracks.spectral_flux.len(),
            self.tracks.bass.len(),
            self.tracks.mid.len(),
            self.tracks.treble.len(),
            self.spectra.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(CoreError::Validation(format!(
                "feature sequences have unequal lengths (rms has {n} frames)"
            )));
        }
        if self.hop_seconds <= 0.0 {
            return Err(CoreError::Validation(format!(
                "hop_seconds must be positive, got {}",
                self.hop_seconds
            )));
        }
        Ok(())
    }
}

/// Feature artifact plus its display waveform, stored together in the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub features: AudioFeatureSet,
    pub waveform: WaveformSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_dsp::{PcmBuffer, SpectralAnalyzer};

    fn sample_analysis() -> SpectralAnalysis {
        let samples: Vec<f32> = (0..44100)
            .map(|i| (i as f32 * 0.05).sin() * 0.4)
            .collect();
        let pcm = PcmBuffer::new(samples, 44100).unwrap();
        SpectralAnalyzer::new().analyze(&pcm)
    }

    #[test]
    fn test_from_analysis() {
        let analysis = sample_analysis();
        let artifact =
            AudioFeatureSet::from_analysis("file-1", "master", "1.0", &analysis).unwrap();

        assert_eq!(artifact.frame_count(), analysis.frame_count());
        assert_eq!(artifact.sample_rate, 44100);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_frame_time() {
        let analysis = sample_analysis();
        let artifact =
            AudioFeatureSet::from_analysis("file-1", "master", "1.0", &analysis).unwrap();
        let t = artifact.frame_time(10);
        assert!((t - 10.0 * artifact.hop_seconds).abs() < 1e-6);
    }

    #[test]
    fn test_unequal_lengths_rejected() {
        let analysis = sample_analysis();
        let mut artifact =
            AudioFeatureSet::from_analysis("file-1", "master", "1.0", &analysis).unwrap();
        artifact.tracks.loudness.pop();
        assert!(matches!(
            artifact.validate(),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let analysis = sample_analysis();
        let artifact =
            AudioFeatureSet::from_analysis("file-1", "vocals", "1.0", &analysis).unwrap();

        let json = serde_json::to_string(&artifact).unwrap();
        let back: AudioFeatureSet = serde_json::from_str(&json).unwrap();

        assert_eq!(back.source_id, "file-1");
        assert_eq!(back.stem_role, "vocals");
        assert_eq!(back.frame_count(), artifact.frame_count());
        assert_eq!(back.tracks.rms, artifact.tracks.rms);
    }
}
