//! Analysis Pipeline
//!
//! Glues decoding, feature extraction, event detection, and the cache into
//! one flow, and adapts that flow to the job queue via [`PipelineProcessor`].
//!
//! Feature extraction failures propagate so the job is marked failed.
//! Waveform display is the one place that degrades instead: if the source
//! cannot be loaded, a synthetic placeholder keeps the UI timeline alive.

use std::sync::Arc;

use lumen_dsp::{
    stabilize, ChromaAnalyzer, PcmBuffer, SpectralAnalyzer, TransientDetector, WaveformSummary,
};
use tracing::{info, warn};

use crate::cache::{AnalysisCache, EventRecord};
use crate::config::AnalysisConfig;
use crate::coordinator::JobProcessor;
use crate::error::CoreResult;
use crate::features::{AnalysisRecord, AudioFeatureSet};
use crate::job::{AnalysisJob, JobKind};
use crate::mapping::AudioEventData;

/// Provides decoded PCM for a (source, stem) pair
pub trait PcmSource: Send + Sync {
    fn load(&self, source_id: &str, stem_role: &str) -> CoreResult<PcmBuffer>;
}

/// Splits a source into stems ahead of per-stem analysis
pub trait StemSeparator: Send + Sync {
    fn separate(&self, job: &AnalysisJob) -> CoreResult<()>;
}

/// Runs the full analysis flow for one stem and caches the results
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    cache: Arc<AnalysisCache>,
    source: Arc<dyn PcmSource>,
}

impl AnalysisPipeline {
    pub fn new(
        config: AnalysisConfig,
        cache: Arc<AnalysisCache>,
        source: Arc<dyn PcmSource>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache,
            source,
        })
    }

    /// Analyze one stem and cache both the feature artifact and the events.
    ///
    /// Returns the cached record. An existing artifact for the same
    /// (source, stem) is replaced.
    pub fn analyze_and_cache(
        &self,
        user_id: &str,
        source_id: &str,
        stem_role: &str,
    ) -> CoreResult<AnalysisRecord> {
        let pcm = self.source.load(source_id, stem_role)?;
        info!(
            source_id,
            stem_role,
            seconds = pcm.duration_seconds(),
            "analyzing stem"
        );

        let analyzer = SpectralAnalyzer::with_framing(self.config.frame_size, self.config.hop_size)?;
        let analysis = analyzer.analyze(&pcm);

        let transients = TransientDetector::new()
            .detect_with_threshold(&pcm, self.config.transient_threshold)?;
        let candidates = ChromaAnalyzer::new().analyze(
            &analysis.spectra,
            analysis.sample_rate,
            analysis.hop_seconds,
        );
        let chroma = stabilize(&candidates);

        let record = AnalysisRecord {
            features: AudioFeatureSet::from_analysis(
                source_id,
                stem_role,
                self.config.analysis_version.clone(),
                &analysis,
            )?,
            waveform: WaveformSummary::from_pcm(&pcm),
        };
        self.cache.refresh(user_id, &record)?;

        let events = EventRecord {
            analysis_version: self.config.analysis_version.clone(),
            data: AudioEventData {
                transients,
                chroma,
                rms: analysis.raw_rms.clone(),
                centroid_hz: analysis.raw_centroid_hz.clone(),
                hop_seconds: analysis.hop_seconds,
            },
        };
        self.cache.put_events(user_id, source_id, stem_role, &events)?;

        Ok(record)
    }

    /// Cached events for a stem, if analyzed under the current version
    pub fn cached_events(
        &self,
        user_id: &str,
        source_id: &str,
        stem_role: &str,
    ) -> CoreResult<Option<EventRecord>> {
        self.cache
            .get_events(user_id, source_id, stem_role, &self.config.analysis_version)
    }

    /// Display waveform for a stem. Never fails on an unreadable source;
    /// falls back to a synthetic placeholder instead.
    pub fn waveform(
        &self,
        source_id: &str,
        stem_role: &str,
        fallback_duration: f32,
        fallback_rate: u32,
    ) -> WaveformSummary {
        match self.source.load(source_id, stem_role) {
            Ok(pcm) => WaveformSummary::from_pcm(&pcm),
            Err(e) => {
                warn!(source_id, stem_role, "waveform falling back to placeholder: {e}");
                WaveformSummary::placeholder(fallback_duration, fallback_rate)
            }
        }
    }
}

/// Adapts the pipeline (and a stem separator) to the coordinator's
/// [`JobProcessor`] interface
pub struct PipelineProcessor {
    pipeline: AnalysisPipeline,
    separator: Arc<dyn StemSeparator>,
}

impl PipelineProcessor {
    pub fn new(pipeline: AnalysisPipeline, separator: Arc<dyn StemSeparator>) -> Self {
        Self {
            pipeline,
            separator,
        }
    }
}

impl JobProcessor for PipelineProcessor {
    fn process(&mut self, job: &AnalysisJob) -> CoreResult<()> {
        match job.kind {
            JobKind::StemSeparation => self.separator.separate(job),
            JobKind::AudioAnalysis => {
                self.pipeline
                    .analyze_and_cache(&job.user_id, &job.source_id, &job.stem_role)?;
                Ok(())
            }
        }
    }
}
