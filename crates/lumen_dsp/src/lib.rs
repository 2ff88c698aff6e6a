//! Lumen DSP - Audio Feature Extraction Module
//!
//! This crate provides the signal-processing half of the Lumen analysis
//! engine, including:
//! - Frame-by-frame spectral feature extraction (RMS, centroid, flux)
//! - Spectral-flux transient detection with ADSR event synthesis
//! - Chromagram folding, key detection, and key-segment stabilization
//! - Display waveform summaries with a synthetic fallback
//!
//! # Architecture
//!
//! Everything here is pure and synchronous: analyzers take a validated
//! [`PcmBuffer`] and return plain data, holding no locks and touching no
//! shared state. Persistence, caching, and scheduling live in the core
//! crate.

mod chroma;
mod error;
mod pcm;
mod spectral;
mod transient;
mod waveform;
mod window;

pub use chroma::{
    analyze_harmonic_content, harmonic_entropy, stabilize, ChromaAnalyzer, ChromaEvent,
    HarmonicContent, CHROMA_BINS, PITCH_CLASS_NAMES,
};
pub use error::DspError;
pub use pcm::PcmBuffer;
pub use spectral::{
    FeatureTracks, SpectralAnalysis, SpectralAnalyzer, FRAME_SIZE, HOP_SIZE,
};
pub use transient::{
    AdsrEnvelope, TransientDetector, TransientEvent, DEFAULT_DETECTION_THRESHOLD,
    DETECTION_FRAME_SIZE, MIN_ONSET_INTERVAL_SECONDS,
};
pub use waveform::{WaveformSummary, MAX_WAVEFORM_POINTS};
