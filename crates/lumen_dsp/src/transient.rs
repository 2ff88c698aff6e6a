//! Transient Detector
//!
//! Onset detection via half-wave rectified spectral flux with an adaptive
//! local threshold, followed by event synthesis: each onset becomes a
//! discrete [`TransientEvent`] carrying amplitude, dominant frequency, an
//! estimated duration, a confidence score, and an ADSR envelope for the
//! mapping evaluator to shape.
//!
//! The detector runs its own framing (2048 samples, 75% overlap) directly
//! on the PCM buffer rather than reusing the feature analyzer's frames;
//! onset localization benefits from the denser hop.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::pcm::PcmBuffer;
use crate::spectral::{half_wave_flux, root_mean_square};
use crate::window::HannWindow;

/// Detection frame size in samples
pub const DETECTION_FRAME_SIZE: usize = 2048;

/// Default detection threshold on the max-normalized flux curve
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.1;

/// Minimum spacing between detected onsets in seconds
pub const MIN_ONSET_INTERVAL_SECONDS: f32 = 0.05;

/// Half-width of the adaptive threshold window in frames
const THRESHOLD_WINDOW_FRAMES: usize = 10;

/// Adaptive threshold multiplier over the local flux mean
const THRESHOLD_MULTIPLIER: f32 = 1.5;

/// Duration clamp bounds in seconds
const MIN_TRANSIENT_DURATION: f32 = 0.010;
const MAX_TRANSIENT_DURATION: f32 = 0.500;

/// Amplitude-shape model applied over time from an event's onset.
///
/// Times are in seconds; `sustain` is a 0-1 level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrEnvelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrEnvelope {
    /// Fixed default shape derived from an event's duration
    pub fn for_duration(duration: f32) -> Self {
        Self {
            attack: 0.01,
            decay: 0.3 * duration,
            sustain: 0.7,
            release: 0.5 * duration,
        }
    }

    /// Envelope level at `elapsed` seconds after the onset.
    ///
    /// Piecewise: ramp 0 to 1 over the attack, 1 down to the sustain level
    /// over the decay, sustain down to 0 over the release, 0 after. There
    /// is no hold phase.
    pub fn level_at(&self, elapsed: f32) -> f32 {
        if elapsed < 0.0 {
            return 0.0;
        }
        if elapsed < self.attack {
            return elapsed / self.attack;
        }
        let after_attack = elapsed - self.attack;
        if after_attack < self.decay {
            let progress = after_attack / self.decay;
            return 1.0 - progress * (1.0 - self.sustain);
        }
        let after_decay = after_attack - self.decay;
        if after_decay < self.release {
            let progress = after_decay / self.release;
            return self.sustain * (1.0 - progress);
        }
        0.0
    }
}

/// A detected percussive onset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientEvent {
    /// Onset time in seconds from the start of the buffer
    pub timestamp: f32,
    /// Absolute sample amplitude at the onset
    pub amplitude: f32,
    /// Dominant frequency in Hz from a re-analysis window around the onset
    pub frequency: f32,
    /// Estimated duration in seconds, clamped to 10-500 ms
    pub duration: f32,
    /// Detection confidence in 0-1
    pub confidence: f32,
    /// Envelope shape for playback-time evaluation
    pub envelope: AdsrEnvelope,
}

/// Spectral-flux onset detector
pub struct TransientDetector {
    frame_size: usize,
    hop_size: usize,
    window: HannWindow,
    fft: Arc<dyn Fft<f32>>,
}

impl TransientDetector {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(DETECTION_FRAME_SIZE);
        Self {
            frame_size: DETECTION_FRAME_SIZE,
            // 75% overlap
            hop_size: DETECTION_FRAME_SIZE / 4,
            window: HannWindow::new(DETECTION_FRAME_SIZE),
            fft,
        }
    }

    /// Detect transients with the default threshold
    pub fn detect(&self, pcm: &PcmBuffer) -> Result<Vec<TransientEvent>, DspError> {
        self.detect_with_threshold(pcm, DEFAULT_DETECTION_THRESHOLD)
    }

    /// Detect transients, gating onsets below `threshold` on the
    /// max-normalized flux curve. `threshold` must be in 0..=1.
    pub fn detect_with_threshold(
        &self,
        pcm: &PcmBuffer,
        threshold: f32,
    ) -> Result<Vec<TransientEvent>, DspError> {
        if !(0.0..=1.0).contains(&threshold) || !threshold.is_finite() {
            return Err(DspError::InvalidThreshold(threshold));
        }

        let flux = self.spectral_flux(pcm);
        let onset_frames = self.pick_onsets(&flux, threshold, pcm.sample_rate());

        let events = onset_frames
            .into_iter()
            .map(|frame| self.synthesize_event(pcm, frame))
            .collect();
        Ok(events)
    }

    /// Half-wave rectified spectral flux per frame (frame 0 is 0)
    fn spectral_flux(&self, pcm: &PcmBuffer) -> Vec<f32> {
        let samples = pcm.samples();
        let num_bins = self.frame_size / 2;

        let mut flux = Vec::new();
        let mut previous: Option<Vec<f32>> = None;
        let mut windowed = vec![0.0f32; self.frame_size];
        let mut fft_buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];

        let mut pos = 0;
        while pos + self.frame_size <= samples.len() {
            self.window.apply(&samples[pos..pos + self.frame_size], &mut windowed);
            for (c, &s) in fft_buffer.iter_mut().zip(&windowed) {
                *c = Complex::new(s, 0.0);
            }
            self.fft.process(&mut fft_buffer);
            let spectrum: Vec<f32> = fft_buffer[..num_bins].iter().map(|c| c.norm()).collect();

            flux.push(match &previous {
                Some(prev) => half_wave_flux(&spectrum, prev),
                None => 0.0,
            });
            previous = Some(spectrum);
            pos += self.hop_size;
        }

        flux
    }

    /// Peak-pick onset frames from the flux curve.
    ///
    /// A frame is an onset when its normalized flux exceeds both the fixed
    /// detection threshold and the adaptive local threshold, it is a strict
    /// local maximum, and it is at least the minimum inter-onset interval
    /// after the previous accepted onset.
    fn pick_onsets(&self, flux: &[f32], threshold: f32, sample_rate: u32) -> Vec<usize> {
        let max_flux = flux.iter().cloned().fold(0.0f32, f32::max);
        if max_flux <= 0.0 {
            return Vec::new();
        }
        let norm: Vec<f32> = flux.iter().map(|f| f / max_flux).collect();

        let min_interval = (MIN_ONSET_INTERVAL_SECONDS * sample_rate as f32
            / self.hop_size as f32)
            .ceil() as usize;

        let mut onsets = Vec::new();
        let mut last_onset: Option<usize> = None;

        for i in 1..norm.len().saturating_sub(1) {
            // Adaptive threshold: local mean over +/-10 frames, scaled
            let start = i.saturating_sub(THRESHOLD_WINDOW_FRAMES);
            let end = (i + THRESHOLD_WINDOW_FRAMES + 1).min(norm.len());
            let local_mean: f32 = norm[start..end].iter().sum::<f32>() / (end - start) as f32;
            let adaptive = local_mean * THRESHOLD_MULTIPLIER;

            let is_peak = norm[i] > adaptive
                && norm[i] > threshold
                && norm[i] > norm[i - 1]
                && norm[i] > norm[i + 1];

            if is_peak {
                let spaced = match last_onset {
                    Some(prev) => i - prev >= min_interval,
                    None => true,
                };
                if spaced {
                    onsets.push(i);
                    last_onset = Some(i);
                }
            }
        }

        onsets
    }

    /// Build a full event from an onset frame index
    fn synthesize_event(&self, pcm: &PcmBuffer, onset_frame: usize) -> TransientEvent {
        let samples = pcm.samples();
        let sample_rate = pcm.sample_rate() as f32;
        let onset_index = (onset_frame * self.hop_size).min(samples.len() - 1);
        let timestamp = onset_index as f32 / sample_rate;

        let amplitude = samples[onset_index].abs();
        let duration = self.estimate_duration(samples, onset_index, sample_rate);
        let frequency = self.dominant_frequency(samples, onset_index, sample_rate);
        let confidence = self.confidence(samples, onset_index, duration, sample_rate);

        TransientEvent {
            timestamp,
            amplitude,
            frequency,
            duration,
            confidence,
            envelope: AdsrEnvelope::for_duration(duration),
        }
    }

    /// Scan forward until the signal drops below 10% of the onset peak
    fn estimate_duration(&self, samples: &[f32], onset_index: usize, sample_rate: f32) -> f32 {
        let peak = samples[onset_index].abs();
        let floor = peak * 0.1;
        let max_samples = (MAX_TRANSIENT_DURATION * sample_rate) as usize;
        let end = (onset_index + max_samples).min(samples.len());

        let mut duration = MAX_TRANSIENT_DURATION;
        for i in onset_index + 1..end {
            if samples[i].abs() < floor {
                duration = (i - onset_index) as f32 / sample_rate;
                break;
            }
        }
        duration.clamp(MIN_TRANSIENT_DURATION, MAX_TRANSIENT_DURATION)
    }

    /// Magnitude-spectrum peak of a window centered on the onset
    fn dominant_frequency(&self, samples: &[f32], onset_index: usize, sample_rate: f32) -> f32 {
        let start = onset_index.saturating_sub(self.frame_size / 2);
        let end = (start + self.frame_size).min(samples.len());

        // Zero-pad when the window runs past the end of the buffer
        let mut fft_buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];
        let mut windowed = vec![0.0f32; end - start];
        let frame = &samples[start..end];
        let window = HannWindow::new(frame.len());
        window.apply(frame, &mut windowed);
        for (c, &s) in fft_buffer.iter_mut().zip(&windowed) {
            *c = Complex::new(s, 0.0);
        }
        self.fft.process(&mut fft_buffer);

        let num_bins = self.frame_size / 2;
        let peak_bin = fft_buffer[1..num_bins]
            .iter()
            .map(|c| c.norm())
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i + 1)
            .unwrap_or(0);

        peak_bin as f32 * sample_rate / self.frame_size as f32
    }

    /// Crest-like confidence: peak over post-onset sustain energy
    fn confidence(
        &self,
        samples: &[f32],
        onset_index: usize,
        duration: f32,
        sample_rate: f32,
    ) -> f32 {
        let span = ((duration * sample_rate) as usize).max(1);
        let end = (onset_index + span).min(samples.len());
        let post_onset = &samples[onset_index..end];

        let peak = post_onset.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let sustain_energy = root_mean_square(post_onset);

        (peak / (sustain_energy + 1e-6) / 10.0).clamp(0.0, 1.0)
    }
}

impl Default for TransientDetector {
    fn default() -> Self {
        Self::new()
    }
}
