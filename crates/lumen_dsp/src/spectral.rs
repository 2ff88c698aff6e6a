//! Spectral Frame Analyzer
//!
//! Windows a PCM buffer into overlapping frames and computes per-frame
//! scalar features (RMS, spectral centroid, loudness proxy, spectral flux,
//! coarse band energies) plus a magnitude spectrum per frame.
//!
//! After the frame loop every scalar sequence is normalized by its own
//! run-wide maximum, so feature values are relative to the clip rather than
//! absolute. The raw RMS and centroid-in-Hz sequences are kept alongside the
//! normalized tracks because the mapping evaluator needs absolute values.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::pcm::PcmBuffer;
use crate::window::HannWindow;

/// Default analysis frame size in samples
pub const FRAME_SIZE: usize = 1024;

/// Default hop size in samples (50% overlap)
pub const HOP_SIZE: usize = 512;

/// Band split points for the coarse bass/mid/treble energies (Hz)
const BASS_CUTOFF_HZ: f32 = 200.0;
const MID_CUTOFF_HZ: f32 = 2000.0;

/// Per-frame feature sequences, normalized by their run-wide maximum.
///
/// All vectors have the same length; index `i` of every sequence
/// corresponds to time `i * hop_seconds`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureTracks {
    /// Root-mean-square energy per frame
    pub rms: Vec<f32>,
    /// Spectral centroid per frame
    pub spectral_centroid: Vec<f32>,
    /// Loudness proxy per frame (RMS, not true perceptual loudness)
    pub loudness: Vec<f32>,
    /// Half-wave rectified spectral flux per frame
    pub spectral_flux: Vec<f32>,
    /// Frame RMS when the centroid falls below 200 Hz, else 0
    pub bass: Vec<f32>,
    /// Frame RMS when the centroid is in 200-2000 Hz, else 0
    pub mid: Vec<f32>,
    /// Frame RMS when the centroid is at or above 2000 Hz, else 0
    pub treble: Vec<f32>,
}

impl FeatureTracks {
    /// Number of frames in every sequence
    pub fn len(&self) -> usize {
        self.rms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }
}

/// Complete output of one analysis run
#[derive(Debug, Clone)]
pub struct SpectralAnalysis {
    /// Run-max normalized feature sequences
    pub tracks: FeatureTracks,
    /// RMS per frame before normalization
    pub raw_rms: Vec<f32>,
    /// Spectral centroid per frame in Hz, before normalization
    pub raw_centroid_hz: Vec<f32>,
    /// Magnitude spectrum per frame (first frame_size/2 bins)
    pub spectra: Vec<Vec<f32>>,
    /// Sample rate of the analyzed buffer
    pub sample_rate: u32,
    /// Time between consecutive frames in seconds
    pub hop_seconds: f32,
}

impl SpectralAnalysis {
    /// Number of analysis frames
    pub fn frame_count(&self) -> usize {
        self.tracks.len()
    }
}

/// Frame-by-frame spectral feature extractor
///
/// Pure and single-threaded: one instance per analysis run (or reused
/// serially), no shared state. The FFT plan is built once at construction
/// and reused for every frame so results are numerically consistent within
/// a run.
pub struct SpectralAnalyzer {
    frame_size: usize,
    hop_size: usize,
    window: HannWindow,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralAnalyzer {
    /// Create an analyzer with the default 1024/512 framing
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FRAME_SIZE);
        Self {
            frame_size: FRAME_SIZE,
            hop_size: HOP_SIZE,
            window: HannWindow::new(FRAME_SIZE),
            fft,
        }
    }

    /// Create an analyzer with custom framing.
    ///
    /// Any positive frame size works; rustfft plans a mixed-radix transform
    /// for non-power-of-two sizes rather than degrading.
    pub fn with_framing(frame_size: usize, hop_size: usize) -> Result<Self, DspError> {
        if frame_size == 0 {
            return Err(DspError::InvalidFrameSize(frame_size));
        }
        if hop_size == 0 || hop_size > frame_size {
            return Err(DspError::InvalidHopSize {
                hop: hop_size,
                frame: frame_size,
            });
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);

        Ok(Self {
            frame_size,
            hop_size,
            window: HannWindow::new(frame_size),
            fft,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Analyze a PCM buffer into per-frame features.
    ///
    /// The final partial frame is dropped: a buffer of `len` samples yields
    /// `floor((len - frame_size) / hop_size) + 1` frames (0 when the buffer
    /// is shorter than one frame).
    pub fn analyze(&self, pcm: &PcmBuffer) -> SpectralAnalysis {
        let samples = pcm.samples();
        let sample_rate = pcm.sample_rate() as f32;
        let num_bins = self.frame_size / 2;
        let bin_width = sample_rate / self.frame_size as f32;

        let mut raw_rms = Vec::new();
        let mut raw_centroid_hz = Vec::new();
        let mut spectra: Vec<Vec<f32>> = Vec::new();
        let mut flux_track = Vec::new();
        let mut bass = Vec::new();
        let mut mid = Vec::new();
        let mut treble = Vec::new();

        let mut windowed = vec![0.0f32; self.frame_size];
        let mut fft_buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];

        let mut pos = 0;
        while pos + self.frame_size <= samples.len() {
            let frame = &samples[pos..pos + self.frame_size];

            // RMS on the unwindowed frame
            let rms = root_mean_square(frame);

            // Magnitude spectrum of the windowed frame
            self.window.apply(frame, &mut windowed);
            for (c, &s) in fft_buffer.iter_mut().zip(&windowed) {
                *c = Complex::new(s, 0.0);
            }
            self.fft.process(&mut fft_buffer);

            let spectrum: Vec<f32> = fft_buffer[..num_bins].iter().map(|c| c.norm()).collect();

            // Spectral flux: sum of positive bin differences vs. previous frame
            let flux = match spectra.last() {
                Some(prev) => half_wave_flux(&spectrum, prev),
                None => 0.0,
            };

            let centroid = spectral_centroid(&spectrum, bin_width);

            // Coarse band energies keyed off where the centroid sits
            let (b, m, t) = if centroid < BASS_CUTOFF_HZ {
                (rms, 0.0, 0.0)
            } else if centroid < MID_CUTOFF_HZ {
                (0.0, rms, 0.0)
            } else {
                (0.0, 0.0, rms)
            };

            raw_rms.push(rms);
            raw_centroid_hz.push(centroid);
            flux_track.push(flux);
            bass.push(b);
            mid.push(m);
            treble.push(t);
            spectra.push(spectrum);

            pos += self.hop_size;
        }

        let tracks = FeatureTracks {
            rms: normalize_by_max(&raw_rms),
            spectral_centroid: normalize_by_max(&raw_centroid_hz),
            loudness: normalize_by_max(&raw_rms),
            spectral_flux: normalize_by_max(&flux_track),
            bass: normalize_by_max(&bass),
            mid: normalize_by_max(&mid),
            treble: normalize_by_max(&treble),
        };

        SpectralAnalysis {
            tracks,
            raw_rms,
            raw_centroid_hz,
            spectra,
            sample_rate: pcm.sample_rate(),
            hop_seconds: self.hop_size as f32 / sample_rate,
        }
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS = sqrt(mean(sample^2))
pub(crate) fn root_mean_square(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Sum of positive magnitude differences between consecutive spectra
pub(crate) fn half_wave_flux(current: &[f32], previous: &[f32]) -> f32 {
    current
        .iter()
        .zip(previous)
        .map(|(c, p)| (c - p).max(0.0))
        .sum()
}

/// Magnitude-weighted mean bin frequency, 0 when the spectrum is silent
pub(crate) fn spectral_centroid(spectrum: &[f32], bin_width: f32) -> f32 {
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for (i, &mag) in spectrum.iter().enumerate() {
        weighted += i as f32 * bin_width * mag;
        total += mag;
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Divide every value by the sequence maximum; no-op when the max is 0
fn normalize_by_max(values: &[f32]) -> Vec<f32> {
    let max = values.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        values.iter().map(|v| v / max).collect()
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> PcmBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5
            })
            .collect();
        PcmBuffer::new(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_frame_count_two_second_clip() {
        // 2 seconds at 44.1kHz, 1024/512 framing -> exactly 171 frames
        let pcm = sine(440.0, 44100, 2.0);
        assert_eq!(pcm.len(), 88200);

        let analysis = SpectralAnalyzer::new().analyze(&pcm);
        assert_eq!(analysis.frame_count(), 171);
        assert_eq!(analysis.tracks.rms.len(), 171);
    }

    #[test]
    fn test_sequences_equal_length_and_bounded() {
        let pcm = sine(880.0, 44100, 1.0);
        let analysis = SpectralAnalyzer::new().analyze(&pcm);

        let n = analysis.tracks.len();
        assert_eq!(analysis.tracks.spectral_centroid.len(), n);
        assert_eq!(analysis.tracks.loudness.len(), n);
        assert_eq!(analysis.tracks.spectral_flux.len(), n);
        assert_eq!(analysis.tracks.bass.len(), n);
        assert_eq!(analysis.tracks.mid.len(), n);
        assert_eq!(analysis.tracks.treble.len(), n);
        assert_eq!(analysis.raw_rms.len(), n);
        assert_eq!(analysis.raw_centroid_hz.len(), n);
        assert_eq!(analysis.spectra.len(), n);

        for track in [
            &analysis.tracks.rms,
            &analysis.tracks.spectral_centroid,
            &analysis.tracks.loudness,
            &analysis.tracks.spectral_flux,
            &analysis.tracks.bass,
            &analysis.tracks.mid,
            &analysis.tracks.treble,
        ] {
            for &v in track.iter() {
                assert!((0.0..=1.0).contains(&v), "normalized value out of range: {v}");
            }
        }
    }

    #[test]
    fn test_rms_normalized_to_unit_max() {
        let pcm = sine(440.0, 44100, 2.0);
        let analysis = SpectralAnalyzer::new().analyze(&pcm);
        let max = analysis.tracks.rms.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_stays_zero() {
        let pcm = PcmBuffer::new(vec![0.0; 44100], 44100).unwrap();
        let analysis = SpectralAnalyzer::new().analyze(&pcm);
        assert!(analysis.tracks.rms.iter().all(|&v| v == 0.0));
        assert!(analysis.tracks.spectral_centroid.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_centroid_tracks_tone_frequency() {
        let pcm = sine(1000.0, 44100, 1.0);
        let analysis = SpectralAnalyzer::new().analyze(&pcm);

        // Interior frames of a steady 1kHz tone should center near 1kHz.
        // Bin width at 1024/44100 is ~43Hz, windowing smears a little.
        let mid_frame = analysis.raw_centroid_hz[analysis.frame_count() / 2];
        assert!(
            (mid_frame - 1000.0).abs() < 200.0,
            "centroid {mid_frame} too far from 1000Hz"
        );
    }

    #[test]
    fn test_buffer_shorter_than_frame() {
        let pcm = PcmBuffer::new(vec![0.1; 100], 44100).unwrap();
        let analysis = SpectralAnalyzer::new().analyze(&pcm);
        assert_eq!(analysis.frame_count(), 0);
    }

    #[test]
    fn test_custom_framing_validation() {
        assert!(SpectralAnalyzer::with_framing(0, 1).is_err());
        assert!(SpectralAnalyzer::with_framing(1024, 0).is_err());
        assert!(SpectralAnalyzer::with_framing(1024, 2048).is_err());
        // Non-power-of-two sizes are fine (mixed-radix plan)
        assert!(SpectralAnalyzer::with_framing(1000, 500).is_ok());
    }

    #[test]
    fn test_flux_spikes_on_onset() {
        // Silence then a tone: the first tone frame should dominate the flux
        let sample_rate = 44100;
        let mut samples = vec![0.0f32; 22050];
        for i in 0..22050 {
            let t = i as f32 / sample_rate as f32;
            samples.push((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.8);
        }
        let pcm = PcmBuffer::new(samples, sample_rate).unwrap();
        let analysis = SpectralAnalyzer::new().analyze(&pcm);

        let peak_frame = analysis
            .tracks
            .spectral_flux
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let onset_frame = 22050 / HOP_SIZE;
        assert!(
            peak_frame.abs_diff(onset_frame) <= 2,
            "flux peak at frame {peak_frame}, onset near {onset_frame}"
        );
    }
}
