//! Chroma / Key Analyzer
//!
//! Folds magnitude spectra into 12-bin pitch-class (chroma) vectors,
//! determines a dominant pitch class and best-correlated key signature per
//! frame, and filters the per-frame candidates down to stable key segments.
//!
//! Key matching uses binary major-scale templates and dot-product
//! correlation. Ties go to the first-declared key in the table; this is
//! documented behavior, not a claim of musical optimality.

use serde::{Deserialize, Serialize};

/// Number of pitch classes (C, C#, D, ..., B)
pub const CHROMA_BINS: usize = 12;

/// Pitch class names for key labelling
pub const PITCH_CLASS_NAMES: [&str; CHROMA_BINS] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Frequency range folded into the chromagram (~C3 to C8)
const MIN_CHROMA_FREQ_HZ: f32 = 130.81;
const MAX_CHROMA_FREQ_HZ: f32 = 4186.01;

/// Minimum mean chroma energy for a frame to become a candidate event
const MIN_MEAN_ENERGY: f32 = 0.1;

/// Minimum span of a key segment before it is considered stable
const MIN_STABILITY_SECONDS: f32 = 0.1;

/// Dominant pitch classes within this distance merge into one segment
const PITCH_CLASS_TOLERANCE: i32 = 2;

/// Binary major-scale template (one bit per scale degree, rooted at C)
const MAJOR_KEY_PROFILE: [f32; CHROMA_BINS] =
    [1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

/// Common chord templates for the tonal-clarity utility
const CHORD_PATTERNS: [[f32; CHROMA_BINS]; 4] = [
    // Major triad
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
    // Minor triad
    [1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
    // Dominant 7th
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
    // Minor 7th
    [1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
];

/// A stable key/pitch segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromaEvent {
    /// Time of the frame in seconds
    pub timestamp: f32,
    /// Chroma vector normalized by its own maximum
    pub chroma: [f32; CHROMA_BINS],
    /// Dominant pitch-class index (0 = C .. 11 = B)
    pub pitch_class: usize,
    /// Mean chroma energy of the frame, in 0-1
    pub confidence: f32,
    /// Best-correlated key label, e.g. "A major"
    pub key_signature: String,
}

/// Harmonic-content summary of a single chroma vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicContent {
    /// How clearly one pitch class dominates, 0-1
    pub fundamental_strength: f32,
    /// Fraction of pitch classes active above 30% of the maximum
    pub harmonic_complexity: f32,
    /// Best correlation against the chord templates, 0-1
    pub tonal_clarity: f32,
}

/// Per-frame chromagram and key analysis
pub struct ChromaAnalyzer;

impl ChromaAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a sequence of magnitude spectra into candidate chroma events.
    ///
    /// `spectra` holds one half-spectrum per frame (as produced by the
    /// spectral analyzer); `hop_seconds` spaces the frame timestamps.
    /// Frames whose mean chroma energy is at or below 0.1 are skipped.
    /// The output is raw per-frame candidates; run [`stabilize`] to get the
    /// filtered stable segments.
    pub fn analyze(
        &self,
        spectra: &[Vec<f32>],
        sample_rate: u32,
        hop_seconds: f32,
    ) -> Vec<ChromaEvent> {
        let mut events = Vec::new();

        for (frame, spectrum) in spectra.iter().enumerate() {
            let Some(chroma) = fold_chroma(spectrum, sample_rate) else {
                continue;
            };

            let mean_energy = chroma.iter().sum::<f32>() / CHROMA_BINS as f32;
            if mean_energy <= MIN_MEAN_ENERGY {
                continue;
            }

            let pitch_class = dominant_pitch_class(&chroma);
            let key_signature = detect_key(&chroma);

            events.push(ChromaEvent {
                timestamp: frame as f32 * hop_seconds,
                chroma,
                pitch_class,
                confidence: mean_energy,
                key_signature,
            });
        }

        events
    }
}

impl Default for ChromaAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a magnitude half-spectrum into a max-normalized 12-bin chroma vector.
///
/// Bins outside the C3-C8 band are ignored. Returns None when no energy
/// lands in the band.
fn fold_chroma(spectrum: &[f32], sample_rate: u32) -> Option<[f32; CHROMA_BINS]> {
    if spectrum.is_empty() {
        return None;
    }
    // Half-spectrum: bin i covers i * sample_rate / (2 * len)
    let bin_width = sample_rate as f32 / (2.0 * spectrum.len() as f32);

    let mut chroma = [0.0f32; CHROMA_BINS];
    for (bin, &mag) in spectrum.iter().enumerate() {
        let freq = bin as f32 * bin_width;
        if !(MIN_CHROMA_FREQ_HZ..=MAX_CHROMA_FREQ_HZ).contains(&freq) {
            continue;
        }
        // A4 = 440Hz is pitch class 9; +9 re-anchors the fold at C
        let note = (12.0 * (freq / 440.0).log2() + 9.0).round() as i32;
        let pc = note.rem_euclid(CHROMA_BINS as i32) as usize;
        chroma[pc] += mag;
    }

    let max = chroma.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return None;
    }
    for v in &mut chroma {
        *v /= max;
    }
    Some(chroma)
}

/// Index of the strongest pitch class
fn dominant_pitch_class(chroma: &[f32; CHROMA_BINS]) -> usize {
    let mut best = 0;
    for (i, &v) in chroma.iter().enumerate() {
        if v > chroma[best] {
            best = i;
        }
    }
    best
}

/// Best-correlated major key over all 12 roots, first declared wins ties
fn detect_key(chroma: &[f32; CHROMA_BINS]) -> String {
    let mut best_root = 0;
    let mut best_correlation = f32::NEG_INFINITY;

    for root in 0..CHROMA_BINS {
        let correlation = correlate(chroma, &MAJOR_KEY_PROFILE, root);
        if correlation > best_correlation {
            best_correlation = correlation;
            best_root = root;
        }
    }

    format!("{} major", PITCH_CLASS_NAMES[best_root])
}

/// Dot product of a chroma vector with a template rotated to `root`
fn correlate(chroma: &[f32; CHROMA_BINS], profile: &[f32; CHROMA_BINS], root: usize) -> f32 {
    (0..CHROMA_BINS)
        .map(|i| chroma[i] * profile[(i + CHROMA_BINS - root) % CHROMA_BINS])
        .sum()
}

/// Filter candidate events down to stable key segments.
///
/// Consecutive candidates merge into one segment while the key matches and
/// the dominant pitch class stays within a small tolerance of the segment's
/// representative; each segment is represented by its highest-confidence
/// event. A segment spans from its first candidate to the start of the next
/// segment (the final segment extends to the end of input) and is dropped
/// when that span is shorter than 100 ms.
///
/// The pass repeats until the output stops shrinking, so the result is a
/// fixed point: running `stabilize` on its own output returns it unchanged.
pub fn stabilize(events: &[ChromaEvent]) -> Vec<ChromaEvent> {
    let mut current = events.to_vec();
    loop {
        let next = stabilize_once(&current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

fn stabilize_once(events: &[ChromaEvent]) -> Vec<ChromaEvent> {
    let Some(first) = events.first() else {
        return Vec::new();
    };

    // (segment start time, representative event)
    let mut segments: Vec<(f32, &ChromaEvent)> = Vec::new();
    let mut run_start = first.timestamp;
    let mut best = first;

    for event in &events[1..] {
        let pc_delta = (event.pitch_class as i32 - best.pitch_class as i32).abs();
        let compatible =
            event.key_signature == best.key_signature && pc_delta <= PITCH_CLASS_TOLERANCE;

        if compatible {
            if event.confidence > best.confidence {
                best = event;
            }
        } else {
            segments.push((run_start, best));
            run_start = event.timestamp;
            best = event;
        }
    }
    segments.push((run_start, best));

    let mut kept = Vec::new();
    for (i, &(start, representative)) in segments.iter().enumerate() {
        let span = match segments.get(i + 1) {
            Some(&(next_start, _)) => next_start - start,
            // The final segment persists to the end of the clip
            None => f32::INFINITY,
        };
        if span >= MIN_STABILITY_SECONDS {
            kept.push(representative.clone());
        }
    }

    kept
}

/// Summarize the harmonic content of one chroma vector
pub fn analyze_harmonic_content(chroma: &[f32; CHROMA_BINS]) -> HarmonicContent {
    let max = chroma.iter().cloned().fold(0.0f32, f32::max);
    let avg = chroma.iter().sum::<f32>() / CHROMA_BINS as f32;

    let fundamental_strength = ((max / (avg + 0.001)) / 3.0).min(1.0);

    let threshold = max * 0.3;
    let active = chroma.iter().filter(|&&v| v > threshold).count();
    let harmonic_complexity = active as f32 / CHROMA_BINS as f32;

    let mut tonal_clarity = 0.0f32;
    for pattern in &CHORD_PATTERNS {
        for root in 0..CHROMA_BINS {
            tonal_clarity = tonal_clarity.max(correlate(chroma, pattern, root));
        }
    }

    HarmonicContent {
        fundamental_strength,
        harmonic_complexity,
        tonal_clarity: tonal_clarity.min(1.0),
    }
}

/// Normalized Shannon entropy of the chroma distribution, 0-1.
///
/// 0 means all energy in a single pitch class; 1 means uniform spread.
pub fn harmonic_entropy(chroma: &[f32; CHROMA_BINS]) -> f32 {
    let total: f32 = chroma.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let entropy: f32 = chroma
        .iter()
        .map(|&v| v / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.log2())
        .sum();

    entropy / (CHROMA_BINS as f32).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Half-spectrum with a single magnitude spike at `freq` Hz
    fn tone_spectrum(freq: f32, sample_rate: u32, num_bins: usize) -> Vec<f32> {
        let bin_width = sample_rate as f32 / (2.0 * num_bins as f32);
        let mut spectrum = vec![0.0f32; num_bins];
        let bin = (freq / bin_width).round() as usize;
        spectrum[bin.min(num_bins - 1)] = 1.0;
        spectrum
    }

    fn event(timestamp: f32, pitch_class: usize, confidence: f32, key: &str) -> ChromaEvent {
        let mut chroma = [0.0f32; CHROMA_BINS];
        chroma[pitch_class] = 1.0;
        ChromaEvent {
            timestamp,
            chroma,
            pitch_class,
            confidence,
            key_signature: key.to_string(),
        }
    }

    #[test]
    fn test_fold_a4_to_pitch_class_a() {
        let spectrum = tone_spectrum(440.0, 44100, 512);
        let chroma = fold_chroma(&spectrum, 44100).unwrap();
        assert_eq!(dominant_pitch_class(&chroma), 9); // A
        assert_eq!(chroma[9], 1.0);
    }

    #[test]
    fn test_fold_c4_to_pitch_class_c() {
        let spectrum = tone_spectrum(261.63, 44100, 512);
        let chroma = fold_chroma(&spectrum, 44100).unwrap();
        assert_eq!(dominant_pitch_class(&chroma), 0); // C
    }

    #[test]
    fn test_out_of_band_energy_ignored() {
        // 60Hz hum is below C3 and must not contribute
        let spectrum = tone_spectrum(60.0, 44100, 512);
        assert!(fold_chroma(&spectrum, 44100).is_none());
    }

    #[test]
    fn test_key_detection_c_major_scale() {
        // All seven C-major scale degrees lit equally
        let mut chroma = [0.0f32; CHROMA_BINS];
        for pc in [0, 2, 4, 5, 7, 9, 11] {
            chroma[pc] = 1.0;
        }
        assert_eq!(detect_key(&chroma), "C major");
    }

    #[test]
    fn test_key_detection_tie_prefers_first_declared() {
        // A uniform vector correlates equally with every key
        let chroma = [1.0f32; CHROMA_BINS];
        assert_eq!(detect_key(&chroma), "C major");
    }

    #[test]
    fn test_weak_frames_skipped() {
        let analyzer = ChromaAnalyzer::new();

        // An A-minor chord spreads energy over three pitch classes, which
        // clears the mean-energy gate; a lone tone (1/12 mean) does not.
        let mut chord = vec![0.0f32; 512];
        let bin_width = 44100.0f32 / 1024.0;
        for (freq, mag) in [(440.0, 1.0f32), (261.63, 0.6), (329.63, 0.5)] {
            chord[(freq / bin_width).round() as usize] = mag;
        }
        let spectra = vec![
            chord,
            tone_spectrum(440.0, 44100, 512),
            vec![0.0f32; 512],
        ];

        let events = analyzer.analyze(&spectra, 44100, 0.0116);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pitch_class, 9);
        assert!(events[0].confidence > MIN_MEAN_ENERGY);
    }

    #[test]
    fn test_stabilize_discards_short_flicker() {
        // Stable C segment, a 1-frame flicker to F#, stable C again.
        // The flicker's span (one 11.6ms hop) is under 100ms.
        let mut events = Vec::new();
        for i in 0..20 {
            events.push(event(i as f32 * 0.0116, 0, 0.5, "C major"));
        }
        events.push(event(20.0 * 0.0116, 6, 0.9, "F# major"));
        for i in 21..40 {
            events.push(event(i as f32 * 0.0116, 0, 0.5, "C major"));
        }

        let stable = stabilize(&events);
        assert!(stable.iter().all(|e| e.key_signature == "C major"));
    }

    #[test]
    fn test_stabilize_keeps_highest_confidence_representative() {
        let mut events = Vec::new();
        for i in 0..20 {
            let confidence = if i == 7 { 0.95 } else { 0.4 };
            events.push(event(i as f32 * 0.0116, 0, confidence, "C major"));
        }

        let stable = stabilize(&events);
        assert_eq!(stable.len(), 1);
        assert!((stable[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_stabilize_idempotent() {
        let mut events = Vec::new();
        // Two genuine segments with some flicker between them
        for i in 0..15 {
            events.push(event(i as f32 * 0.02, 0, 0.4 + (i % 3) as f32 * 0.1, "C major"));
        }
        events.push(event(0.301, 6, 0.8, "F# major"));
        for i in 0..15 {
            events.push(event(0.32 + i as f32 * 0.02, 9, 0.5, "A major"));
        }

        let once = stabilize(&events);
        let twice = stabilize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stabilize_empty() {
        assert!(stabilize(&[]).is_empty());
    }

    #[test]
    fn test_harmonic_content_single_tone() {
        let mut chroma = [0.0f32; CHROMA_BINS];
        chroma[0] = 1.0;
        let content = analyze_harmonic_content(&chroma);
        assert!(content.fundamental_strength > 0.9);
        assert!((content.harmonic_complexity - 1.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_harmonic_content_major_triad() {
        let mut chroma = [0.0f32; CHROMA_BINS];
        chroma[0] = 1.0;
        chroma[4] = 0.8;
        chroma[7] = 0.9;
        let content = analyze_harmonic_content(&chroma);
        // A clean triad saturates the clarity measure
        assert_eq!(content.tonal_clarity, 1.0);
        assert_eq!(content.harmonic_complexity, 0.25);
    }

    #[test]
    fn test_harmonic_entropy_bounds() {
        let mut single = [0.0f32; CHROMA_BINS];
        single[3] = 1.0;
        assert_eq!(harmonic_entropy(&single), 0.0);

        let uniform = [1.0f32; CHROMA_BINS];
        assert!((harmonic_entropy(&uniform) - 1.0).abs() < 1e-6);

        assert_eq!(harmonic_entropy(&[0.0f32; CHROMA_BINS]), 0.0);
    }
}
