//! Event-Based Parameter Mapping
//!
//! Maps analyzed audio features onto visual parameter values at arbitrary
//! playback times. A mapping binds one event source to one target parameter
//! with a transform curve, an output range, and a sensitivity percentage.
//! Evaluation is pure: same mapping, same event data, same timestamp gives
//! the same value.

use lumen_dsp::{AdsrEnvelope, ChromaEvent, TransientEvent};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Which analyzed signal drives a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Transient onsets shaped by an ADSR envelope
    Transient,
    /// Dominant pitch class of the most recent chroma event
    Chroma,
    /// Frame RMS level
    Volume,
    /// Spectral centroid mapped against an 8 kHz ceiling
    Brightness,
}

/// Curve applied to the sensitivity-scaled source value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Linear,
    Exponential,
    Logarithmic,
    /// Identity at the transform stage; envelope shaping happens at the
    /// source when the driving event is dispatched
    Envelope,
}

/// One mapping from an audio event source to a visual parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMapping {
    pub id: String,
    pub source: EventSource,
    pub target_parameter: String,
    pub transform: Transform,
    /// Output range (min, max); min may exceed max for inverted mappings
    pub range: (f64, f64),
    /// Percentage, 0-100; 100 is unity
    pub sensitivity: u8,
    /// Overrides the per-event envelope for transient sources when set
    pub envelope: Option<AdsrEnvelope>,
    pub enabled: bool,
}

impl EventMapping {
    pub fn new(
        id: impl Into<String>,
        source: EventSource,
        target_parameter: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            target_parameter: target_parameter.into(),
            transform: Transform::Linear,
            range: (0.0, 1.0),
            sensitivity: 100,
            envelope: None,
            enabled: true,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.id.is_empty() {
            return Err(CoreError::Validation("mapping id must be set".into()));
        }
        if self.target_parameter.is_empty() {
            return Err(CoreError::Validation(format!(
                "mapping '{}' has no target parameter",
                self.id
            )));
        }
        if self.sensitivity > 100 {
            return Err(CoreError::Validation(format!(
                "mapping '{}' sensitivity {} exceeds 100",
                self.id, self.sensitivity
            )));
        }
        if !self.range.0.is_finite() || !self.range.1.is_finite() {
            return Err(CoreError::Validation(format!(
                "mapping '{}' has a non-finite range bound",
                self.id
            )));
        }
        if let Some(env) = &self.envelope {
            let times_valid = [env.attack, env.decay, env.release]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0);
            if !times_valid || !(0.0..=1.0).contains(&env.sustain) {
                return Err(CoreError::Validation(format!(
                    "mapping '{}' has an invalid envelope override",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Analyzed event data a mapping evaluates against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioEventData {
    /// Transient onsets, strictly increasing timestamps
    pub transients: Vec<TransientEvent>,
    /// Stabilized chroma events, increasing timestamps
    pub chroma: Vec<ChromaEvent>,
    /// Per-frame RMS, pre-normalization
    pub rms: Vec<f32>,
    /// Per-frame spectral centroid in Hz
    pub centroid_hz: Vec<f32>,
    /// Time between consecutive frames in seconds
    pub hop_seconds: f32,
}

/// Ceiling against which the centroid is normalized for brightness
const BRIGHTNESS_CEILING_HZ: f32 = 8000.0;

/// Evaluate a mapping at playback time `t` (seconds).
///
/// Disabled mappings pin to the low end of their range. The raw source value
/// is scaled by sensitivity, curved by the transform, clamped to [0, 1] and
/// rescaled into the mapping's output range.
pub fn evaluate(mapping: &EventMapping, data: &AudioEventData, t: f32) -> f64 {
    if !mapping.enabled {
        return mapping.range.0;
    }

    let raw = match mapping.source {
        EventSource::Transient => transient_value(mapping, &data.transients, t),
        EventSource::Chroma => chroma_value(&data.chroma, t),
        EventSource::Volume => frame_value(&data.rms, data.hop_seconds, t),
        EventSource::Brightness => {
            let centroid = frame_value(&data.centroid_hz, data.hop_seconds, t);
            (centroid / BRIGHTNESS_CEILING_HZ).min(1.0)
        }
    };

    let scaled = raw * mapping.sensitivity as f32 / 100.0;
    let curved = apply_transform(mapping.transform, scaled);
    let unit = curved.clamp(0.0, 1.0) as f64;

    mapping.range.0 + unit * (mapping.range.1 - mapping.range.0)
}

/// Offset a base parameter value by a mapped value.
///
/// Attenuation is clamped to [-0.5, 0.5] so a single mapping can swing a
/// parameter by at most half its scale in either direction. The result is
/// not clamped; parameter bounds are the caller's concern.
pub fn modulate(base: f64, mapped: f64, attenuation: f64, parameter_max: f64) -> f64 {
    let attenuation = attenuation.clamp(-0.5, 0.5);
    if attenuation != 0.0 {
        debug!(base, mapped, attenuation, "modulating parameter");
    }
    base + mapped * attenuation * parameter_max
}

fn transient_value(mapping: &EventMapping, events: &[TransientEvent], t: f32) -> f32 {
    let Some(event) = last_at_or_before(events, t, |e| e.timestamp) else {
        return 0.0;
    };
    let envelope = mapping.envelope.unwrap_or(event.envelope);
    event.amplitude * envelope.level_at(t - event.timestamp)
}

fn chroma_value(events: &[ChromaEvent], t: f32) -> f32 {
    match last_at_or_before(events, t, |e| e.timestamp) {
        Some(event) => event.pitch_class as f32 / 11.0,
        None => 0.0,
    }
}

/// Sample a per-frame track at time `t`; out-of-range times read as 0
fn frame_value(track: &[f32], hop_seconds: f32, t: f32) -> f32 {
    if hop_seconds <= 0.0 || t < 0.0 {
        return 0.0;
    }
    let idx = (t / hop_seconds) as usize;
    track.get(idx).copied().unwrap_or(0.0)
}

/// Most recent event with timestamp <= t
fn last_at_or_before<T>(events: &[T], t: f32, timestamp: impl Fn(&T) -> f32) -> Option<&T> {
    events.iter().rev().find(|e| timestamp(e) <= t)
}

fn apply_transform(transform: Transform, x: f32) -> f32 {
    match transform {
        Transform::Linear | Transform::Envelope => x,
        Transform::Exponential => x * x,
        Transform::Logarithmic => {
            if x > 0.0 {
                (1.0 + x).log2()
            } else {
                0.0
            }
        }
    }
}
