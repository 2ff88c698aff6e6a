//! Validated PCM Input
//!
//! Every analyzer in this crate consumes a [`PcmBuffer`]: a mono sample
//! sequence in -1..1 with a known sample rate. Decoding compressed audio
//! is an external concern; a buffer that fails validation here is reported
//! as a decode error so callers can fall back appropriately.

use crate::error::DspError;

/// A decoded mono PCM buffer with its sample rate
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Create a buffer, validating that it can be interpreted as PCM.
    ///
    /// Rejects empty input, non-positive sample rates, and non-finite
    /// samples (NaN or infinity anywhere in the buffer).
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, DspError> {
        if sample_rate == 0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(DspError::EmptyBuffer);
        }
        if let Some(idx) = samples.iter().position(|s| !s.is_finite()) {
            return Err(DspError::Decode(format!(
                "non-finite sample at index {idx}"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the buffer in seconds
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_buffer() {
        let buf = PcmBuffer::new(vec![0.0, 0.5, -0.5], 44100).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.sample_rate(), 44100);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            PcmBuffer::new(vec![], 44100),
            Err(DspError::EmptyBuffer)
        ));
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        assert!(matches!(
            PcmBuffer::new(vec![0.0], 0),
            Err(DspError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = PcmBuffer::new(vec![0.0, f32::NAN], 44100).unwrap_err();
        assert!(matches!(err, DspError::Decode(_)));

        let err = PcmBuffer::new(vec![f32::INFINITY], 44100).unwrap_err();
        assert!(matches!(err, DspError::Decode(_)));
    }

    #[test]
    fn test_duration() {
        let buf = PcmBuffer::new(vec![0.0; 44100], 44100).unwrap();
        assert!((buf.duration_seconds() - 1.0).abs() < 1e-6);
    }
}
