//! Analysis Windows

/// Hann window coefficient at position `n` of `size`
/// Hann windowing reduces spectral leakage in FFT analysis
fn hann(n: usize, size: usize) -> f32 {
    // A 1-sample window has no taper; avoids the size-1 denominator
    if size < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (size - 1) as f32).cos())
}

/// Pre-computed Hann window lookup table
///
/// Frame sizes differ between the analyzers (1024 for spectral features,
/// 2048 for onset detection), so the table is sized at construction and
/// reused for every frame of a run.
pub struct HannWindow {
    coeffs: Vec<f32>,
}

impl HannWindow {
    pub fn new(size: usize) -> Self {
        let coeffs = (0..size).map(|i| hann(i, size)).collect();
        Self { coeffs }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Multiply `frame` by the window into `out`.
    ///
    /// Both slices must match the window length; extra samples are ignored
    /// and missing samples treated as zero by the callers' framing, so the
    /// lengths always line up in practice.
    pub fn apply(&self, frame: &[f32], out: &mut [f32]) {
        for ((o, s), c) in out.iter_mut().zip(frame).zip(&self.coeffs) {
            *o = s * c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_shape() {
        // Hann window should be 0 at edges and 1 at center
        let w = HannWindow::new(1024);
        assert!(w.coeffs[0] < 0.01, "Window should be ~0 at start");
        assert!(w.coeffs[1023] < 0.01, "Window should be ~0 at end");
        assert!(
            (w.coeffs[512] - 1.0).abs() < 0.01,
            "Window should be ~1 at center"
        );
    }

    #[test]
    fn test_degenerate_sizes_stay_finite() {
        let w = HannWindow::new(1);
        assert_eq!(w.len(), 1);
        assert_eq!(w.coeffs[0], 1.0);

        assert!(HannWindow::new(0).is_empty());
    }

    #[test]
    fn test_apply() {
        let w = HannWindow::new(8);
        let frame = [1.0f32; 8];
        let mut out = [0.0f32; 8];
        w.apply(&frame, &mut out);
        assert_eq!(out[0], w.coeffs[0]);
        assert_eq!(out[4], w.coeffs[4]);
    }
}
