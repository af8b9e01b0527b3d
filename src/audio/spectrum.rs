//! Coarse magnitude envelope used by the spectrum view.
//!
//! This is not a frequency transform. The frame is cut into `bins` contiguous
//! segments and each bin gets the mean absolute amplitude of its segment, which
//! is enough to show relative energy across the buffer.

pub const DEFAULT_BINS: usize = 256;

/// Produces the bar values drawn on the spectrum canvas.
#[derive(Debug, Clone, Copy)]
pub struct SpectrumEstimator {
    bins: usize,
}

impl Default for SpectrumEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl SpectrumEstimator {
    pub fn new(bins: usize) -> Self {
        Self { bins }
    }

    /// Returns exactly `bins` values.
    ///
    /// With at least `bins` samples every bin covers a non-empty segment, and
    /// segment lengths differ by at most one. A shorter input gets one sample
    /// per bin and the remaining bins are 0.
    pub fn estimate(&self, samples: &[f32]) -> Vec<f32> {
        let bins = self.bins;
        let mut spectrum = vec![0.0; bins];
        let len = samples.len();
        if bins == 0 || len == 0 {
            return spectrum;
        }

        if len < bins {
            for (bin, sample) in spectrum.iter_mut().zip(samples) {
                *bin = sample.abs();
            }
            return spectrum;
        }

        for (i, bin) in spectrum.iter_mut().enumerate() {
            let segment = &samples[i * len / bins..(i + 1) * len / bins];
            let sum: f32 = segment.iter().map(|s| s.abs()).sum();
            *bin = sum / segment.len() as f32;
        }
        spectrum
    }
}
