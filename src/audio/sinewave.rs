use std::f32::consts::PI;

/// Generates a continuous sine tone, block by block.
/// This is useful for exercising the pipeline with a known signal and no microphone.
#[derive(Debug, Clone)]
pub struct Sinewave {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    phase: f32,
}

impl Sinewave {
    /// Create a new tone with the given frequency (Hz) and amplitude (0.0 to 1.0).
    pub fn new(frequency: f32, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            sample_rate,
            phase: 0.0,
        }
    }

    /// Overwrite `out` with the next samples of the tone.
    pub fn fill(&mut self, out: &mut [f32]) {
        let phase_inc = 2.0 * PI * self.frequency / self.sample_rate.max(1) as f32;
        for sample in out.iter_mut() {
            *sample = self.phase.sin() * self.amplitude;
            // Wrap to [0, 2*PI] to maintain precision
            self.phase = (self.phase + phase_inc) % (2.0 * PI);
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<f32> {
        let mut block = vec![0.0; len];
        self.fill(&mut block);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sinewave_generation() {
        let mut tone = Sinewave::new(440.0, 0.5, 44100);
        let block = tone.next_block(100);

        assert_eq!(block[0], 0.0);
        assert!(block.iter().all(|s| s.abs() <= 0.5));
        assert!(block.iter().any(|&s| s > 0.1));
        assert!(tone.phase > 0.0);
    }

    #[test]
    fn test_phase_continues_across_blocks() {
        let mut split = Sinewave::new(1000.0, 1.0, 48000);
        let mut whole = split.clone();

        let mut joined = split.next_block(64);
        joined.extend(split.next_block(64));

        assert_eq!(joined, whole.next_block(128));
    }
}
