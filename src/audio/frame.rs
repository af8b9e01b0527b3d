/// One fixed-size block of mono `f32` samples.
///
/// The sample rate belongs to the session, not to the frame. A frame is never
/// mutated after construction; stages hand it on by value or share it behind
/// an `Arc` for read-only consumers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioFrame {
    samples: Box<[f32]>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// A frame of `len` zero samples.
    pub fn silence(len: usize) -> Self {
        Self::new(vec![0.0; len])
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }

    /// Compares every sample by its bit pattern, so NaN payloads and signed
    /// zeros must match exactly.
    pub fn bits_eq(&self, other: &AudioFrame) -> bool {
        self.samples.len() == other.samples.len()
            && self
                .samples
                .iter()
                .zip(other.samples.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.samples.into_vec()
    }
}

impl From<Vec<f32>> for AudioFrame {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}
