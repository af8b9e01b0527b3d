//! Audio frame encoding and decoding.
//!
//! Frames travel inside JSON envelopes, so the samples are laid out as
//! little-endian IEEE-754 `f32` (PCM32LE, mono) and then base64 encoded with
//! the standard alphabet. Decoding is the exact inverse: every sample comes
//! back bit-for-bit.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::audio::frame::AudioFrame;
use crate::error::DecodeError;

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// Converts [`AudioFrame`]s to and from their transport-safe text encoding.
pub struct FrameCodec;

impl FrameCodec {
    /// Raw PCM32LE bytes of the frame.
    pub fn to_bytes(frame: &AudioFrame) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(frame.len() * BYTES_PER_SAMPLE);
        for sample in frame.samples() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<AudioFrame, DecodeError> {
        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            return Err(DecodeError::Misaligned(bytes.len()));
        }
        let samples = bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(AudioFrame::new(samples))
    }

    pub fn encode(frame: &AudioFrame) -> String {
        STANDARD.encode(Self::to_bytes(frame))
    }

    pub fn decode(payload: &str) -> Result<AudioFrame, DecodeError> {
        let bytes = STANDARD.decode(payload)?;
        Self::from_bytes(&bytes)
    }
}
