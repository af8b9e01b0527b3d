//! Audio data types and the algorithms that run on them.
//!
//! - [`AudioFrame`] - A fixed-size block of mono `f32` samples
//! - [`FrameCodec`] - PCM32LE + base64 encoding for the JSON envelope
//! - [`SpectrumEstimator`] - Coarse magnitude binning for the spectrum view
//! - [`Sinewave`] - Test tone generator

pub mod codec;
pub mod frame;
pub mod sinewave;
pub mod spectrum;

pub use codec::FrameCodec;
pub use frame::AudioFrame;
pub use sinewave::Sinewave;
pub use spectrum::{DEFAULT_BINS, SpectrumEstimator};
