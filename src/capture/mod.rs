//! Audio device capture and playback.
//!
//! - [`CaptureEngine`] - Owns the device for one session, toggles the callbacks
//! - [`InputTap`] - Audio-callback side: frames, encodes, sends, publishes
//! - [`PlaybackTap`] - Audio-callback side: plays the latest processed frame
//! - [`AudioBackend`] - Device seam; [`CpalBackend`] for hardware,
//!   [`SyntheticBackend`] for a generated tone
//!
//! The callbacks never wait on the network. Sending is a non-blocking queue
//! push, and every write to shared state first checks the run's active flag.

pub mod backend;
pub mod cpal_backend;
pub mod engine;

pub use backend::{AudioBackend, CaptureConstraints, FaultCallback, SyntheticBackend};
pub use cpal_backend::CpalBackend;
pub use engine::{CaptureEngine, FrameAccumulator, FrameSender, InputTap, PlaybackTap};
