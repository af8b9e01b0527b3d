//! Real-time streaming client for a remote audio processing service.
//!
//! Microphone frames are encoded and streamed over a websocket; processed
//! frames and metrics come back and are played and visualized. The audio
//! callback, the network reader and the render loop run on independent clocks
//! and meet only in [`state::StreamState`].
//!
//! - [`audio`] - Frames, codec, spectrum estimate, test tone
//! - [`state`] - Shared last-value-wins session state and config types
//! - [`transport`] - Websocket session and `GET /config`
//! - [`capture`] - Audio devices and the frame callback
//! - [`render`] - Waveform and spectrum rendering
//! - [`session`] - Lifecycle state machine
//! - [`ui`] - Event log, readouts and control enablement
//! - [`settings`] - Client settings

pub mod audio;
pub mod capture;
pub mod error;
pub mod render;
pub mod session;
pub mod settings;
pub mod state;
pub mod transport;
pub mod ui;
