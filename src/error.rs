//! Error taxonomy for the streaming client.
//!
//! Each concern gets its own enum so callers can match on the failure kind:
//!
//! - [`DecodeError`] - frame payload could not be turned back into samples
//! - [`CaptureError`] - audio device acquisition or stream failures
//! - [`TransportError`] - connection lifecycle and wire protocol failures
//! - [`ConfigError`] - a processing config that must not be transmitted
//! - [`SessionError`] - controller-level failures, wrapping the others
//!
//! Codec and single-message protocol errors are recovered where they occur
//! (logged, message skipped). Capture and connection failures abort the
//! current controller transition and are returned to the caller.

use thiserror::Error;

use crate::state::SessionState;

/// Failure to turn a base64 payload back into an [`AudioFrame`](crate::audio::AudioFrame).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload of {0} bytes is not a whole number of 4-byte samples")]
    Misaligned(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission to use the audio device was denied: {0}")]
    PermissionDenied(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("capture engine is not initialized")]
    NotInitialized,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport closed")]
    Closed,

    #[error("failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("outbound queue is full, message dropped")]
    QueueFull,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Protocol(format!("JSON error: {err}"))
    }
}

/// A processing config that violates its invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("low cut frequency {low} Hz must be below high cut frequency {high} Hz")]
    CutoffOrder { low: f32, high: f32 },

    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f32,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
