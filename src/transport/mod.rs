//! Connection to the remote processing service.
//!
//! - [`TransportSession`] - Owns one websocket connection and its reader/writer tasks
//! - [`TransportHandle`] - Cheap, cloneable sender usable from the audio callback
//! - [`message`] - JSON envelopes
//! - [`config_fetch`] - `GET /config` at session start
//!
//! The link moves `connecting -> open -> closed` exactly once. Every
//! transition is reported through the [`EventCallback`] a single time.

pub mod config_fetch;
pub mod message;
pub mod session;

use std::sync::Arc;

use crate::state::{Config, Metrics};

pub use config_fetch::fetch_config;
pub use message::{Inbound, Outbound};
pub use session::{Dispatched, TransportHandle, TransportSession, dispatch_inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Open => write!(f, "open"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

/// Something the transport wants its owner to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(LinkState),
    /// The service reported an `error` message. Not fatal.
    RemoteError(String),
    /// An inbound message was dropped.
    ProtocolError(String),
    Metrics(Metrics),
    ConfigUpdated(Config),
}

/// Called from the transport's tasks; must not block.
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;
