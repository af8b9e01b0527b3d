//! Session lifecycle orchestration.
//!
//! [`SessionController`] walks `idle -> connecting -> connected -> processing`
//! and back, owning the capture engine, the transport session and the render
//! loop for the duration of a session. Everything the UI needs to observe
//! arrives as a [`Notification`] on the channel returned by
//! [`SessionController::new`]; feed each one back through
//! [`SessionController::handle`] so fatal failures tear the session down.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

use crate::capture::{AudioBackend, CaptureConstraints, CaptureEngine, FaultCallback, FrameSender};
use crate::error::{CaptureError, SessionError};
use crate::render::{DisplayList, RenderLoop};
use crate::settings::ClientSettings;
use crate::state::{Config, ConfigPatch, Metrics, SessionState, StreamState};
use crate::transport::{
    EventCallback, LinkState, Outbound, TransportEvent, TransportSession, fetch_config,
};
use crate::ui::LogLevel;

pub const WAVEFORM_SIZE: (f32, f32) = (800.0, 200.0);
pub const SPECTRUM_SIZE: (f32, f32) = (800.0, 200.0);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Lifecycle(SessionState),
    Link(LinkState),
    Metrics(Metrics),
    ConfigUpdated(Config),
    /// The service sent an `error` message.
    RemoteError(String),
    /// An inbound message was malformed and dropped.
    ProtocolError(String),
    CaptureFault(CaptureError),
    Log { level: LogLevel, message: String },
}

impl From<TransportEvent> for SessionEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Status(link) => SessionEvent::Link(link),
            TransportEvent::RemoteError(message) => SessionEvent::RemoteError(message),
            TransportEvent::ProtocolError(message) => SessionEvent::ProtocolError(message),
            TransportEvent::Metrics(metrics) => SessionEvent::Metrics(metrics),
            TransportEvent::ConfigUpdated(config) => SessionEvent::ConfigUpdated(config),
        }
    }
}

/// A [`SessionEvent`] stamped with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub generation: u64,
    pub event: SessionEvent,
}

pub struct SessionController {
    settings: ClientSettings,
    ws_url: Url,
    config_url: Url,
    lifecycle: SessionState,
    capture: CaptureEngine,
    render: RenderLoop<DisplayList>,
    transport: Option<TransportSession>,
    stream: Option<Arc<StreamState>>,
    http: reqwest::Client,
    output_volume: u8,
    generation: u64,
    teardowns: u64,
    events: mpsc::UnboundedSender<Notification>,
}

impl SessionController {
    pub fn new(
        settings: ClientSettings,
        backend: Box<dyn AudioBackend>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
        settings.validate()?;
        let ws_url = settings.websocket_url()?;
        let config_url = settings.config_url()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let render = RenderLoop::new(
            DisplayList::new(WAVEFORM_SIZE.0, WAVEFORM_SIZE.1),
            DisplayList::new(SPECTRUM_SIZE.0, SPECTRUM_SIZE.1),
            settings.spectrum_bins,
            settings.refresh_hz,
        );

        let controller = Self {
            output_volume: settings.output_volume.min(100),
            settings,
            ws_url,
            config_url,
            lifecycle: SessionState::Idle,
            capture: CaptureEngine::new(backend),
            render,
            transport: None,
            stream: None,
            http: reqwest::Client::new(),
            generation: 0,
            teardowns: 0,
            events: tx,
        };
        Ok((controller, rx))
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle
    }

    /// The current session's shared state, if a session exists.
    pub fn stream(&self) -> Option<Arc<StreamState>> {
        self.stream.clone()
    }

    pub fn render(&self) -> &RenderLoop<DisplayList> {
        &self.render
    }

    pub fn output_volume(&self) -> u8 {
        self.output_volume
    }

    /// Number of sessions torn down so far.
    pub fn teardowns(&self) -> u64 {
        self.teardowns
    }

    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.lifecycle != SessionState::Idle {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.lifecycle,
            });
        }
        self.generation += 1;

        let stream = Arc::new(StreamState::new(
            self.settings.frame_size,
            self.settings.sample_rate,
        ));
        stream.set_output_volume(self.output_volume);
        self.stream = Some(stream.clone());
        self.set_lifecycle(SessionState::Connecting);

        match self.establish(stream).await {
            Ok(()) => {
                self.set_lifecycle(SessionState::Connected);
                self.log(LogLevel::Success, format!("Connected to {}", self.ws_url));
                Ok(())
            }
            Err(err) => {
                warn!("Connect failed: {}", err);
                self.log(LogLevel::Error, format!("Connect failed: {err}"));
                self.teardown().await;
                Err(err)
            }
        }
    }

    async fn establish(&mut self, stream: Arc<StreamState>) -> Result<(), SessionError> {
        let constraints = CaptureConstraints::raw(
            self.settings.input_device.clone(),
            self.settings.output_device.clone(),
            self.settings.sample_rate,
            self.settings.frame_size,
        );
        let rate = self.capture.initialize(&constraints)?;
        stream.set_sample_rate(rate);

        let transport = TransportSession::open(
            &self.ws_url,
            stream.clone(),
            self.transport_callback(),
            self.settings.send_queue_frames,
        )
        .await?;
        self.transport = Some(transport);

        if self.settings.fetch_remote_config {
            match fetch_config(&self.http, &self.config_url).await {
                Ok(config) => {
                    info!("Seeded config from {}", self.config_url);
                    stream.replace_config(config);
                    self.log(LogLevel::Info, "Loaded service config".to_string());
                }
                Err(err) => {
                    warn!("Could not fetch config, keeping defaults: {}", err);
                    self.log(
                        LogLevel::Warning,
                        format!("Could not fetch config, keeping defaults: {err}"),
                    );
                }
            }
        }
        Ok(())
    }

    /// Starts capture, playback and rendering.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.lifecycle {
            SessionState::Processing => return Ok(()),
            SessionState::Connected => {}
            state => {
                return Err(SessionError::InvalidState {
                    operation: "start processing",
                    state,
                });
            }
        }
        let (Some(stream), Some(transport)) = (self.stream.clone(), self.transport.as_ref()) else {
            return Err(SessionError::InvalidState {
                operation: "start processing",
                state: self.lifecycle,
            });
        };

        let sender: Arc<dyn FrameSender> = Arc::new(transport.handle());
        let faults = self.fault_callback();
        self.capture.start(stream.clone(), sender, faults)?;
        self.render.start(stream);
        self.set_lifecycle(SessionState::Processing);
        self.log(LogLevel::Success, "Processing started".to_string());
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        match self.lifecycle {
            SessionState::Connected => Ok(()),
            SessionState::Processing => {
                self.capture.stop();
                self.render.stop();
                self.set_lifecycle(SessionState::Connected);
                self.log(LogLevel::Info, "Processing stopped".to_string());
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                operation: "stop processing",
                state,
            }),
        }
    }

    /// Tears the session down from any state. Calling it again is a no-op.
    pub async fn disconnect(&mut self) {
        if self.lifecycle == SessionState::Idle && self.stream.is_none() {
            return;
        }
        self.teardown().await;
        self.log(LogLevel::Info, "Disconnected".to_string());
    }

    /// Merges `patch` into the current config, validates the result and
    /// sends the patch. The local config changes only when the service
    /// acknowledges with `config_updated`.
    pub fn update_config(&mut self, patch: ConfigPatch) -> Result<(), SessionError> {
        if !matches!(
            self.lifecycle,
            SessionState::Connected | SessionState::Processing
        ) {
            return Err(SessionError::InvalidState {
                operation: "update config",
                state: self.lifecycle,
            });
        }
        let (Some(stream), Some(transport)) = (self.stream.as_ref(), self.transport.as_ref()) else {
            return Err(SessionError::InvalidState {
                operation: "update config",
                state: self.lifecycle,
            });
        };

        stream.config().merged(&patch).validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        transport.send(&Outbound::ConfigUpdate { config: patch })?;
        info!("Config update sent");
        Ok(())
    }

    /// Sets playback volume in percent, clamped to 100. Allowed in any state.
    pub fn set_output_volume(&mut self, percent: u8) -> u8 {
        self.output_volume = percent.min(100);
        if let Some(stream) = &self.stream {
            stream.set_output_volume(self.output_volume);
        }
        self.output_volume
    }

    /// Reacts to a notification from the current session. Link loss and
    /// capture faults tear the session down.
    pub async fn handle(&mut self, notification: &Notification) {
        if notification.generation != self.generation || self.lifecycle == SessionState::Idle {
            return;
        }
        match &notification.event {
            SessionEvent::Link(LinkState::Closed) => {
                error!("Connection to the service was lost");
                self.log(LogLevel::Error, "Connection lost".to_string());
                self.teardown().await;
            }
            SessionEvent::CaptureFault(err) => {
                error!("Audio device failed: {}", err);
                self.log(LogLevel::Error, format!("Audio device failed: {err}"));
                self.teardown().await;
            }
            _ => {}
        }
    }

    /// Releases everything the session holds and returns to idle.
    async fn teardown(&mut self) {
        self.render.stop();
        self.capture.release();
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        if let Some(stream) = self.stream.take() {
            stream.set_lifecycle(SessionState::Idle);
        }
        self.teardowns += 1;
        self.set_lifecycle(SessionState::Idle);
    }

    fn set_lifecycle(&mut self, state: SessionState) {
        if self.lifecycle == state {
            return;
        }
        info!("Session {} -> {}", self.lifecycle, state);
        self.lifecycle = state;
        if let Some(stream) = &self.stream {
            stream.set_lifecycle(state);
        }
        self.emit(SessionEvent::Lifecycle(state));
    }

    fn emit(&self, event: SessionEvent) {
        // The receiver may be gone during shutdown
        let _ = self.events.send(Notification {
            generation: self.generation,
            event,
        });
    }

    fn log(&self, level: LogLevel, message: String) {
        self.emit(SessionEvent::Log { level, message });
    }

    fn transport_callback(&self) -> EventCallback {
        let events = self.events.clone();
        let generation = self.generation;
        Arc::new(move |event: TransportEvent| {
            let _ = events.send(Notification {
                generation,
                event: event.into(),
            });
        })
    }

    fn fault_callback(&self) -> FaultCallback {
        let events = self.events.clone();
        let generation = self.generation;
        Arc::new(move |err: CaptureError| {
            let _ = events.send(Notification {
                generation,
                event: SessionEvent::CaptureFault(err),
            });
        })
    }
}
