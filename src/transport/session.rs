use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use super::message::{Inbound, Outbound};
use super::{EventCallback, LinkState, TransportEvent};
use crate::audio::FrameCodec;
use crate::error::TransportError;
use crate::state::{Config, Metrics, StreamState};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Link state plus the owner's callback, shared by the handle and both tasks.
struct Link {
    state: AtomicU8,
    on_event: EventCallback,
}

impl Link {
    fn new(on_event: EventCallback) -> Self {
        Self {
            state: AtomicU8::new(CONNECTING),
            on_event,
        }
    }

    fn state(&self) -> LinkState {
        match self.state.load(Ordering::Acquire) {
            CONNECTING => LinkState::Connecting,
            OPEN => LinkState::Open,
            _ => LinkState::Closed,
        }
    }

    fn emit(&self, event: TransportEvent) {
        (self.on_event)(event);
    }

    fn mark_open(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            self.emit(TransportEvent::Status(LinkState::Open));
        }
        moved
    }

    /// Returns true only for the call that actually closed the link.
    fn mark_closed(&self) -> bool {
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous != CLOSED {
            self.emit(TransportEvent::Status(LinkState::Closed));
            true
        } else {
            false
        }
    }
}

/// Sender half of a session.
///
/// `send` never waits: it either queues the message for the writer task or
/// fails immediately, so it is safe to call from the audio callback.
#[derive(Clone)]
pub struct TransportHandle {
    link: Arc<Link>,
    outbound: mpsc::Sender<String>,
}

impl TransportHandle {
    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    pub fn send(&self, message: &Outbound) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        self.outbound.try_send(text).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

struct Tasks {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// One persistent connection to the service.
///
/// Inbound messages are applied to the [`StreamState`] by the reader task;
/// outbound messages go through [`TransportHandle::send`].
pub struct TransportSession {
    url: Url,
    handle: TransportHandle,
    shutdown: Arc<Notify>,
    tasks: Mutex<Option<Tasks>>,
}

impl TransportSession {
    /// Connects to `url` and spawns the reader and writer tasks.
    ///
    /// `queue_capacity` bounds the number of outbound messages waiting for the
    /// writer; past that, `send` reports [`TransportError::QueueFull`].
    pub async fn open(
        url: &Url,
        state: Arc<StreamState>,
        on_event: EventCallback,
        queue_capacity: usize,
    ) -> Result<Self, TransportError> {
        let link = Arc::new(Link::new(on_event));
        link.emit(TransportEvent::Status(LinkState::Connecting));
        info!("Connecting to {}", url);

        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(err) => {
                link.mark_closed();
                return Err(TransportError::ConnectFailed {
                    url: url.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let shutdown = Arc::new(Notify::new());

        link.mark_open();
        info!("Connected to {}", url);

        let writer = tokio::spawn(write_loop(sink, rx, shutdown.clone(), link.clone()));
        let reader = tokio::spawn(read_loop(stream, state, link.clone()));

        Ok(Self {
            url: url.clone(),
            handle: TransportHandle {
                link,
                outbound: tx,
            },
            shutdown,
            tasks: Mutex::new(Some(Tasks { writer, reader })),
        })
    }

    pub fn state(&self) -> LinkState {
        self.handle.state()
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    pub fn send(&self, message: &Outbound) -> Result<(), TransportError> {
        self.handle.send(message)
    }

    /// Closes the connection. Safe to call any number of times, including
    /// after the remote side has already dropped.
    pub async fn close(&self) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(tasks) = tasks else {
            return;
        };

        // Reader checks the link before every state write
        self.handle.link.mark_closed();
        self.shutdown.notify_one();

        let writer_abort = tasks.writer.abort_handle();
        if tokio::time::timeout(CLOSE_TIMEOUT, tasks.writer).await.is_err() {
            warn!("Close handshake with {} timed out", self.url);
            writer_abort.abort();
        }
        tasks.reader.abort();
        info!("Disconnected from {}", self.url);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tasks) = tasks {
            self.handle.link.mark_closed();
            tasks.writer.abort();
            tasks.reader.abort();
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut rx: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
    link: Arc<Link>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            next = rx.recv() => match next {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        warn!("Send failed, closing link: {}", err);
                        link.mark_closed();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    if let Err(err) = sink.close().await {
        debug!("Close frame not delivered: {}", err);
    }
}

async fn read_loop(mut stream: SplitStream<Socket>, state: Arc<StreamState>, link: Arc<Link>) {
    while let Some(frame) = stream.next().await {
        if link.state() != LinkState::Open {
            break;
        }
        match frame {
            Ok(Message::Text(text)) => match dispatch_inbound(&text, &state) {
                Ok(Dispatched::Audio {
                    metrics: Some(metrics),
                    ..
                }) => link.emit(TransportEvent::Metrics(metrics)),
                Ok(Dispatched::Audio { metrics: None, .. }) => {}
                Ok(Dispatched::Config(config)) => link.emit(TransportEvent::ConfigUpdated(config)),
                Ok(Dispatched::RemoteError(message)) => {
                    warn!("Service reported an error: {}", message);
                    link.emit(TransportEvent::RemoteError(message));
                }
                Ok(Dispatched::Unrecognized(_)) => {}
                Err(err) => {
                    warn!("Dropping inbound message: {}", err);
                    link.emit(TransportEvent::ProtocolError(err.to_string()));
                }
            },
            Ok(Message::Binary(data)) => {
                let err = TransportError::Protocol(format!(
                    "unexpected binary message of {} bytes",
                    data.len()
                ));
                warn!("Dropping inbound message: {}", err);
                link.emit(TransportEvent::ProtocolError(err.to_string()));
            }
            Ok(Message::Close(frame)) => {
                info!("Service closed the connection: {:?}", frame);
                break;
            }
            // Ping/pong are answered by tungstenite
            Ok(_) => {}
            Err(err) => {
                warn!("Connection lost: {}", err);
                break;
            }
        }
    }
    if link.mark_closed() {
        info!("Link closed");
    }
}

/// What an inbound message did to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Audio {
        samples: usize,
        metrics: Option<Metrics>,
    },
    Config(Config),
    RemoteError(String),
    Unrecognized(String),
}

/// Parses one inbound text message and applies it to `state`.
///
/// On error nothing has been written.
pub fn dispatch_inbound(text: &str, state: &StreamState) -> Result<Dispatched, TransportError> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TransportError::Protocol("message has no type tag".to_string()))?;

    let message: Inbound = serde_json::from_value(value)
        .map_err(|err| TransportError::Protocol(format!("malformed {tag} message: {err}")))?;

    match message {
        Inbound::ProcessedAudio { data, metrics } => {
            let frame = FrameCodec::decode(&data)?;
            let samples = frame.len();
            state.publish_output(Arc::new(frame));
            if let Some(metrics) = metrics {
                state.set_metrics(metrics);
            }
            Ok(Dispatched::Audio { samples, metrics })
        }
        Inbound::ConfigUpdated { config } => {
            debug!("Config updated by service: {:?}", config);
            state.replace_config(config.clone());
            Ok(Dispatched::Config(config))
        }
        Inbound::Error { message } => Ok(Dispatched::RemoteError(message)),
        Inbound::Unrecognized => {
            warn!("Ignoring unrecognized message type {:?}", tag);
            Ok(Dispatched::Unrecognized(tag))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::error::DecodeError;
    use crate::state::{FilterType, OperationMode};
    use crate::transport::test_support::{dead_url, serve_once, wait_until};

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<TransportEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: EventCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
        (callback, events)
    }

    fn closed_count(events: &Mutex<Vec<TransportEvent>>) -> usize {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == TransportEvent::Status(LinkState::Closed))
            .count()
    }

    fn processed(samples: Vec<f32>) -> String {
        serde_json::json!({
            "type": "processed_audio",
            "data": FrameCodec::encode(&AudioFrame::new(samples)),
            "metrics": {"rms": 0.25, "peak": 0.5, "dominant_freq": 440.0},
        })
        .to_string()
    }

    async fn hold_open(ws: &mut crate::transport::test_support::ServerStream) {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    }

    #[test]
    fn test_dispatch_processed_audio_writes_frame_and_metrics() {
        let state = StreamState::new(4, 44100);
        let result = dispatch_inbound(&processed(vec![0.5, -0.5]), &state).unwrap();

        assert!(matches!(result, Dispatched::Audio { samples: 2, .. }));
        assert_eq!(state.output_frame().samples(), &[0.5, -0.5]);
        assert_eq!(state.metrics().dominant_freq, 440.0);
    }

    #[test]
    fn test_dispatch_without_metrics_keeps_previous_metrics() {
        let state = StreamState::new(4, 44100);
        dispatch_inbound(&processed(vec![0.1]), &state).unwrap();

        let bare = r#"{"type":"processed_audio","data":"AACAPw=="}"#;
        dispatch_inbound(bare, &state).unwrap();

        assert_eq!(state.output_frame().samples(), &[1.0]);
        assert_eq!(state.metrics().rms, 0.25);
    }

    #[test]
    fn test_dispatch_errors_leave_state_untouched() {
        let state = StreamState::new(4, 44100);

        assert!(matches!(
            dispatch_inbound("{not json", &state),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            dispatch_inbound(r#"{"data":"AAAA"}"#, &state),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            dispatch_inbound(r#"{"type":"processed_audio"}"#, &state),
            Err(TransportError::Protocol(_))
        ));
        assert_eq!(
            dispatch_inbound(r#"{"type":"processed_audio","data":"AAAAAAA="}"#, &state),
            Err(TransportError::Decode(DecodeError::Misaligned(5)))
        );

        assert_eq!(state.output_version(), 0);
        assert_eq!(state.metrics_version(), 0);
    }

    #[test]
    fn test_dispatch_remote_error_and_unknown_tag() {
        let state = StreamState::new(4, 44100);
        assert_eq!(
            dispatch_inbound(r#"{"type":"error","message":"overload"}"#, &state).unwrap(),
            Dispatched::RemoteError("overload".to_string())
        );
        assert_eq!(
            dispatch_inbound(r#"{"type":"stats","x":1}"#, &state).unwrap(),
            Dispatched::Unrecognized("stats".to_string())
        );
        assert_eq!(state.config_version(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_close_session() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text("this is not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"processed_audio","data":"%%%"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(processed(vec![0.75; 8]).into())).await.unwrap();
            hold_open(&mut ws).await;
        })
        .await;

        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, events) = recorder();
        let session = TransportSession::open(&url, state.clone(), callback, 8)
            .await
            .unwrap();

        assert!(wait_until(|| state.output_version() == 1).await);
        assert_eq!(session.state(), LinkState::Open);
        assert_eq!(state.output_frame().samples(), &[0.75; 8]);

        let protocol_errors = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, TransportEvent::ProtocolError(_)))
            .count();
        assert_eq!(protocol_errors, 3);

        session.close().await;
    }

    #[tokio::test]
    async fn test_config_updated_replaces_config() {
        let url = serve_once(|mut ws| async move {
            let msg = r#"{"type":"config_updated","config":{"operation_mode":2,"filter_type":"lowpass",
                "noise_threshold":0.1,"low_cut_freq":200,"high_cut_freq":6000,"volume_gain":1.5}}"#;
            ws.send(Message::Text(msg.into())).await.unwrap();
            hold_open(&mut ws).await;
        })
        .await;

        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, events) = recorder();
        let session = TransportSession::open(&url, state.clone(), callback, 8)
            .await
            .unwrap();

        assert!(wait_until(|| state.config_version() == 1).await);
        let expected = Config {
            operation_mode: OperationMode::NoiseReduction,
            filter_type: FilterType::Lowpass,
            noise_threshold: 0.1,
            low_cut_freq: 200.0,
            high_cut_freq: 6000.0,
            volume_gain: 1.5,
            samplerate: None,
        };
        assert_eq!(*state.config(), expected);
        assert!(
            events
                .lock()
                .unwrap()
                .contains(&TransportEvent::ConfigUpdated(expected))
        );

        session.close().await;
    }

    #[tokio::test]
    async fn test_send_reaches_service_and_fails_after_close() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let url = serve_once(|mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    seen_tx.send(text.to_string()).unwrap();
                }
            }
        })
        .await;

        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, _events) = recorder();
        let session = TransportSession::open(&url, state, callback, 8).await.unwrap();

        let frame = AudioFrame::new(vec![1.0]);
        session
            .send(&Outbound::AudioData {
                data: FrameCodec::encode(&frame),
            })
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&received).unwrap();
        assert_eq!(value["type"], "audio_data");
        assert_eq!(value["data"], "AACAPw==");

        session.close().await;
        assert_eq!(
            session.send(&Outbound::AudioData {
                data: String::new()
            }),
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_reported_once() {
        let url = serve_once(|mut ws| async move { hold_open(&mut ws).await }).await;

        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, events) = recorder();
        let session = TransportSession::open(&url, state, callback, 8).await.unwrap();

        session.close().await;
        session.close().await;
        drop(session);

        assert_eq!(closed_count(&events), 1);
        assert_eq!(
            events.lock().unwrap()[..2],
            [
                TransportEvent::Status(LinkState::Connecting),
                TransportEvent::Status(LinkState::Open)
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_drop_closes_link() {
        let url = serve_once(|ws| async move { drop(ws) }).await;

        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, events) = recorder();
        let session = TransportSession::open(&url, state, callback, 8).await.unwrap();

        assert!(wait_until(|| session.state() == LinkState::Closed).await);
        session.close().await;
        assert_eq!(closed_count(&events), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let url = dead_url().await;
        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, events) = recorder();

        let result = TransportSession::open(&url, state, callback, 8).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
        assert_eq!(closed_count(&events), 1);
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let url = serve_once(|mut ws| async move { hold_open(&mut ws).await }).await;
        let state = Arc::new(StreamState::new(8, 44100));
        let (callback, _events) = recorder();
        let session = TransportSession::open(&url, state, callback, 1).await.unwrap();

        let msg = Outbound::AudioData {
            data: "AAAAAA==".to_string(),
        };
        let overflowed = (0..10_000).any(|_| session.send(&msg) == Err(TransportError::QueueFull));
        assert!(overflowed);

        session.close().await;
    }
}
