//! Session state shared between the audio callback, the network reader and
//! the render loop.
//!
//! - [`StreamState`] - Last-value-wins slots for frames, metrics and config
//! - [`Slot`] - A single last-value-wins cell
//! - [`SessionState`] - Controller lifecycle tag
//! - [`Config`] / [`ConfigPatch`] / [`Metrics`] - Values exchanged with the service
//!
//! Every field has exactly one writer: the capture callback writes the input
//! frame, the transport reader writes the output frame, metrics and config, and
//! the controller writes the lifecycle tag and output volume. Readers never
//! consume a value; a reader that falls behind just sees the latest one.

pub mod config;

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam::atomic::AtomicCell;

use crate::audio::AudioFrame;

pub use config::{Config, ConfigPatch, FilterType, Metrics, OperationMode};

/// Controller lifecycle tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Processing,
}

impl SessionState {
    fn to_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Processing => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Processing,
            _ => SessionState::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Processing => write!(f, "processing"),
        }
    }
}

/// A last-value-wins cell.
///
/// A store swaps in a new `Arc` under a short write lock; a load clones the
/// current `Arc` under a read lock. Neither ever holds the lock across any
/// work on the value itself, so a reader always sees one complete value.
pub struct Slot<T> {
    current: RwLock<Arc<T>>,
    version: AtomicU64,
}

impl<T> Slot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            version: AtomicU64::new(0),
        }
    }

    pub fn load(&self) -> Arc<T> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, value: Arc<T>) {
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, value)
        };
        self.version.fetch_add(1, Ordering::Release);
        // Free the old value outside the lock
        drop(previous);
    }

    /// Number of stores so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// The shared model of one streaming session.
pub struct StreamState {
    frame_size: usize,
    sample_rate: AtomicU32,
    input: Slot<AudioFrame>,
    output: Slot<AudioFrame>,
    metrics: AtomicCell<Metrics>,
    metrics_version: AtomicU64,
    config: Slot<Config>,
    lifecycle: AtomicU8,
    output_gain: AtomicCell<f32>,
}

impl StreamState {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            frame_size,
            sample_rate: AtomicU32::new(sample_rate),
            input: Slot::new(AudioFrame::silence(frame_size)),
            output: Slot::new(AudioFrame::silence(frame_size)),
            metrics: AtomicCell::new(Metrics::default()),
            metrics_version: AtomicU64::new(0),
            config: Slot::new(Config::default()),
            lifecycle: AtomicU8::new(SessionState::Idle.to_u8()),
            output_gain: AtomicCell::new(1.0),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Records the rate the input device actually runs at.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn input_frame(&self) -> Arc<AudioFrame> {
        self.input.load()
    }

    pub fn publish_input(&self, frame: Arc<AudioFrame>) {
        self.input.store(frame);
    }

    pub fn input_version(&self) -> u64 {
        self.input.version()
    }

    pub fn output_frame(&self) -> Arc<AudioFrame> {
        self.output.load()
    }

    pub fn publish_output(&self, frame: Arc<AudioFrame>) {
        self.output.store(frame);
    }

    pub fn output_version(&self) -> u64 {
        self.output.version()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.load()
    }

    /// Overwrites the metrics wholesale.
    pub fn set_metrics(&self, metrics: Metrics) {
        self.metrics.store(metrics);
        self.metrics_version.fetch_add(1, Ordering::Release);
    }

    pub fn metrics_version(&self) -> u64 {
        self.metrics_version.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.load()
    }

    /// Replaces the config wholesale.
    pub fn replace_config(&self, config: Config) {
        self.config.store(Arc::new(config));
    }

    pub fn config_version(&self) -> u64 {
        self.config.version()
    }

    pub fn lifecycle(&self) -> SessionState {
        SessionState::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn set_lifecycle(&self, state: SessionState) {
        self.lifecycle.store(state.to_u8(), Ordering::Release);
    }

    /// Linear playback gain in `[0, 1]`.
    pub fn output_gain(&self) -> f32 {
        self.output_gain.load()
    }

    /// Sets playback volume from a percentage; values above 100 are clamped.
    /// Returns the percentage actually applied.
    pub fn set_output_volume(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        self.output_gain.store(f32::from(percent) / 100.0);
        percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_state_starts_silent_and_idle() {
        let state = StreamState::new(4096, 44100);
        assert_eq!(state.input_frame().len(), 4096);
        assert!(state.output_frame().is_silent());
        assert_eq!(state.metrics(), Metrics::default());
        assert_eq!(state.lifecycle(), SessionState::Idle);
        assert_eq!(state.output_gain(), 1.0);
    }

    #[test]
    fn test_slot_store_replaces_and_bumps_version() {
        let slot = Slot::new(1u32);
        assert_eq!(slot.version(), 0);

        let held = slot.load();
        slot.store(Arc::new(2));
        slot.store(Arc::new(3));

        assert_eq!(*held, 1);
        assert_eq!(*slot.load(), 3);
        assert_eq!(slot.version(), 2);
    }

    #[test]
    fn test_volume_maps_linearly_and_clamps() {
        let state = StreamState::new(16, 44100);
        assert_eq!(state.set_output_volume(50), 50);
        assert_eq!(state.output_gain(), 0.5);
        assert_eq!(state.set_output_volume(0), 0);
        assert_eq!(state.output_gain(), 0.0);
        assert_eq!(state.set_output_volume(250), 100);
        assert_eq!(state.output_gain(), 1.0);
    }

    #[test]
    fn test_lifecycle_tag_round_trips() {
        let state = StreamState::new(16, 44100);
        for tag in [
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Processing,
            SessionState::Idle,
        ] {
            state.set_lifecycle(tag);
            assert_eq!(state.lifecycle(), tag);
        }
    }

    #[test]
    fn test_concurrent_writers_to_distinct_fields() {
        const WRITES: usize = 2000;
        let state = Arc::new(StreamState::new(64, 44100));

        let input_writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    state.publish_input(Arc::new(AudioFrame::new(vec![i as f32; 64])));
                }
            })
        };
        let output_writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    state.publish_output(Arc::new(AudioFrame::new(vec![-(i as f32); 32])));
                    state.set_metrics(Metrics {
                        rms: i as f32,
                        peak: i as f32 * 2.0,
                        dominant_freq: i as f32 * 3.0,
                    });
                    state.replace_config(Config {
                        volume_gain: i as f32,
                        ..Config::default()
                    });
                }
            })
        };
        let controller = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    state.set_output_volume((i % 101) as u8);
                    state.set_lifecycle(SessionState::from_u8((i % 4) as u8));
                }
            })
        };
        let reader = {
            let state = state.clone();
            thread::spawn(move || {
                for _ in 0..WRITES {
                    let input = state.input_frame();
                    let first = input.samples()[0];
                    assert!(input.samples().iter().all(|&s| s == first));

                    let output = state.output_frame();
                    if let Some(&first) = output.samples().first() {
                        assert!(output.samples().iter().all(|&s| s == first));
                    }

                    let metrics = state.metrics();
                    assert_eq!(metrics.peak, metrics.rms * 2.0);
                    assert_eq!(metrics.dominant_freq, metrics.rms * 3.0);
                }
            })
        };

        for handle in [input_writer, output_writer, controller, reader] {
            handle.join().unwrap();
        }

        let last = (WRITES - 1) as f32;
        assert_eq!(*state.input_frame(), AudioFrame::new(vec![last; 64]));
        assert_eq!(*state.output_frame(), AudioFrame::new(vec![-last; 32]));
        assert_eq!(state.metrics().rms, last);
        assert_eq!(state.config().volume_gain, last);
        assert_eq!(state.output_gain(), ((WRITES - 1) % 101) as f32 / 100.0);
        assert_eq!(state.lifecycle(), SessionState::from_u8(((WRITES - 1) % 4) as u8));
        assert_eq!(state.input_version(), WRITES as u64);
        assert_eq!(state.output_version(), WRITES as u64);
    }
}
