use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::backend::{AudioBackend, CaptureConstraints, FaultCallback};
use crate::audio::{AudioFrame, FrameCodec};
use crate::error::{CaptureError, TransportError};
use crate::state::StreamState;
use crate::transport::{Outbound, TransportHandle};

/// Where encoded input frames go. Must not block.
pub trait FrameSender: Send + Sync {
    fn send_frame(&self, payload: String) -> Result<(), TransportError>;
}

impl FrameSender for TransportHandle {
    fn send_frame(&self, payload: String) -> Result<(), TransportError> {
        self.send(&Outbound::AudioData { data: payload })
    }
}

/// Cuts an arbitrary stream of samples into fixed-size frames.
pub struct FrameAccumulator {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Appends `samples`, calling `on_frame` once per completed frame.
    pub fn push(&mut self, samples: &[f32], mut on_frame: impl FnMut(AudioFrame)) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                on_frame(AudioFrame::new(full));
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// The input side of the audio callback.
///
/// Backends feed it mono samples. For each full frame it encodes, hands the
/// payload to the [`FrameSender`] and publishes the frame as the latest input.
pub struct InputTap {
    accumulator: FrameAccumulator,
    state: Arc<StreamState>,
    sender: Arc<dyn FrameSender>,
    active: Arc<AtomicBool>,
    send_failing: bool,
}

impl InputTap {
    pub fn new(
        state: Arc<StreamState>,
        sender: Arc<dyn FrameSender>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            accumulator: FrameAccumulator::new(state.frame_size()),
            state,
            sender,
            active,
            send_failing: false,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        if !self.active.load(Ordering::Acquire) {
            self.accumulator.clear();
            return;
        }
        let Self {
            accumulator,
            state,
            sender,
            active,
            send_failing,
        } = self;
        accumulator.push(samples, |frame| {
            // A stop may land between frames of one callback
            if !active.load(Ordering::Acquire) {
                return;
            }
            match sender.send_frame(FrameCodec::encode(&frame)) {
                Ok(()) => {
                    if *send_failing {
                        info!("Sending audio frames again");
                        *send_failing = false;
                    }
                }
                Err(err) => {
                    if !*send_failing {
                        warn!("Dropping audio frame: {}", err);
                        *send_failing = true;
                    }
                }
            }
            state.publish_input(Arc::new(frame));
        });
    }
}

/// The output side of the audio callback.
///
/// Plays the latest processed frame scaled by the output gain, wrapping back
/// to its start (and picking up a newer frame if one arrived) when it runs out.
pub struct PlaybackTap {
    state: Arc<StreamState>,
    active: Arc<AtomicBool>,
    current: Arc<AudioFrame>,
    version: u64,
    cursor: usize,
}

impl PlaybackTap {
    pub fn new(state: Arc<StreamState>, active: Arc<AtomicBool>) -> Self {
        Self {
            current: state.output_frame(),
            version: state.output_version(),
            state,
            active,
            cursor: 0,
        }
    }

    /// Fills `out` with mono samples.
    pub fn fill(&mut self, out: &mut [f32]) {
        if !self.active.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }
        let gain = self.state.output_gain();
        for sample in out.iter_mut() {
            if self.cursor >= self.current.len() {
                self.refresh();
            }
            *sample = match self.current.samples().get(self.cursor) {
                Some(&s) => {
                    self.cursor += 1;
                    s * gain
                }
                None => 0.0,
            };
        }
    }

    fn refresh(&mut self) {
        let version = self.state.output_version();
        if version != self.version {
            self.current = self.state.output_frame();
            self.version = version;
        }
        self.cursor = 0;
    }
}

/// Owns the audio device for one session.
pub struct CaptureEngine {
    backend: Box<dyn AudioBackend>,
    sample_rate: Option<u32>,
    active: Option<Arc<AtomicBool>>,
}

impl CaptureEngine {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            sample_rate: None,
            active: None,
        }
    }

    /// Acquires the input (and output) device. Returns the sample rate the
    /// device actually runs at.
    pub fn initialize(&mut self, constraints: &CaptureConstraints) -> Result<u32, CaptureError> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        let rate = self.backend.initialize(constraints)?;
        info!("Audio backend {} ready at {} Hz", self.backend.name(), rate);
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    pub fn is_initialized(&self) -> bool {
        self.sample_rate.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Wires the device callbacks to `state` and `sender`.
    pub fn start(
        &mut self,
        state: Arc<StreamState>,
        sender: Arc<dyn FrameSender>,
        faults: FaultCallback,
    ) -> Result<(), CaptureError> {
        if !self.is_initialized() {
            return Err(CaptureError::NotInitialized);
        }
        if self.is_running() {
            return Ok(());
        }

        // Each start gets its own flag so callbacks from an earlier run stay muted
        let active = Arc::new(AtomicBool::new(true));
        let input = InputTap::new(state.clone(), sender, active.clone());
        let playback = PlaybackTap::new(state, active.clone());

        if let Err(err) = self.backend.start(input, playback, faults) {
            active.store(false, Ordering::Release);
            return Err(err);
        }
        self.active = Some(active);
        info!("Capture started");
        Ok(())
    }

    /// Detaches the callbacks. A no-op when not started.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.store(false, Ordering::Release);
        self.backend.stop();
        info!("Capture stopped");
    }

    /// Stops and releases the devices.
    pub fn release(&mut self) {
        self.stop();
        if self.sample_rate.take().is_some() {
            self.backend.release();
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.release();
    }
}
