use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::engine::{InputTap, PlaybackTap};
use crate::audio::Sinewave;
use crate::error::CaptureError;

/// Reports a device failure that happened after start.
pub type FaultCallback = Arc<dyn Fn(CaptureError) + Send + Sync>;

/// What the session asks of the input device.
///
/// The service does all signal processing, so the device must deliver the raw
/// signal: echo cancellation, noise suppression and automatic gain control
/// stay off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl CaptureConstraints {
    pub fn raw(
        input_device: Option<String>,
        output_device: Option<String>,
        sample_rate: u32,
        frame_size: usize,
    ) -> Self {
        Self {
            input_device,
            output_device,
            sample_rate,
            frame_size,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }

    pub fn wants_device_processing(&self) -> bool {
        self.echo_cancellation || self.noise_suppression || self.auto_gain_control
    }
}

/// An audio device pair the [`CaptureEngine`](super::CaptureEngine) drives.
pub trait AudioBackend {
    fn name(&self) -> &str;

    /// Acquires the devices. Returns the sample rate actually in use.
    fn initialize(&mut self, constraints: &CaptureConstraints) -> Result<u32, CaptureError>;

    /// Starts calling `input` with captured samples and `playback` for
    /// output samples until [`stop`](AudioBackend::stop).
    fn start(
        &mut self,
        input: InputTap,
        playback: PlaybackTap,
        faults: FaultCallback,
    ) -> Result<(), CaptureError>;

    /// Stops the callbacks. Must not return while a callback is running.
    fn stop(&mut self);

    /// Releases the devices acquired by `initialize`.
    fn release(&mut self) {}
}

/// Hardware-free backend producing a sine tone at the real frame cadence.
pub struct SyntheticBackend {
    frequency: f32,
    sample_rate: u32,
    frame_size: usize,
    fail_with: Option<CaptureError>,
    lose_device: Option<(usize, CaptureError)>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticBackend {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            sample_rate: 0,
            frame_size: 0,
            fail_with: None,
            lose_device: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// A backend whose `initialize` always fails with `error`.
    pub fn failing(error: CaptureError) -> Self {
        let mut backend = Self::new(0.0);
        backend.fail_with = Some(error);
        backend
    }

    /// A backend whose device goes away after `frames` frames: the tone
    /// stops and `error` is reported through the fault callback.
    pub fn losing_device_after(frequency: f32, frames: usize, error: CaptureError) -> Self {
        let mut backend = Self::new(frequency);
        backend.lose_device = Some((frames, error));
        backend
    }
}

impl AudioBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn initialize(&mut self, constraints: &CaptureConstraints) -> Result<u32, CaptureError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.sample_rate = constraints.sample_rate;
        self.frame_size = constraints.frame_size;
        info!(
            "Synthetic {} Hz tone at {} Hz, {} samples per frame",
            self.frequency, self.sample_rate, self.frame_size
        );
        Ok(self.sample_rate)
    }

    fn start(
        &mut self,
        mut input: InputTap,
        mut playback: PlaybackTap,
        faults: FaultCallback,
    ) -> Result<(), CaptureError> {
        if self.sample_rate == 0 || self.frame_size == 0 {
            return Err(CaptureError::NotInitialized);
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let period =
            Duration::from_secs_f64(self.frame_size as f64 / f64::from(self.sample_rate));
        let frame_size = self.frame_size;
        let mut tone = Sinewave::new(self.frequency, 0.5, self.sample_rate);
        let running = self.running.clone();
        let mut lose_device = self.lose_device.clone();
        running.store(true, Ordering::Release);

        let worker = thread::Builder::new()
            .name("synthetic-audio".to_string())
            .spawn(move || {
                let mut block = vec![0.0f32; frame_size];
                let mut out = vec![0.0f32; frame_size];
                let mut next = Instant::now();
                let mut frames = 0usize;
                while running.load(Ordering::Acquire) {
                    if lose_device.as_ref().is_some_and(|(after, _)| frames >= *after) {
                        if let Some((_, err)) = lose_device.take() {
                            warn!("Synthetic device lost: {}", err);
                            faults(err);
                        }
                        break;
                    }
                    tone.fill(&mut block);
                    input.push(&block);
                    playback.fill(&mut out);
                    frames += 1;

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                debug!("Synthetic audio thread exiting");
            })
            .map_err(|err| CaptureError::Stream(format!("failed to spawn audio thread: {err}")))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Synthetic audio thread panicked");
        }
    }
}

impl Drop for SyntheticBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
