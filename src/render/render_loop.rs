use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::canvas::Canvas;
use super::visualizer::Visualizer;
use crate::state::StreamState;

/// The two canvases the loop draws on.
pub struct Surfaces<C> {
    pub waveform: C,
    pub spectrum: C,
    pub frames_drawn: u64,
}

struct Running {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Display-clocked redraw of the waveform and spectrum canvases.
///
/// Each tick reads the latest input and output frames from [`StreamState`];
/// it never waits for a new one. The surfaces lock doubles as the draw gate:
/// a tick checks the active flag while holding it, so once
/// [`stop`](RenderLoop::stop) returns no further draw can start.
pub struct RenderLoop<C> {
    surfaces: Arc<Mutex<Surfaces<C>>>,
    visualizer: Arc<Visualizer>,
    period: Duration,
    running: Option<Running>,
}

impl<C: Canvas + Send + 'static> RenderLoop<C> {
    pub fn new(waveform: C, spectrum: C, bins: usize, refresh_hz: u32) -> Self {
        Self {
            surfaces: Arc::new(Mutex::new(Surfaces {
                waveform,
                spectrum,
                frames_drawn: 0,
            })),
            visualizer: Arc::new(Visualizer::new(bins)),
            period: Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1))),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts ticking. Must be called within a tokio runtime.
    pub fn start(&mut self, state: Arc<StreamState>) {
        if self.running.is_some() {
            return;
        }
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(tick_loop(
            self.surfaces.clone(),
            self.visualizer.clone(),
            state,
            active.clone(),
            self.period,
        ));
        self.running = Some(Running { active, task });
        info!("Render loop started at {:?} per frame", self.period);
    }

    /// Stops ticking. No draw happens after this returns.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.active.store(false, Ordering::Release);
        // Wait out a draw that is already in progress
        drop(self.lock());
        running.task.abort();
        info!("Render loop stopped");
    }

    /// Draws a single frame now.
    pub fn render_once(&self, state: &StreamState) {
        let mut surfaces = self.lock();
        draw_frame(&self.visualizer, &mut surfaces, state);
    }

    pub fn frames_drawn(&self) -> u64 {
        self.lock().frames_drawn
    }

    pub fn with_surfaces<R>(&self, f: impl FnOnce(&Surfaces<C>) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Surfaces<C>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Drop for RenderLoop<C> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.active.store(false, Ordering::Release);
            running.task.abort();
        }
    }
}

async fn tick_loop<C: Canvas>(
    surfaces: Arc<Mutex<Surfaces<C>>>,
    visualizer: Arc<Visualizer>,
    state: Arc<StreamState>,
    active: Arc<AtomicBool>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let mut guard = surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.load(Ordering::Acquire) {
            break;
        }
        draw_frame(&visualizer, &mut guard, &state);
    }
    debug!("Render task exiting");
}

fn draw_frame<C: Canvas>(visualizer: &Visualizer, surfaces: &mut Surfaces<C>, state: &StreamState) {
    let input = state.input_frame();
    let output = state.output_frame();
    visualizer.draw_waveforms(&mut surfaces.waveform, input.samples(), output.samples());
    visualizer.draw_spectrum(&mut surfaces.spectrum, output.samples(), state.sample_rate());
    surfaces.frames_drawn += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::render::canvas::{DisplayList, DrawCommand};
    use crate::transport::test_support::wait_until;

    fn new_loop(refresh_hz: u32) -> RenderLoop<DisplayList> {
        RenderLoop::new(
            DisplayList::new(400.0, 100.0),
            DisplayList::new(400.0, 100.0),
            256,
            refresh_hz,
        )
    }

    #[test]
    fn test_render_once_reads_latest_frames_without_writing() {
        let state = StreamState::new(8, 44100);
        state.publish_input(Arc::new(AudioFrame::new(vec![0.5; 8])));
        let render = new_loop(60);

        render.render_once(&state);
        render.render_once(&state);

        assert_eq!(render.frames_drawn(), 2);
        assert_eq!(state.input_version(), 1);
        assert_eq!(state.output_version(), 0);
        render.with_surfaces(|s| {
            let markers: Vec<_> = s
                .spectrum
                .commands()
                .iter()
                .filter_map(|c| match c {
                    DrawCommand::Text { text, .. } if text.ends_with("Hz") => Some(text.clone()),
                    _ => None,
                })
                .collect();
            assert_eq!(markers, ["0Hz", "5513Hz", "11025Hz", "16538Hz", "22050Hz"]);
            assert!(!s.waveform.is_empty());
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_draw_after_stop() {
        let state = Arc::new(StreamState::new(64, 44100));
        let mut render = new_loop(500);

        render.start(state.clone());
        render.start(state.clone());
        assert!(wait_until(|| render.frames_drawn() >= 3).await);

        render.stop();
        let frozen = render.frames_drawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(render.frames_drawn(), frozen);
        assert!(!render.is_running());

        render.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let state = Arc::new(StreamState::new(64, 44100));
        let mut render = new_loop(500);

        render.start(state.clone());
        assert!(wait_until(|| render.frames_drawn() >= 1).await);
        render.stop();

        let before = render.frames_drawn();
        render.start(state);
        assert!(wait_until(|| render.frames_drawn() > before).await);
        render.stop();
    }
}
