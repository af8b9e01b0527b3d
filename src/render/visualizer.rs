//! Waveform and spectrum painters.

use super::canvas::{Canvas, Color, Point};
use crate::audio::SpectrumEstimator;

pub const BACKGROUND: Color = Color::rgb(0xf8, 0xf9, 0xfa);
pub const GRID: Color = Color::rgb(0xe0, 0xe0, 0xe0).with_alpha(0.5);
pub const INPUT_WAVE: Color = Color::rgb(0x66, 0x7e, 0xea).with_alpha(0.7);
pub const OUTPUT_WAVE: Color = Color::rgb(0xe7, 0x4c, 0x3c);
pub const SPECTRUM_BAR: Color = Color::rgb(0x00, 0xb8, 0x94);
pub const TITLE: Color = Color::rgb(0x2c, 0x3e, 0x50);
pub const MARKER: Color = Color::rgb(0x7f, 0x8c, 0x8d);

pub const HORIZONTAL_DIVISIONS: usize = 5;
pub const VERTICAL_DIVISIONS: usize = 10;
/// Bars are stretched so quiet signals stay visible.
pub const BAR_SCALE: f32 = 10.0;

const GRID_LINE_WIDTH: f32 = 0.5;

pub struct Visualizer {
    estimator: SpectrumEstimator,
}

impl Visualizer {
    pub fn new(bins: usize) -> Self {
        Self {
            estimator: SpectrumEstimator::new(bins),
        }
    }

    /// Input and processed waveforms overlaid on one canvas.
    pub fn draw_waveforms(&self, canvas: &mut dyn Canvas, input: &[f32], output: &[f32]) {
        canvas.clear(BACKGROUND);
        draw_grid(canvas);

        let (width, height) = (canvas.width(), canvas.height());
        canvas.polyline(&waveform_points(input, width, height), INPUT_WAVE, 1.0);
        canvas.polyline(&waveform_points(output, width, height), OUTPUT_WAVE, 1.0);

        canvas.text(
            (10.0, 20.0),
            "Waveform: input (blue) vs processed (red)",
            TITLE,
            12.0,
        );
    }

    /// Spectrum estimate of the processed frame as a bar chart, with
    /// frequency markers up to the Nyquist frequency of `sample_rate`.
    pub fn draw_spectrum(&self, canvas: &mut dyn Canvas, output: &[f32], sample_rate: u32) {
        canvas.clear(BACKGROUND);
        draw_grid(canvas);

        let (width, height) = (canvas.width(), canvas.height());
        let spectrum = self.estimator.estimate(output);
        if !spectrum.is_empty() {
            let bar_width = width / spectrum.len() as f32;
            for (i, &value) in spectrum.iter().enumerate() {
                let bar_height = bar_height(value, height);
                if bar_height > 0.0 {
                    canvas.fill_rect(
                        i as f32 * bar_width,
                        height - bar_height,
                        (bar_width - 1.0).max(0.0),
                        bar_height,
                        SPECTRUM_BAR,
                    );
                }
            }
        }

        canvas.text((10.0, 20.0), "Spectrum", TITLE, 12.0);
        for (index, freq) in frequency_markers(sample_rate).into_iter().enumerate() {
            let x = index as f32 / 4.0 * width;
            canvas.text((x - 15.0, height - 5.0), &format!("{freq}Hz"), MARKER, 10.0);
        }
    }
}

/// Maps samples to canvas points: `[-1, 1]` onto `[0, height]`, one sample
/// per `width / len` step. Samples outside `[-1, 1]` are clamped.
pub fn waveform_points(samples: &[f32], width: f32, height: f32) -> Vec<Point> {
    if samples.is_empty() {
        return Vec::new();
    }
    let step = width / samples.len() as f32;
    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let v = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
            (i as f32 * step, (v + 1.0) * height / 2.0)
        })
        .collect()
}

pub fn bar_height(value: f32, height: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    (value * height * BAR_SCALE).clamp(0.0, height)
}

/// 0, 1/4, 1/2, 3/4 and 1 times the Nyquist frequency, rounded to whole Hz.
pub fn frequency_markers(sample_rate: u32) -> [u32; 5] {
    let nyquist = sample_rate as f32 / 2.0;
    [0.0, 0.25, 0.5, 0.75, 1.0].map(|f| (nyquist * f).round() as u32)
}

fn draw_grid(canvas: &mut dyn Canvas) {
    let (width, height) = (canvas.width(), canvas.height());
    for i in 0..=HORIZONTAL_DIVISIONS {
        let y = i as f32 / HORIZONTAL_DIVISIONS as f32 * height;
        canvas.line((0.0, y), (width, y), GRID, GRID_LINE_WIDTH);
    }
    for i in 0..=VERTICAL_DIVISIONS {
        let x = i as f32 / VERTICAL_DIVISIONS as f32 * width;
        canvas.line((x, 0.0), (x, height), GRID, GRID_LINE_WIDTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::canvas::{DisplayList, DrawCommand};

    fn lines(list: &DisplayList) -> usize {
        list.commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count()
    }

    fn bars(list: &DisplayList) -> Vec<(f32, f32)> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillRect { y, h, color, .. } if *color == SPECTRUM_BAR => Some((*y, *h)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_waveform_mapping() {
        let points = waveform_points(&[-1.0, 0.0, 1.0, 4.0], 400.0, 200.0);
        assert_eq!(
            points,
            vec![(0.0, 0.0), (100.0, 100.0), (200.0, 200.0), (300.0, 200.0)]
        );
        assert!(waveform_points(&[], 400.0, 200.0).is_empty());
    }

    #[test]
    fn test_waveform_canvas_has_grid_and_two_traces() {
        let visualizer = Visualizer::new(256);
        let mut canvas = DisplayList::new(800.0, 200.0);
        visualizer.draw_waveforms(&mut canvas, &[0.1; 16], &[-0.1; 16]);

        assert_eq!(lines(&canvas), 6 + 11);
        let traces: Vec<_> = canvas
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Polyline { color, points, .. } => Some((*color, points.len())),
                _ => None,
            })
            .collect();
        assert_eq!(traces, vec![(INPUT_WAVE, 16), (OUTPUT_WAVE, 16)]);
    }

    #[test]
    fn test_silent_spectrum_draws_no_bars() {
        let visualizer = Visualizer::new(256);
        let mut canvas = DisplayList::new(512.0, 100.0);
        visualizer.draw_spectrum(&mut canvas, &[0.0; 4096], 44100);

        assert!(bars(&canvas).is_empty());
        assert_eq!(lines(&canvas), 17);
    }

    #[test]
    fn test_spectrum_bar_heights_are_scaled_and_clamped() {
        let visualizer = Visualizer::new(2);
        let mut canvas = DisplayList::new(100.0, 100.0);
        // Bin means: 0.05 and 0.5
        visualizer.draw_spectrum(&mut canvas, &[0.05, -0.05, 0.5, 0.5], 8000);

        assert_eq!(bars(&canvas), vec![(50.0, 50.0), (0.0, 100.0)]);
    }

    #[test]
    fn test_frequency_markers() {
        assert_eq!(frequency_markers(44100), [0, 5513, 11025, 16538, 22050]);
        assert_eq!(frequency_markers(48000), [0, 6000, 12000, 18000, 24000]);
    }
}
