//! Visualization of the live stream.
//!
//! - [`RenderLoop`] - Display-clocked redraw task
//! - [`Visualizer`] - Waveform, spectrum and grid painters
//! - [`Canvas`] / [`DisplayList`] - Drawing surface and a recording implementation
//! - [`svg`] - Snapshot of display lists as SVG

pub mod canvas;
pub mod render_loop;
pub mod svg;
pub mod visualizer;

pub use canvas::{Canvas, Color, DisplayList, DrawCommand, Point};
pub use render_loop::{RenderLoop, Surfaces};
pub use visualizer::Visualizer;
