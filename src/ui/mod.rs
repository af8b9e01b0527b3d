//! Headless models behind the user-facing surface.
//!
//! - [`EventLog`] - Capped, timestamped event log
//! - [`MetricsReadout`] - Metrics formatted for display
//! - [`Controls`] - Which session controls are enabled in each state

pub mod log;
pub mod readout;

pub use log::{EventLog, LogEntry, LogLevel};
pub use readout::{Controls, Indicator, MetricsReadout};
