//! Metric readout and per-state control enablement.

use crate::state::{Metrics, SessionState};

/// Metrics formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsReadout {
    pub rms: String,
    pub peak: String,
    pub dominant_freq: String,
}

impl From<&Metrics> for MetricsReadout {
    fn from(metrics: &Metrics) -> Self {
        Self {
            rms: format!("{:.3}", metrics.rms),
            peak: format!("{:.3}", metrics.peak),
            dominant_freq: format!("{} Hz", metrics.dominant_freq.round()),
        }
    }
}

/// Which session controls can be used, and the status shown next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub connect: bool,
    pub disconnect: bool,
    pub start: bool,
    pub stop: bool,
    pub status: &'static str,
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Disconnected,
    Connecting,
    Connected,
}

impl Controls {
    pub fn for_state(state: SessionState) -> Self {
        match state {
            SessionState::Idle => Self {
                connect: true,
                disconnect: false,
                start: false,
                stop: false,
                status: "Disconnected",
                indicator: Indicator::Disconnected,
            },
            SessionState::Connecting => Self {
                connect: false,
                disconnect: false,
                start: false,
                stop: false,
                status: "Connecting...",
                indicator: Indicator::Connecting,
            },
            SessionState::Connected => Self {
                connect: false,
                disconnect: true,
                start: true,
                stop: false,
                status: "Connected",
                indicator: Indicator::Connected,
            },
            SessionState::Processing => Self {
                connect: false,
                disconnect: true,
                start: false,
                stop: true,
                status: "Processing audio",
                indicator: Indicator::Connected,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_formatting() {
        let readout = MetricsReadout::from(&Metrics {
            rms: 0.123456,
            peak: 1.0,
            dominant_freq: 439.6,
        });
        assert_eq!(readout.rms, "0.123");
        assert_eq!(readout.peak, "1.000");
        assert_eq!(readout.dominant_freq, "440 Hz");
        assert_eq!(MetricsReadout::from(&Metrics::default()).dominant_freq, "0 Hz");
    }

    #[test]
    fn test_controls_follow_state() {
        let idle = Controls::for_state(SessionState::Idle);
        assert!(idle.connect && !idle.disconnect && !idle.start && !idle.stop);

        let connecting = Controls::for_state(SessionState::Connecting);
        assert!(!connecting.connect && !connecting.disconnect);

        let connected = Controls::for_state(SessionState::Connected);
        assert!(connected.disconnect && connected.start && !connected.stop);

        let processing = Controls::for_state(SessionState::Processing);
        assert!(processing.stop && !processing.start);
        assert_eq!(processing.status, "Processing audio");
    }
}
