//! Processing parameters and metrics exchanged with the remote service.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the remote service does to each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OperationMode {
    /// Output is the inverted input (ANC simulation).
    PhaseInversion = 1,
    /// Highpass filter followed by spectral gating.
    NoiseReduction = 2,
    /// The configured [`FilterType`] between the cut frequencies.
    BandFilter = 3,
}

impl TryFrom<u8> for OperationMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OperationMode::PhaseInversion),
            2 => Ok(OperationMode::NoiseReduction),
            3 => Ok(OperationMode::BandFilter),
            other => Err(format!("unknown operation mode {other}")),
        }
    }
}

impl From<OperationMode> for u8 {
    fn from(mode: OperationMode) -> Self {
        mode as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Highpass,
    Lowpass,
    Bandpass,
    Bandstop,
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterType::Highpass => write!(f, "highpass"),
            FilterType::Lowpass => write!(f, "lowpass"),
            FilterType::Bandpass => write!(f, "bandpass"),
            FilterType::Bandstop => write!(f, "bandstop"),
        }
    }
}

/// The processing configuration.
///
/// The authoritative copy lives on the remote service; the client holds the
/// last value the service pushed (or the one fetched at session start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub operation_mode: OperationMode,
    pub filter_type: FilterType,
    pub noise_threshold: f32,
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub volume_gain: f32,
    /// Processing sample rate, reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samplerate: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::PhaseInversion,
            filter_type: FilterType::Highpass,
            noise_threshold: 0.05,
            low_cut_freq: 300.0,
            high_cut_freq: 8000.0,
            volume_gain: 1.0,
            samplerate: None,
        }
    }
}

impl Config {
    /// Checks the invariants that must hold before a config is sent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.noise_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "noise_threshold",
                expected: "within [0, 1]",
                value: self.noise_threshold,
            });
        }
        if !(self.low_cut_freq > 0.0) || !self.low_cut_freq.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "low_cut_freq",
                expected: "a positive frequency",
                value: self.low_cut_freq,
            });
        }
        if !(self.high_cut_freq > self.low_cut_freq) || !self.high_cut_freq.is_finite() {
            return Err(ConfigError::CutoffOrder {
                low: self.low_cut_freq,
                high: self.high_cut_freq,
            });
        }
        if !(self.volume_gain >= 0.0) || !self.volume_gain.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "volume_gain",
                expected: "non-negative",
                value: self.volume_gain,
            });
        }
        Ok(())
    }

    /// Returns a copy of `self` with every field set in `patch` replaced.
    pub fn merged(&self, patch: &ConfigPatch) -> Config {
        Config {
            operation_mode: patch.operation_mode.unwrap_or(self.operation_mode),
            filter_type: patch.filter_type.unwrap_or(self.filter_type),
            noise_threshold: patch.noise_threshold.unwrap_or(self.noise_threshold),
            low_cut_freq: patch.low_cut_freq.unwrap_or(self.low_cut_freq),
            high_cut_freq: patch.high_cut_freq.unwrap_or(self.high_cut_freq),
            volume_gain: patch.volume_gain.unwrap_or(self.volume_gain),
            samplerate: self.samplerate,
        }
    }
}

/// A partial config edit, serialized with only the fields that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<FilterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_cut_freq: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_cut_freq: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_gain: Option<f32>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

/// Quality metrics computed by the remote service for a processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub rms: f32,
    pub peak: f32,
    pub dominant_freq: f32,
}
