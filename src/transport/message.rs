//! JSON envelopes exchanged with the processing service.

use serde::{Deserialize, Serialize};

use crate::state::{Config, ConfigPatch, Metrics};

/// Client to service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// One captured frame, base64 PCM32LE.
    AudioData { data: String },
    /// A partial config edit.
    ConfigUpdate { config: ConfigPatch },
}

/// Service to client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    ProcessedAudio {
        data: String,
        #[serde(default)]
        metrics: Option<Metrics>,
    },
    ConfigUpdated {
        config: Config,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FilterType, OperationMode};
    use serde_json::json;

    #[test]
    fn test_audio_data_envelope() {
        let msg = Outbound::AudioData {
            data: "AACAPw==".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "audio_data", "data": "AACAPw=="})
        );
    }

    #[test]
    fn test_config_update_envelope_carries_partial_config() {
        let msg = Outbound::ConfigUpdate {
            config: ConfigPatch {
                operation_mode: Some(OperationMode::NoiseReduction),
                ..ConfigPatch::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "config_update", "config": {"operation_mode": 2}})
        );
    }

    #[test]
    fn test_processed_audio_with_and_without_metrics() {
        let with: Inbound = serde_json::from_str(
            r#"{"type":"processed_audio","data":"","metrics":{"rms":0.5,"peak":0.9,"dominant_freq":440}}"#,
        )
        .unwrap();
        assert_eq!(
            with,
            Inbound::ProcessedAudio {
                data: String::new(),
                metrics: Some(Metrics {
                    rms: 0.5,
                    peak: 0.9,
                    dominant_freq: 440.0
                }),
            }
        );

        let without: Inbound =
            serde_json::from_str(r#"{"type":"processed_audio","data":"AAAAAA=="}"#).unwrap();
        assert!(matches!(without, Inbound::ProcessedAudio { metrics: None, .. }));
    }

    #[test]
    fn test_config_updated_parses_full_config() {
        let msg: Inbound = serde_json::from_str(
            r#"{"type":"config_updated","config":{"operation_mode":3,"filter_type":"bandpass",
                "noise_threshold":0.2,"low_cut_freq":100,"high_cut_freq":2000,"volume_gain":0.5}}"#,
        )
        .unwrap();
        let Inbound::ConfigUpdated { config } = msg else {
            panic!("expected config_updated");
        };
        assert_eq!(config.operation_mode, OperationMode::BandFilter);
        assert_eq!(config.filter_type, FilterType::Bandpass);
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        let msg: Inbound = serde_json::from_str(r#"{"type":"heartbeat","seq":4}"#).unwrap();
        assert_eq!(msg, Inbound::Unrecognized);
    }
}
