//! Client settings: defaults, an optional TOML file, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use url::Url;

/// Streaming client for the remote audio processing service
#[derive(Parser, Debug, Default)]
#[command(name = "anc-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base HTTP URL of the service, e.g. http://127.0.0.1:8000
    #[arg(short, long)]
    pub server: Option<Url>,

    /// Send a generated sine tone of this frequency instead of the microphone
    #[arg(long, value_name = "HZ")]
    pub tone: Option<f32>,

    /// Input device name (substring match)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device name (substring match)
    #[arg(long)]
    pub output_device: Option<String>,

    /// Playback volume in percent
    #[arg(long, value_name = "PERCENT")]
    pub volume: Option<u8>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    #[arg(long)]
    pub frame_size: Option<usize>,

    /// Do not fetch the service's config at connect
    #[arg(long)]
    pub no_remote_config: bool,

    /// Write an SVG of the last drawn frame here on exit
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Increase logging verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default `tracing` directive for this crate; `RUST_LOG` still wins.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "anc_client=info",
            1 => "anc_client=debug",
            _ => "anc_client=trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: Url,
    pub ws_path: String,
    pub config_path: String,
    pub fetch_remote_config: bool,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub output_volume: u8,
    pub refresh_hz: u32,
    pub spectrum_bins: usize,
    pub send_queue_frames: usize,
    pub log_capacity: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub synthetic_tone_hz: Option<f32>,
    pub snapshot_path: Option<PathBuf>,
}

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Parses [`DEFAULT_SERVER_URL`]. The literal is a well-formed absolute http
/// URL, so the parse cannot fail.
fn default_server_url() -> Url {
    Url::parse(DEFAULT_SERVER_URL).expect("DEFAULT_SERVER_URL is a valid URL")
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            ws_path: "/ws".to_string(),
            config_path: "/config".to_string(),
            fetch_remote_config: true,
            sample_rate: 44100,
            frame_size: 4096,
            output_volume: 100,
            refresh_hz: 60,
            spectrum_bins: 256,
            send_queue_frames: 32,
            log_capacity: 100,
            input_device: None,
            output_device: None,
            synthetic_tone_hz: None,
            snapshot_path: None,
        }
    }
}

impl ClientSettings {
    /// Defaults, overlaid with the `--config` file if given, overlaid with flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse settings")
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(server) = &cli.server {
            self.server_url = server.clone();
        }
        if let Some(tone) = cli.tone {
            self.synthetic_tone_hz = Some(tone);
        }
        if let Some(device) = &cli.input_device {
            self.input_device = Some(device.clone());
        }
        if let Some(device) = &cli.output_device {
            self.output_device = Some(device.clone());
        }
        if let Some(volume) = cli.volume {
            self.output_volume = volume;
        }
        if let Some(rate) = cli.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(size) = cli.frame_size {
            self.frame_size = size;
        }
        if cli.no_remote_config {
            self.fetch_remote_config = false;
        }
        if let Some(path) = &cli.snapshot {
            self.snapshot_path = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.frame_size == 0 {
            bail!("frame_size must be positive");
        }
        if self.refresh_hz == 0 {
            bail!("refresh_hz must be positive");
        }
        if self.spectrum_bins == 0 {
            bail!("spectrum_bins must be positive");
        }
        if self.send_queue_frames == 0 {
            bail!("send_queue_frames must be positive");
        }
        if self.output_volume > 100 {
            bail!("output_volume must be at most 100, got {}", self.output_volume);
        }
        if let Some(tone) = self.synthetic_tone_hz
            && !(tone.is_finite() && tone > 0.0)
        {
            bail!("synthetic tone frequency must be positive, got {tone}");
        }
        self.websocket_url()?;
        Ok(())
    }

    /// `server_url` with `http` mapped to `ws` (and `https` to `wss`), at `ws_path`.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self.server_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => bail!("unsupported server URL scheme {other:?}"),
        };
        url.set_scheme(scheme)
            .map_err(|()| anyhow!("cannot use scheme {scheme} with {}", self.server_url))?;
        url.join(&self.ws_path)
            .with_context(|| format!("Invalid websocket path {:?}", self.ws_path))
    }

    pub fn config_url(&self) -> Result<Url> {
        self.server_url
            .join(&self.config_path)
            .with_context(|| format!("Invalid config path {:?}", self.config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_url_parses() {
        let url = default_server_url();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(ClientSettings::default().server_url, url);
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = ClientSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.frame_size, 4096);
        assert_eq!(settings.log_capacity, 100);
    }

    #[test]
    fn test_websocket_url_mapping() {
        let mut settings = ClientSettings::default();
        assert_eq!(
            settings.websocket_url().unwrap().as_str(),
            "ws://127.0.0.1:8000/ws"
        );

        settings.server_url = Url::parse("https://anc.example.com/").unwrap();
        assert_eq!(
            settings.websocket_url().unwrap().as_str(),
            "wss://anc.example.com/ws"
        );
        assert_eq!(
            settings.config_url().unwrap().as_str(),
            "https://anc.example.com/config"
        );

        settings.server_url = Url::parse("ftp://example.com").unwrap();
        assert!(settings.websocket_url().is_err());
    }

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let settings = ClientSettings::from_toml(
            r#"
            server_url = "http://10.0.0.2:9000"
            frame_size = 2048
            fetch_remote_config = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.server_url.as_str(), "http://10.0.0.2:9000/");
        assert_eq!(settings.frame_size, 2048);
        assert!(!settings.fetch_remote_config);
        assert_eq!(settings.sample_rate, 44100);
    }

    #[test]
    fn test_flags_override_file() {
        let cli = Cli::try_parse_from([
            "anc-client",
            "--server",
            "http://localhost:1234",
            "--tone",
            "440",
            "--volume",
            "40",
            "--no-remote-config",
            "-v",
        ])
        .unwrap();
        let mut settings = ClientSettings::from_toml("output_volume = 80").unwrap();
        settings.apply_cli(&cli);

        assert_eq!(settings.output_volume, 40);
        assert_eq!(settings.synthetic_tone_hz, Some(440.0));
        assert!(!settings.fetch_remote_config);
        assert_eq!(settings.server_url.as_str(), "http://localhost:1234/");
        assert_eq!(cli.log_directive(), "anc_client=debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_frame = ClientSettings {
            frame_size: 0,
            ..ClientSettings::default()
        };
        assert!(zero_frame.validate().is_err());

        let loud = ClientSettings {
            output_volume: 101,
            ..ClientSettings::default()
        };
        assert!(loud.validate().is_err());

        let no_bins = ClientSettings {
            spectrum_bins: 0,
            ..ClientSettings::default()
        };
        assert!(no_bins.validate().is_err());
    }
}
