//! Hardware backend on top of cpal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, PlayStreamError, SampleFormat, SampleRate,
    SizedSample, Stream, StreamConfig, StreamError, SupportedStreamConfig,
};
use dasp_sample::FromSample;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, CaptureConstraints, FaultCallback};
use super::engine::{InputTap, PlaybackTap};
use crate::error::CaptureError;

/// Default (or name-matched) input and output devices of the default host.
///
/// Input is downmixed to mono; playback writes the same mono sample to every
/// output channel.
#[derive(Default)]
pub struct CpalBackend {
    input: Option<(Device, SupportedStreamConfig)>,
    output: Option<(Device, SupportedStreamConfig)>,
    streams: Vec<Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn initialize(&mut self, constraints: &CaptureConstraints) -> Result<u32, CaptureError> {
        if constraints.wants_device_processing() {
            return Err(CaptureError::UnsupportedFormat(
                "device-side voice processing is not supported".to_string(),
            ));
        }
        let host = cpal::default_host();

        let input_device = match &constraints.input_device {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| classify(e.to_string()))?
                .find(|d| name_matches(d, wanted))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("no input device matching {wanted:?}"))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device".to_string())
            })?,
        };
        info!("Using input device: {}", device_name(&input_device));

        let input_config = negotiate(&input_device, constraints.sample_rate, Direction::Input)?;
        let rate = input_config.sample_rate().0;
        debug!("Input config: {:?}", input_config);

        let output_device = match &constraints.output_device {
            Some(wanted) => host
                .output_devices()
                .ok()
                .and_then(|mut devices| devices.find(|d| name_matches(d, wanted))),
            None => host.default_output_device(),
        };
        self.output = match output_device {
            Some(device) => match negotiate(&device, rate, Direction::Output) {
                Ok(config) => {
                    info!("Using output device: {}", device_name(&device));
                    if config.sample_rate().0 != rate {
                        warn!(
                            "Output runs at {} Hz while input runs at {} Hz",
                            config.sample_rate().0,
                            rate
                        );
                    }
                    Some((device, config))
                }
                Err(err) => {
                    warn!("Output device unusable, playback disabled: {}", err);
                    None
                }
            },
            None => {
                warn!("No output device, playback disabled");
                None
            }
        };

        self.input = Some((input_device, input_config));
        Ok(rate)
    }

    fn start(
        &mut self,
        input: InputTap,
        playback: PlaybackTap,
        faults: FaultCallback,
    ) -> Result<(), CaptureError> {
        if !self.streams.is_empty() {
            return Ok(());
        }
        let Some((device, config)) = &self.input else {
            return Err(CaptureError::NotInitialized);
        };

        let stream_config = config.config();
        let input_stream = match config.sample_format() {
            SampleFormat::I16 => build_input::<i16>(device, &stream_config, input, faults.clone()),
            SampleFormat::U16 => build_input::<u16>(device, &stream_config, input, faults.clone()),
            SampleFormat::I32 => build_input::<i32>(device, &stream_config, input, faults.clone()),
            SampleFormat::F32 => build_input::<f32>(device, &stream_config, input, faults.clone()),
            format => Err(CaptureError::UnsupportedFormat(format!("{format:?}"))),
        }?;
        input_stream.play().map_err(play_error)?;
        self.streams.push(input_stream);

        if let Some((device, config)) = &self.output {
            let stream_config = config.config();
            let output_stream = match config.sample_format() {
                SampleFormat::I16 => build_output::<i16>(device, &stream_config, playback, faults),
                SampleFormat::U16 => build_output::<u16>(device, &stream_config, playback, faults),
                SampleFormat::I32 => build_output::<i32>(device, &stream_config, playback, faults),
                SampleFormat::F32 => build_output::<f32>(device, &stream_config, playback, faults),
                format => Err(CaptureError::UnsupportedFormat(format!("{format:?}"))),
            };
            match output_stream.and_then(|s| s.play().map_err(play_error).map(|()| s)) {
                Ok(stream) => self.streams.push(stream),
                Err(err) => {
                    self.streams.clear();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping a cpal stream waits for its callback to finish
        self.streams.clear();
    }

    fn release(&mut self) {
        self.stop();
        self.input = None;
        self.output = None;
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

fn name_matches(device: &Device, wanted: &str) -> bool {
    device
        .name()
        .map(|name| name.to_lowercase().contains(&wanted.to_lowercase()))
        .unwrap_or(false)
}

/// The device's default config at `wanted` Hz if the device supports that
/// rate, otherwise the default config as is.
fn negotiate(
    device: &Device,
    wanted: u32,
    direction: Direction,
) -> Result<SupportedStreamConfig, CaptureError> {
    let default = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    }
    .map_err(default_config_error)?;

    if default.sample_rate().0 == wanted {
        return Ok(default);
    }

    let ranges: Vec<_> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|r| r.collect())
            .unwrap_or_default(),
        Direction::Output => device
            .supported_output_configs()
            .map(|r| r.collect())
            .unwrap_or_default(),
    };
    let exact = ranges.into_iter().find(|range| {
        range.channels() == default.channels()
            && range.sample_format() == default.sample_format()
            && range.min_sample_rate().0 <= wanted
            && wanted <= range.max_sample_rate().0
    });

    match exact {
        Some(range) => Ok(range.with_sample_rate(SampleRate(wanted))),
        None => {
            warn!(
                "Device does not support {} Hz, using {} Hz",
                wanted,
                default.sample_rate().0
            );
            Ok(default)
        }
    }
}

fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut tap: InputTap,
    faults: FaultCallback,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                }));
                tap.push(&mono);
            },
            move |err| report_fault(&faults, err),
            None,
        )
        .map_err(build_error)
}

fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    mut tap: PlaybackTap,
    faults: FaultCallback,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mono.resize(data.len().div_ceil(channels), 0.0);
                tap.fill(&mut mono);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(T::from_sample(sample));
                }
            },
            move |err| report_fault(&faults, err),
            None,
        )
        .map_err(build_error)
}

fn report_fault(faults: &FaultCallback, err: StreamError) {
    match fatal_fault(&err) {
        Some(fault) => {
            error!("Audio stream failed: {}", err);
            faults(fault);
        }
        None => warn!("Audio stream error, continuing: {}", err),
    }
}

/// Only a lost device or revoked permission ends the session. Xruns and
/// other backend hiccups are logged and the stream keeps running.
fn fatal_fault(err: &StreamError) -> Option<CaptureError> {
    match err {
        StreamError::DeviceNotAvailable => Some(CaptureError::DeviceUnavailable(err.to_string())),
        _ => match classify(err.to_string()) {
            fault @ CaptureError::PermissionDenied(_) => Some(fault),
            _ => None,
        },
    }
}

/// Backends report permission problems only through their message text.
fn classify(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::Stream(message)
    }
}

fn default_config_error(err: DefaultStreamConfigError) -> CaptureError {
    match &err {
        DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(err.to_string())
        }
        DefaultStreamConfigError::StreamTypeNotSupported => {
            CaptureError::UnsupportedFormat(err.to_string())
        }
        _ => classify(err.to_string()),
    }
}

fn build_error(err: BuildStreamError) -> CaptureError {
    match &err {
        BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable(err.to_string()),
        BuildStreamError::StreamConfigNotSupported => {
            CaptureError::UnsupportedFormat(err.to_string())
        }
        _ => classify(err.to_string()),
    }
}

fn play_error(err: PlayStreamError) -> CaptureError {
    match &err {
        PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable(err.to_string()),
        _ => classify(err.to_string()),
    }
}
