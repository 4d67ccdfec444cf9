//! cpal-based audio capture
//!
//! Uses the cpal crate for cross-platform audio input.
//! Works with PipeWire, PulseAudio, and ALSA backends.
//!
//! Note: cpal::Stream is not Send, so each recording builds its stream on a
//! dedicated thread that owns it until the recording ends.

use super::{resample, CaptureDevice, CaptureSink, CaptureStream};
use crate::config::AudioConfig;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// How long to wait for the capture thread to report the stream is live
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters for building an audio input stream
struct StreamBuildParams {
    sink: CaptureSink,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Microphone selected by name from the audio config
pub struct CpalDevice {
    device_name: String,
    sample_rate: u32,
}

impl CpalDevice {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.device.clone(),
            sample_rate: config.sample_rate,
        }
    }

    /// Check the input device exists and exposes a usable config.
    ///
    /// Returns the resolved device name. Any failure is reported as
    /// [`AudioError::DeviceInit`] since it means no question can ever be
    /// recorded.
    pub fn probe(&self) -> Result<String, AudioError> {
        let host = cpal::default_host();
        let device = resolve_device(&host, &self.device_name).map_err(|e| match e {
            AudioError::DeviceInit(_) => e,
            other => AudioError::DeviceInit(other.to_string()),
        })?;
        device
            .default_input_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        Ok(device.name().unwrap_or_else(|_| "unknown".to_string()))
    }
}

impl CaptureDevice for CpalDevice {
    fn open(&mut self, sink: CaptureSink) -> Result<Box<dyn CaptureStream>, AudioError> {
        let device_name = self.device_name.clone();
        let target_rate = self.sample_rate;
        let (name, thread) =
            spawn_stream_thread(move || build_input(&device_name, target_rate, sink), OPEN_TIMEOUT)?;
        Ok(Box::new(CpalStream {
            name,
            _thread: thread,
        }))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Live recording; dropping it stops the stream and joins its thread
struct CpalStream {
    name: String,
    _thread: StreamThread,
}

impl CaptureStream for CpalStream {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Thread owning a stream until told to stop
struct StreamThread {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run `build` on a new thread and keep its stream alive there.
///
/// Returns once the stream reports live, `build` fails, or `open_timeout`
/// passes. On timeout the thread is left running: a wedged driver call
/// cannot be cancelled, and joining it would hang the conversation. The
/// stop message is already queued, so the thread drops the late stream
/// and exits as soon as `build` returns.
fn spawn_stream_thread<S, F>(
    build: F,
    open_timeout: Duration,
) -> Result<(String, StreamThread), AudioError>
where
    S: 'static,
    F: FnOnce() -> Result<(S, String), AudioError> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<String, AudioError>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        let stream = match build() {
            Ok((stream, name)) => {
                let _ = ready_tx.send(Ok(name));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        tracing::debug!("Audio capture thread started");
        // Runs until stop is sent or the sender is dropped
        let _ = stop_rx.recv();
        drop(stream);
        tracing::debug!("Audio capture thread stopped");
    });

    match ready_rx.recv_timeout(open_timeout) {
        Ok(Ok(name)) => Ok((
            name,
            StreamThread {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            },
        )),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = stop_tx.send(());
            tracing::warn!("Audio capture thread left behind after open timeout");
            Err(AudioError::Stream(format!(
                "audio stream did not start within {}ms",
                open_timeout.as_millis()
            )))
        }
    }
}

/// Names of all input devices on the default host
pub fn list_input_devices() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn resolve_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    if device_name == "default" {
        host.default_input_device()
            .ok_or_else(|| AudioError::DeviceInit("no default input device".to_string()))
    } else {
        find_audio_device(host, device_name)
    }
}

/// Find an audio input device by name with flexible matching.
///
/// Matching strategy (in order):
/// 1. Exact match (case-sensitive)
/// 2. Exact match (case-insensitive)
/// 3. Substring match: device name contains the search term (case-insensitive)
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?
        .collect();

    let mut named: Vec<(String, cpal::Device)> = devices
        .into_iter()
        .filter_map(|d| d.name().ok().map(|n| (n, d)))
        .collect();

    let search_lower = device_name.to_lowercase();

    let position = named
        .iter()
        .position(|(name, _)| name == device_name)
        .or_else(|| {
            named
                .iter()
                .position(|(name, _)| name.to_lowercase() == search_lower)
        })
        .or_else(|| {
            named
                .iter()
                .position(|(name, _)| name.to_lowercase().contains(&search_lower))
        });

    if let Some(index) = position {
        let (name, device) = named.swap_remove(index);
        tracing::debug!("Found audio device: {} (searched for: {})", name, device_name);
        return Ok(device);
    }

    let available = if named.is_empty() {
        "No audio input devices found.".to_string()
    } else {
        format!(
            "Available devices:\n{}",
            named
                .iter()
                .map(|(n, _)| format!("  - {}", n))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    Err(AudioError::DeviceNotFound {
        requested: device_name.to_string(),
        available,
    })
}

/// Open the device and start a playing input stream feeding `sink`
fn build_input(
    device_name: &str,
    target_rate: u32,
    sink: CaptureSink,
) -> Result<(cpal::Stream, String), AudioError> {
    let host = cpal::default_host();
    let device = resolve_device(&host, device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Using audio device: {}", name);

    let supported_config = device
        .default_input_config()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    let source_rate = supported_config.sample_rate().0;
    let source_channels = supported_config.channels() as usize;
    let sample_format = supported_config.sample_format();

    tracing::debug!(
        "Device config: {} Hz, {} channel(s), format: {:?}",
        source_rate,
        source_channels,
        sample_format
    );

    let stream_config = cpal::StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let params = StreamBuildParams {
        sink,
        source_rate,
        target_rate,
        source_channels,
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, params)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, params)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, params)?,
        format => {
            return Err(AudioError::Stream(format!(
                "Unsupported sample format: {:?}",
                format
            )));
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::Stream(format!("Failed to start audio stream: {}", e)))?;

    Ok((stream, name))
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamBuildParams,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let StreamBuildParams {
        sink,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    let error_sink = sink.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        error_sink.fail(err.to_string());
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels.max(1))
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / frame.len() as f32
                    })
                    .collect();

                if source_rate != target_rate {
                    sink.push(&resample(&mono_f32, source_rate, target_rate));
                } else {
                    sink.push(&mono_f32);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
