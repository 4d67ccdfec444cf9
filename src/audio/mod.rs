//! Audio capture and playback
//!
//! Capture uses cpal, which works with PipeWire, PulseAudio, and ALSA
//! backends. Playback of synthesized answers uses rodio.
//!
//! Recording is interrupt-driven: [`AudioCaptureService::capture`] opens the
//! input, accumulates frames, and polls the shared [`InterruptSignal`] at a
//! fixed interval. The first interrupt observed stops the recording.

pub mod cpal_capture;
pub mod playback;

use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::interrupt::InterruptSignal;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared accumulator the device callback writes into.
///
/// Cloned into the audio callback; the capture service keeps the other end.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    frames: Arc<Mutex<Vec<f32>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append mono frames
    pub fn push(&self, samples: &[f32]) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(samples);
    }

    /// Record a stream failure. The first failure wins.
    pub fn fail(&self, message: impl Into<String>) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message.into());
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move all accumulated frames out
    pub fn take_frames(&self) -> Vec<f32> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// An open input stream. Dropping it closes the device.
pub trait CaptureStream: Send {
    /// Human-readable device name
    fn name(&self) -> &str;
}

/// Something that can open an input stream feeding a [`CaptureSink`]
pub trait CaptureDevice: Send {
    /// Open the input and start delivering mono frames to `sink`
    fn open(&mut self, sink: CaptureSink) -> Result<Box<dyn CaptureStream>, AudioError>;

    /// Rate of the frames delivered to the sink
    fn sample_rate(&self) -> u32;
}

/// Mono samples of one recorded question
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl CaptureBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Result of one recording
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Some audio was captured
    Captured(CaptureBuffer),
    /// The recording stopped before any frame arrived
    Empty,
}

/// Records one question at a time from a [`CaptureDevice`]
pub struct AudioCaptureService {
    device: Box<dyn CaptureDevice>,
    interrupt: Arc<InterruptSignal>,
    poll_interval: Duration,
    max_duration: Option<Duration>,
}

impl AudioCaptureService {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        interrupt: Arc<InterruptSignal>,
        config: &AudioConfig,
    ) -> Self {
        let max_duration = match config.max_duration_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        };
        Self {
            device,
            interrupt,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            max_duration,
        }
    }

    /// Record until the interrupt is raised.
    ///
    /// Consumes the interrupt that stops the recording. Also stops on a
    /// stream error or when the configured maximum duration is reached.
    /// A stream error before any frame arrived is returned as an error;
    /// after that, whatever was captured is kept.
    pub fn capture(&mut self) -> Result<CaptureOutcome, AudioError> {
        let sink = CaptureSink::new();
        let stream = self.device.open(sink.clone())?;
        let started = Instant::now();

        tracing::debug!("Recording from {}", stream.name());

        loop {
            if self.interrupt.wait_timeout_and_consume(self.poll_interval) {
                tracing::debug!("Recording stopped by hotkey");
                break;
            }
            if let Some(err) = sink.error() {
                tracing::warn!("Audio stream failed during recording: {}", err);
                break;
            }
            if let Some(limit) = self.max_duration {
                if started.elapsed() >= limit {
                    tracing::info!("Recording reached {}s limit, stopping", limit.as_secs());
                    break;
                }
            }
        }

        // Close the device before draining so no late callback is lost
        drop(stream);

        let frames = sink.take_frames();
        if frames.is_empty() {
            if let Some(err) = sink.error() {
                return Err(AudioError::Stream(err));
            }
            tracing::debug!("Recording produced no audio");
            return Ok(CaptureOutcome::Empty);
        }

        let buffer = CaptureBuffer::new(frames, self.device.sample_rate());
        tracing::debug!(
            "Captured {} samples ({:.2}s)",
            buffer.len(),
            buffer.duration().as_secs_f32()
        );
        Ok(CaptureOutcome::Captured(buffer))
    }
}

/// Linear interpolation resampling
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    struct NamedStream {
        closed: Arc<AtomicBool>,
    }

    impl CaptureStream for NamedStream {
        fn name(&self) -> &str {
            "test"
        }
    }

    impl Drop for NamedStream {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Writes `frames` into the sink on open, optionally fails, and raises
    /// the interrupt after `raise_after` if set.
    struct ScriptedDevice {
        frames: Vec<f32>,
        failure: Option<&'static str>,
        interrupt: Arc<InterruptSignal>,
        raise_after: Option<Duration>,
        closed: Arc<AtomicBool>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&mut self, sink: CaptureSink) -> Result<Box<dyn CaptureStream>, AudioError> {
            sink.push(&self.frames);
            if let Some(msg) = self.failure {
                sink.fail(msg);
            }
            if let Some(delay) = self.raise_after {
                let interrupt = self.interrupt.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    interrupt.raise();
                });
            }
            Ok(Box::new(NamedStream {
                closed: self.closed.clone(),
            }))
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    struct BrokenDevice;

    impl CaptureDevice for BrokenDevice {
        fn open(&mut self, _sink: CaptureSink) -> Result<Box<dyn CaptureStream>, AudioError> {
            Err(AudioError::DeviceInit("no microphone".into()))
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    fn test_config() -> AudioConfig {
        AudioConfig {
            poll_interval_ms: 10,
            max_duration_secs: 0,
            ..AudioConfig::default()
        }
    }

    fn service(
        frames: Vec<f32>,
        failure: Option<&'static str>,
        raise_after: Option<Duration>,
    ) -> (AudioCaptureService, Arc<InterruptSignal>, Arc<AtomicBool>) {
        let interrupt = Arc::new(InterruptSignal::new());
        let closed = Arc::new(AtomicBool::new(false));
        let device = ScriptedDevice {
            frames,
            failure,
            interrupt: interrupt.clone(),
            raise_after,
            closed: closed.clone(),
        };
        let service = AudioCaptureService::new(Box::new(device), interrupt.clone(), &test_config());
        (service, interrupt, closed)
    }

    #[test]
    fn test_capture_stops_on_interrupt() {
        let (mut service, interrupt, closed) =
            service(vec![0.1; 1600], None, Some(Duration::from_millis(30)));

        match service.capture().unwrap() {
            CaptureOutcome::Captured(buffer) => {
                assert_eq!(buffer.len(), 1600);
                assert_eq!(buffer.sample_rate(), 16000);
                assert_eq!(buffer.duration().as_millis(), 100);
            }
            CaptureOutcome::Empty => panic!("expected audio"),
        }
        assert!(closed.load(Ordering::SeqCst));
        // The stopping interrupt was consumed
        assert!(!interrupt.is_raised());
    }

    #[test]
    fn test_capture_with_pending_interrupt_returns_immediately() {
        let (mut service, interrupt, _closed) = service(vec![], None, None);
        interrupt.raise();

        assert_eq!(service.capture().unwrap(), CaptureOutcome::Empty);
    }

    #[test]
    fn test_capture_error_without_frames() {
        let (mut service, _interrupt, closed) = service(vec![], Some("device unplugged"), None);

        let err = service.capture().unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_error_keeps_partial_audio() {
        let (mut service, _interrupt, _closed) = service(vec![0.2; 320], Some("overrun"), None);

        match service.capture().unwrap() {
            CaptureOutcome::Captured(buffer) => assert_eq!(buffer.len(), 320),
            CaptureOutcome::Empty => panic!("expected partial audio"),
        }
    }

    #[test]
    fn test_capture_max_duration() {
        let interrupt = Arc::new(InterruptSignal::new());
        let device = ScriptedDevice {
            frames: vec![0.0; 16],
            failure: None,
            interrupt: interrupt.clone(),
            raise_after: None,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let config = AudioConfig {
            poll_interval_ms: 10,
            max_duration_secs: 1,
            ..AudioConfig::default()
        };
        let mut service = AudioCaptureService::new(Box::new(device), interrupt, &config);

        let started = Instant::now();
        assert!(matches!(
            service.capture().unwrap(),
            CaptureOutcome::Captured(_)
        ));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_open_failure_propagates() {
        let interrupt = Arc::new(InterruptSignal::new());
        let mut service =
            AudioCaptureService::new(Box::new(BrokenDevice), interrupt, &test_config());
        assert!(matches!(
            service.capture(),
            Err(AudioError::DeviceInit(_))
        ));
    }

    #[test]
    fn test_sink_first_failure_wins() {
        let sink = CaptureSink::new();
        sink.fail("first");
        sink.fail("second");
        assert_eq!(sink.error().as_deref(), Some("first"));
    }

    #[test]
    fn test_sink_take_frames_drains() {
        let sink = CaptureSink::new();
        sink.push(&[1.0, 2.0]);
        sink.clone().push(&[3.0]);
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.take_frames(), vec![1.0, 2.0, 3.0]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }
}
