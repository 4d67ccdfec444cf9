//! Interruptible playback of synthesized answers
//!
//! Audio is decoded with rodio (WAV or MP3) and played on the configured
//! output. While playing, the shared interrupt is polled; the first raise
//! stops playback immediately.

use crate::config::AudioConfig;
use crate::error::PlaybackError;
use crate::interrupt::InterruptSignal;
use crate::speech::SpeechAudio;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::time::Duration;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The whole answer was played
    Completed,
    /// The interrupt cut playback short
    Interrupted,
}

/// Plays encoded speech while watching the interrupt
pub trait Player: Send {
    fn play(
        &mut self,
        audio: &SpeechAudio,
        interrupt: &InterruptSignal,
    ) -> Result<PlaybackOutcome, PlaybackError>;
}

/// rodio-backed player
///
/// The output stream is opened for each answer and closed afterwards.
/// rodio's OutputStream is not Send, so it never outlives one call.
pub struct RodioPlayer {
    output_device: String,
    volume: f32,
    poll_interval: Duration,
}

impl RodioPlayer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
            volume: config.volume,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    /// Check that the output device can be opened
    pub fn probe(&self) -> Result<(), PlaybackError> {
        let (_stream, _handle) = self.open_output()?;
        Ok(())
    }

    fn open_output(&self) -> Result<(OutputStream, OutputStreamHandle), PlaybackError> {
        if self.output_device == "default" {
            return OutputStream::try_default()
                .map_err(|e| PlaybackError::Output(format!("Failed to open audio output: {}", e)));
        }

        let host = rodio::cpal::default_host();
        let wanted = self.output_device.to_lowercase();
        let device = host
            .output_devices()
            .map_err(|e| PlaybackError::Output(e.to_string()))?
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&wanted))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                PlaybackError::Output(format!("output device '{}' not found", self.output_device))
            })?;

        OutputStream::try_from_device(&device)
            .map_err(|e| PlaybackError::Output(format!("Failed to open audio output: {}", e)))
    }
}

impl Player for RodioPlayer {
    fn play(
        &mut self,
        audio: &SpeechAudio,
        interrupt: &InterruptSignal,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let source = decode(audio)?;
        let (_stream, handle) = self.open_output()?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| PlaybackError::Output(format!("Failed to create audio sink: {}", e)))?;

        sink.append(source.amplify(self.volume));

        loop {
            if sink.empty() {
                tracing::debug!("Playback finished");
                return Ok(PlaybackOutcome::Completed);
            }
            if interrupt.wait_timeout_and_consume(self.poll_interval) {
                sink.stop();
                tracing::debug!("Playback interrupted");
                return Ok(PlaybackOutcome::Interrupted);
            }
        }
    }
}

fn decode(audio: &SpeechAudio) -> Result<Decoder<Cursor<Vec<u8>>>, PlaybackError> {
    if audio.is_empty() {
        return Err(PlaybackError::Decode("no audio data".to_string()));
    }
    Decoder::new(Cursor::new(audio.bytes().to_vec()))
        .map_err(|e| PlaybackError::Decode(e.to_string()))
}
