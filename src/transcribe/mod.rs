//! Speech-to-text transcription module
//!
//! Provides transcription via:
//! - Local whisper.cpp inference (whisper-rs crate)
//! - Remote OpenAI-compatible Whisper API (whisper.cpp server, OpenAI, etc.)

pub mod remote;
pub mod whisper;

use crate::audio::{resample, CaptureBuffer};
use crate::config::{TranscribeBackend, TranscribeConfig};
use crate::error::TranscribeError;
use std::borrow::Cow;

/// Rate whisper models are trained on
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Trait for speech-to-text implementations
pub trait Transcriber: Send {
    /// Transcribe one recorded question. May return an empty string when
    /// nothing intelligible was said.
    fn transcribe(&self, audio: &CaptureBuffer) -> Result<String, TranscribeError>;
}

/// Factory function to create transcriber based on configured backend
pub fn create_transcriber(
    config: &TranscribeConfig,
) -> Result<Box<dyn Transcriber>, TranscribeError> {
    match config.backend {
        TranscribeBackend::Local => {
            tracing::info!("Using local whisper transcription with model={}", config.model);
            Ok(Box::new(whisper::WhisperTranscriber::new(config)?))
        }
        TranscribeBackend::Remote => {
            tracing::info!("Using remote whisper transcription backend");
            Ok(Box::new(remote::RemoteTranscriber::new(config)?))
        }
    }
}

/// Samples at 16 kHz, resampling only when the capture used another rate
pub(crate) fn whisper_input(audio: &CaptureBuffer) -> Cow<'_, [f32]> {
    if audio.sample_rate() == WHISPER_SAMPLE_RATE {
        Cow::Borrowed(audio.samples())
    } else {
        Cow::Owned(resample(
            audio.samples(),
            audio.sample_rate(),
            WHISPER_SAMPLE_RATE,
        ))
    }
}
