//! Text-to-speech synthesis
//!
//! Turns the cleaned answer into encoded audio (WAV or MP3) that the
//! playback module can decode.

pub mod command;
pub mod remote;

use crate::config::{SpeechBackend, SpeechConfig};
use crate::error::SynthesisError;
use tokio::runtime::Handle;

/// Encoded audio bytes as produced by a synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    bytes: Vec<u8>,
}

impl SpeechAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Trait for text-to-speech implementations
pub trait Synthesizer: Send {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError>;
}

/// Factory function to create the configured synthesizer
pub fn create_synthesizer(
    config: &SpeechConfig,
    runtime: Handle,
) -> Result<Box<dyn Synthesizer>, SynthesisError> {
    match config.backend {
        SpeechBackend::Command => {
            tracing::info!("Using command speech backend: {:?}", config.command);
            Ok(Box::new(command::CommandSynthesizer::new(config, runtime)?))
        }
        SpeechBackend::Remote => {
            tracing::info!("Using remote speech backend");
            Ok(Box::new(remote::RemoteSynthesizer::new(config)?))
        }
    }
}
