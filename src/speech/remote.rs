//! Remote speech synthesis via OpenAI-compatible API
//!
//! Posts to `{endpoint}/v1/audio/speech` and plays the returned WAV. Works
//! with OpenAI, Kokoro-FastAPI, openedai-speech and similar servers.

use super::{SpeechAudio, Synthesizer};
use crate::config::SpeechConfig;
use crate::error::SynthesisError;
use crate::http::{normalize_endpoint, RequestFailure};
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

/// Upper bound on a single answer's audio
const MAX_AUDIO_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug)]
pub struct RemoteSynthesizer {
    endpoint: String,
    model: String,
    voice: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl RemoteSynthesizer {
    pub fn new(config: &SpeechConfig) -> Result<Self, SynthesisError> {
        let endpoint = config.remote_endpoint.as_deref().ok_or_else(|| {
            SynthesisError::ConfigError(
                "remote_endpoint is required when speech backend = 'remote'".into(),
            )
        })?;
        let endpoint = normalize_endpoint(endpoint).map_err(SynthesisError::ConfigError)?;

        let api_key = config
            .remote_api_key
            .clone()
            .or_else(|| std::env::var("VOXLOOP_TTS_API_KEY").ok());

        Ok(Self {
            endpoint,
            model: config
                .remote_model
                .clone()
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: config
                .remote_voice
                .clone()
                .unwrap_or_else(|| "alloy".to_string()),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        }
    }
}

impl Synthesizer for RemoteSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        let url = format!("{}/v1/audio/speech", self.endpoint);
        let mut request = ureq::post(&url).timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request
            .send_json(self.request_body(text))
            .map_err(|e| match RequestFailure::from(e) {
                RequestFailure::Status(msg) => SynthesisError::RemoteError(msg),
                RequestFailure::Transport(msg) => SynthesisError::NetworkError(msg),
            })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_AUDIO_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| SynthesisError::NetworkError(format!("Failed to read audio: {}", e)))?;

        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        tracing::debug!("Received {} bytes of speech from {}", bytes.len(), url);
        Ok(SpeechAudio::new(bytes))
    }
}
