//! Remote speech-to-text transcription via OpenAI-compatible API
//!
//! Sends audio to a remote whisper.cpp server or OpenAI-compatible endpoint
//! for transcription, so a classroom laptop can use a GPU box on the LAN.

use super::{whisper_input, Transcriber, WHISPER_SAMPLE_RATE};
use crate::audio::CaptureBuffer;
use crate::config::TranscribeConfig;
use crate::error::TranscribeError;
use crate::http::{normalize_endpoint, RequestFailure};
use std::io::Cursor;
use std::time::Duration;

/// Remote transcriber using OpenAI-compatible Whisper API
#[derive(Debug)]
pub struct RemoteTranscriber {
    /// Base endpoint URL (e.g., "http://192.168.1.100:8080")
    endpoint: String,
    /// Model name to send to server
    model: String,
    language: String,
    /// Optional API key for authentication
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteTranscriber {
    pub fn new(config: &TranscribeConfig) -> Result<Self, TranscribeError> {
        let endpoint = config.remote_endpoint.as_deref().ok_or_else(|| {
            TranscribeError::ConfigError(
                "remote_endpoint is required when backend = 'remote'".into(),
            )
        })?;
        let endpoint = normalize_endpoint(endpoint).map_err(TranscribeError::ConfigError)?;

        let api_key = config
            .remote_api_key
            .clone()
            .or_else(|| std::env::var("VOXLOOP_WHISPER_API_KEY").ok());

        let model = config
            .remote_model
            .clone()
            .unwrap_or_else(|| "whisper-1".to_string());

        let timeout = Duration::from_secs(config.remote_timeout_secs.unwrap_or(30));

        tracing::info!(
            "Configured remote transcriber: endpoint={}, model={}, timeout={}s",
            endpoint,
            model,
            timeout.as_secs()
        );

        Ok(Self {
            endpoint,
            model,
            language: config.language.clone(),
            api_key,
            timeout,
        })
    }

    /// Build the multipart form body for the API request
    fn build_multipart_body(&self, wav_data: &[u8]) -> (String, Vec<u8>) {
        let boundary = format!(
            "----VoxloopBoundary{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut body = Vec::new();
        let mut field = |name: &str, value: &[u8]| {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            );
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        };

        field("model", self.model.as_bytes());
        if self.language != "auto" {
            field("language", self.language.as_bytes());
        }
        field("response_format", b"json");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        body.extend_from_slice(wav_data);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }
}

impl Transcriber for RemoteTranscriber {
    fn transcribe(&self, audio: &CaptureBuffer) -> Result<String, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::AudioFormat("Empty audio buffer".into()));
        }

        let samples = whisper_input(audio);
        tracing::debug!(
            "Sending {:.2}s of audio to remote server",
            samples.len() as f32 / WHISPER_SAMPLE_RATE as f32
        );

        let start = std::time::Instant::now();

        let wav_data = encode_wav(&samples, WHISPER_SAMPLE_RATE)?;
        let (boundary, body) = self.build_multipart_body(&wav_data);
        let url = format!("{}/v1/audio/transcriptions", self.endpoint);

        let mut request = ureq::post(&url).timeout(self.timeout).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={}", boundary),
        );

        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request
            .send_bytes(&body)
            .map_err(|e| match RequestFailure::from(e) {
                RequestFailure::Status(msg) => TranscribeError::RemoteError(msg),
                RequestFailure::Transport(msg) => TranscribeError::NetworkError(msg),
            })?;

        let json: serde_json::Value = response.into_json().map_err(|e| {
            TranscribeError::RemoteError(format!("Failed to parse response: {}", e))
        })?;

        let text = extract_text(&json)?;

        tracing::info!(
            "Remote transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            text
        );

        Ok(text)
    }
}

fn extract_text(json: &serde_json::Value) -> Result<String, TranscribeError> {
    json.get("text")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            TranscribeError::RemoteError(format!("Response missing 'text' field: {}", json))
        })
}

/// Encode mono f32 samples as 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TranscribeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| TranscribeError::AudioFormat(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| TranscribeError::AudioFormat(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| TranscribeError::AudioFormat(format!("Failed to finalize WAV: {}", e)))?;

    Ok(buffer.into_inner())
}
