//! Whisper-based speech-to-text transcription
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local transcription.

use super::{whisper_input, Transcriber, WHISPER_SAMPLE_RATE};
use crate::audio::CaptureBuffer;
use crate::config::{Config, TranscribeConfig};
use crate::error::TranscribeError;
use std::path::PathBuf;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper-based transcriber
pub struct WhisperTranscriber {
    /// Whisper context (holds the model)
    ctx: WhisperContext,
    /// Language for transcription
    language: String,
    /// Number of threads to use
    threads: usize,
}

impl WhisperTranscriber {
    /// Load the configured model
    pub fn new(config: &TranscribeConfig) -> Result<Self, TranscribeError> {
        let model_path = resolve_model_path(&config.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = std::time::Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| TranscribeError::ModelNotFound("Invalid path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::InitFailed(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            ctx,
            language: config.language.clone(),
            threads,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &CaptureBuffer) -> Result<String, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::AudioFormat("Empty audio buffer".to_string()));
        }

        let samples = whisper_input(audio);
        let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        let start = std::time::Instant::now();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // "auto" enables language detection
        if self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }

        params.set_n_threads(self.threads as i32);

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // Children's questions are short; silence should not become text
        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }

        if let Some(audio_ctx) = calculate_audio_ctx(duration_secs) {
            params.set_audio_ctx(audio_ctx);
            tracing::debug!(
                "Using audio_ctx={} for {:.2}s clip",
                audio_ctx,
                duration_secs
            );
        }

        state
            .full(params, &samples)
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(
                segment
                    .to_str()
                    .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?,
            );
        }

        let result = text.trim().to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if result.chars().count() > 50 {
                format!("{}...", result.chars().take(50).collect::<String>())
            } else {
                result.clone()
            }
        );

        Ok(result)
    }
}

/// Map a model name to its ggml file name
fn model_filename(model: &str) -> Result<&str, TranscribeError> {
    let filename = match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        "large" | "large-v1" => "ggml-large-v1.bin",
        "large-v2" => "ggml-large-v2.bin",
        "large-v3" => "ggml-large-v3.bin",
        "large-v3-turbo" => "ggml-large-v3-turbo.bin",
        other if other.ends_with(".bin") => other,
        other => {
            return Err(TranscribeError::ModelNotFound(format!(
                "Unknown model: '{}'. Valid models: tiny, base, small, medium, large-v3, large-v3-turbo",
                other
            )));
        }
    };
    Ok(filename)
}

/// Resolve model name to file path
fn resolve_model_path(model: &str) -> Result<PathBuf, TranscribeError> {
    let path = PathBuf::from(model);
    if path.is_absolute() && path.exists() {
        return Ok(path);
    }

    let filename = model_filename(model)?;

    let candidates = [
        Config::models_dir().join(filename),
        PathBuf::from(filename),
        PathBuf::from("models").join(filename),
    ];

    if let Some(found) = candidates.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    Err(TranscribeError::ModelNotFound(format!(
        "Model '{}' not found. Looked in:\n{}\n\nDownload from: https://huggingface.co/ggerganov/whisper.cpp/tree/main",
        model,
        candidates
            .iter()
            .map(|p| format!("  - {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    )))
}

/// Calculate audio_ctx parameter for short clips (≤22.5s).
/// Formula: duration_seconds * 50 + 64
fn calculate_audio_ctx(duration_secs: f32) -> Option<i32> {
    if duration_secs <= 22.5 {
        Some((duration_secs * 50.0) as i32 + 64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filename() {
        assert_eq!(model_filename("base").unwrap(), "ggml-base.bin");
        assert_eq!(model_filename("large-v3").unwrap(), "ggml-large-v3.bin");
        assert_eq!(model_filename("custom.bin").unwrap(), "custom.bin");
        assert!(model_filename("gigantic").is_err());
    }

    #[test]
    fn test_missing_model_lists_search_paths() {
        let err = resolve_model_path("ggml-does-not-exist.bin").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ggml-does-not-exist.bin"));
        assert!(message.contains("models"));
    }

    #[test]
    fn test_audio_ctx() {
        assert_eq!(calculate_audio_ctx(2.0), Some(164));
        assert_eq!(calculate_audio_ctx(22.5), Some(1189));
        assert_eq!(calculate_audio_ctx(25.0), None);
    }
}
