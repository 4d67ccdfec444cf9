//! Speech synthesis through an external program
//!
//! The answer is passed as the last argument and the program must write
//! encoded audio to stdout, e.g. `espeak-ng -v es --stdout` or `piper` with
//! a wrapper script.

use super::{SpeechAudio, Synthesizer};
use crate::command::CommandRunner;
use crate::config::SpeechConfig;
use crate::error::SynthesisError;
use std::time::Duration;
use tokio::runtime::Handle;

pub struct CommandSynthesizer {
    runner: CommandRunner,
}

impl CommandSynthesizer {
    pub fn new(config: &SpeechConfig, runtime: Handle) -> Result<Self, SynthesisError> {
        let runner = CommandRunner::from_argv(
            &config.command,
            Duration::from_secs(config.timeout_secs),
            runtime,
        )
        .ok_or_else(|| {
            SynthesisError::ConfigError("speech.command must name a program".to_string())
        })?;
        Ok(Self { runner })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        let start = std::time::Instant::now();
        let bytes = self
            .runner
            .run(text)
            .map_err(|e| SynthesisError::Failed(format!("{}: {}", self.runner.program(), e)))?;

        if bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        tracing::debug!(
            "Synthesized {} bytes in {:.2}s",
            bytes.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(SpeechAudio::new(bytes))
    }
}
