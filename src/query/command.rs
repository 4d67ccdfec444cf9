//! Language backend that shells out to a program
//!
//! The full prompt is passed as the last argument; stdout is the answer.
//! Works with `ollama run <model>`, `llama-cli -p`, or any wrapper script.

use super::LanguageModel;
use crate::command::{CommandError, CommandRunner};
use crate::config::QueryConfig;
use crate::error::QueryError;
use std::time::Duration;
use tokio::runtime::Handle;

pub struct CommandModel {
    runner: CommandRunner,
}

impl CommandModel {
    pub fn new(config: &QueryConfig, runtime: Handle) -> Result<Self, QueryError> {
        let runner = CommandRunner::from_argv(
            &config.command,
            Duration::from_secs(config.timeout_secs),
            runtime,
        )
        .ok_or_else(|| {
            QueryError::ConfigError("query.command must name a program".to_string())
        })?;

        Ok(Self { runner })
    }
}

impl LanguageModel for CommandModel {
    fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        let stdout = self.runner.run(prompt).map_err(|e| match e {
            CommandError::Timeout(secs) => QueryError::Timeout(secs),
            other => QueryError::Unavailable(other.to_string()),
        })?;

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
