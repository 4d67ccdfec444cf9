//! Ollama language backend
//!
//! Calls `POST {ollama_url}/api/generate` with streaming disabled.
//! Requires Ollama to be installed and running.

use super::LanguageModel;
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::http::{normalize_endpoint, RequestFailure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OllamaModel {
    /// Base URL without trailing slash
    url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaModel {
    pub fn new(config: &QueryConfig) -> Result<Self, QueryError> {
        let url = normalize_endpoint(&config.ollama_url).map_err(QueryError::ConfigError)?;
        if config.ollama_model.trim().is_empty() {
            return Err(QueryError::ConfigError(
                "query.ollama_model must not be empty".to_string(),
            ));
        }
        Ok(Self {
            url,
            model: config.ollama_model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.url)
    }
}

impl LanguageModel for OllamaModel {
    fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        let client = ureq::AgentBuilder::new().timeout(self.timeout).build();

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        tracing::debug!("Calling Ollama generate API with model: {}", self.model);

        let response = client
            .post(&self.generate_url())
            .send_json(&request)
            .map_err(|e| match RequestFailure::from(e) {
                RequestFailure::Transport(msg)
                    if msg.contains("timed out") || msg.contains("timeout") =>
                {
                    QueryError::Timeout(self.timeout.as_secs())
                }
                RequestFailure::Transport(msg) | RequestFailure::Status(msg) => {
                    QueryError::Unavailable(format!("{}: {}", self.url, msg))
                }
            })?;

        let body: GenerateResponse = response.into_json().map_err(|e| {
            QueryError::Unavailable(format!("Failed to parse generate response: {}", e))
        })?;

        Ok(body.response)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
