//! Language-reasoning service
//!
//! The transcribed question is wrapped in the configured prompt, sent to a
//! text-generation backend, and the raw generation is cleaned into a single
//! spoken answer.
//!
//! Backends:
//! - `command`: any program taking the prompt as its last argument
//! - `ollama`: the Ollama HTTP API

pub mod command;
pub mod ollama;
pub mod prompt;

use crate::config::{QueryBackend, QueryConfig};
use crate::error::QueryError;
use prompt::{clean_response, ClassroomProfile, PromptTemplate};
use tokio::runtime::Handle;

/// Answers a child's question
pub trait LanguageQuery: Send {
    fn query(&self, question: &str) -> Result<String, QueryError>;
}

/// Raw text generation from a full prompt
pub trait LanguageModel: Send {
    fn generate(&self, prompt: &str) -> Result<String, QueryError>;

    fn name(&self) -> &'static str;
}

/// Prompt framing plus cleanup around a [`LanguageModel`]
pub struct Assistant {
    model: Box<dyn LanguageModel>,
    template: PromptTemplate,
    stop_tokens: Vec<String>,
}

impl Assistant {
    pub fn new(
        model: Box<dyn LanguageModel>,
        template: PromptTemplate,
        stop_tokens: Vec<String>,
    ) -> Self {
        Self {
            model,
            template,
            stop_tokens,
        }
    }
}

impl LanguageQuery for Assistant {
    fn query(&self, question: &str) -> Result<String, QueryError> {
        let prompt = self.template.build(question);
        tracing::debug!(
            "Querying {} ({} chars of prompt)",
            self.model.name(),
            prompt.len()
        );

        let raw = self.model.generate(&prompt)?;
        tracing::trace!("Raw answer: {:?}", raw);

        let answer = clean_response(&raw, &self.stop_tokens);
        if answer.is_empty() {
            return Err(QueryError::EmptyAnswer);
        }

        tracing::info!("Answer: {:?}", answer);
        Ok(answer)
    }
}

/// Build the configured backend.
///
/// `runtime` drives the command backend's child process.
pub fn create_query(
    config: &QueryConfig,
    runtime: Handle,
) -> Result<Box<dyn LanguageQuery>, QueryError> {
    let classroom = config
        .classroom_file
        .as_deref()
        .map(ClassroomProfile::load)
        .transpose()?;

    if let Some(ref profile) = classroom {
        tracing::info!(
            "Loaded classroom profile: {}",
            profile.aula.as_deref().unwrap_or("unnamed")
        );
    }

    let model: Box<dyn LanguageModel> = match config.backend {
        QueryBackend::Command => Box::new(command::CommandModel::new(config, runtime)?),
        QueryBackend::Ollama => Box::new(ollama::OllamaModel::new(config)?),
    };

    tracing::info!("Using {} language backend", model.name());

    Ok(Box::new(Assistant::new(
        model,
        PromptTemplate::new(config.prompt.clone(), classroom.as_ref()),
        config.stop_tokens.clone(),
    )))
}
