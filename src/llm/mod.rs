//! LLM completion providers
//!
//! The synthesizer only needs one capability: given a prompt, return the raw
//! completion text. Which provider supplies it is a configuration choice made
//! once at startup.

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::str::FromStr;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(PipelineError::Config(format!(
                "Unknown LLM provider '{}'. Expected 'openai' or 'gemini'.",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Build the provider the configuration asks for.
///
/// OpenAI falls back to a keyless dev mode when no API key is set; Gemini
/// has no such mode and requires its key.
pub fn build_provider(config: &AppConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .openai_api_key
                .clone()
                .unwrap_or_else(|| "dummy-api-key".to_string());
            Ok(Box::new(OpenAiProvider::new(
                api_key,
                config.openai_model.clone(),
            )))
        }
        ProviderKind::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("GEMINI_API_KEY is not set".to_string()))?;
            Ok(Box::new(GeminiProvider::new(
                api_key,
                config.gemini_model.clone(),
            )))
        }
    }
}
