//! Service configuration sourced from environment variables.
//!
//! The binary loads `.env` via dotenv before calling [`AppConfig::from_env`];
//! CLI flags may override individual fields afterwards.

use crate::llm::ProviderKind;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UPLOAD_DIR: &str = "data/uploads";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Which completion provider backs the synthesizer.
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Upper bound on a single provider call.
    pub llm_timeout: Duration,
    /// Where uploaded CSV files are persisted before loading.
    pub upload_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> crate::error::Result<Self> {
        let provider = match std::env::var("LLM_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ProviderKind::OpenAi,
        };

        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);

        Ok(Self {
            provider,
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            llm_timeout: Duration::from_secs(timeout_secs),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
        }
    }
}
