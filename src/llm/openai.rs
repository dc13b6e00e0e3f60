//! OpenAI chat-completions provider.

use super::CompletionProvider;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use tracing::warn;

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        // Keyless dev mode: answer with a canned count-rows generation so the
        // service can be exercised without credentials.
        if self.api_key == "dummy-api-key" {
            warn!("OPENAI_API_KEY not set, returning canned response");
            return Ok(r#"{"sql": "SELECT COUNT(*) AS n FROM data", "explanation": "Counts all rows in the dataset", "chart_type": "bar", "x_column": null, "y_column": "n", "title": "Row Count"}"#.to_string());
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a data analyst. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 1000,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("OpenAI API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Provider(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(PipelineError::Provider(format!(
                "OpenAI API error: {}",
                error
            )));
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                PipelineError::Provider(format!(
                    "No content in OpenAI response: {}",
                    response_json
                ))
            })?;

        Ok(content.to_string())
    }
}
