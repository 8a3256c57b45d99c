use crate::error::{NlqError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?is)```(?:sql)?\s*(.*?)\s*```").unwrap();
    static ref FIRST_SELECT: Regex = Regex::new(r"(?is)\bSELECT\b.*?(?:;|\z)").unwrap();
}

/// Text-generation backend that writes SQL. Returns the raw model output;
/// use [`extract_sql`] to pull the statement out of it.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for Ollama's `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SqlGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        debug!("Calling {} with a {} byte prompt", self.model, prompt.len());
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::GenerationTransport(format!("LLM API call failed: {}", e)))?
            .error_for_status()
            .map_err(|e| NlqError::GenerationTransport(format!("LLM API returned error: {}", e)))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| NlqError::GenerationTransport(format!("Failed to parse LLM response: {}", e)))?;

        Ok(parsed.response)
    }
}

/// The SQL in a model response: the first fenced block if there is one,
/// otherwise the first `SELECT …` up to a `;` or the end, otherwise the
/// whole text trimmed.
pub fn extract_sql(response: &str) -> String {
    if let Some(block) = FENCED_BLOCK.captures(response).and_then(|c| c.get(1)) {
        return block.as_str().trim().to_string();
    }
    if let Some(select) = FIRST_SELECT.find(response) {
        return select.as_str().trim().to_string();
    }
    response.trim().to_string()
}
