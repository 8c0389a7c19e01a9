use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::config::AiConfig;

/// Text-generation backend (allows mocking).
///
/// Implementations block; async callers run them under `spawn_blocking`.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, AnalysisError>;
}

/// Ollama-compatible `/api/generate` client.
///
/// The blocking HTTP client is built per call so the struct can be created
/// on the async runtime and used from a blocking thread.
pub struct OllamaClient {
    base_url: String,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(&config.base_url, config.timeout_secs)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::HttpClient(e.to_string()))?;

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: "json",
        };

        let response = client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                AnalysisError::AiConnection(self.base_url.clone())
            } else if e.is_timeout() {
                AnalysisError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                AnalysisError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::AiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        Ok(parsed.response)
    }
}

/// Mock LLM client for testing: returns a fixed reply or a connection error.
pub struct MockLlmClient {
    response: Option<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { response: None }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, AnalysisError> {
        self.response
            .clone()
            .ok_or_else(|| AnalysisError::AiConnection("mock".into()))
    }
}
