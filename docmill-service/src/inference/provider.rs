//! Inference provider implementations.
//!
//! A closed set of two: the HTTP provider talking to an Ollama-compatible
//! endpoint, and a deterministic mock used by tests and throwaway
//! deployments. The active variant is resolved once at startup from
//! configuration.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::{InferenceConfig, InferenceProviderKind};
use crate::error::{InferenceError, ServiceError, ServiceResult};

/// One generation call to the inference endpoint
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Closed set of inference provider implementations
pub enum InferenceProvider {
    Http(HttpProvider),
    Mock(MockProvider),
}

impl InferenceProvider {
    /// Resolve the configured provider. Called once at startup.
    pub fn from_config(config: &InferenceConfig) -> ServiceResult<Self> {
        match config.provider {
            InferenceProviderKind::Http => Ok(InferenceProvider::Http(HttpProvider::new(config)?)),
            InferenceProviderKind::Mock => Ok(InferenceProvider::Mock(MockProvider::canned())),
        }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        match self {
            InferenceProvider::Http(p) => p.generate(request).await,
            InferenceProvider::Mock(p) => p.generate(request),
        }
    }
}

/// HTTP client for an Ollama-compatible generation endpoint
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(config: &InferenceConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Inference(InferenceError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = GenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Connection {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let message = response.text().await.unwrap_or_default();

            return Err(match code {
                429 => InferenceError::Throttled,
                401 | 403 => InferenceError::AccessDenied,
                404 => InferenceError::InvalidModel {
                    model: request.model.clone(),
                },
                500..=599 => InferenceError::Unavailable { status: code },
                _ if message.contains("model") && message.contains("not found") => {
                    InferenceError::InvalidModel {
                        model: request.model.clone(),
                    }
                }
                _ => InferenceError::Request { message },
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let generated: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| InferenceError::InvalidResponse { source: e })?;

        Ok(generated.response)
    }
}

/// Deterministic provider for tests.
///
/// Scripted mode pops queued responses in order; once the script is
/// exhausted (or in canned mode) it routes on keywords in the prompt and
/// returns a plausible fixed response for each operation.
pub struct MockProvider {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn canned() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(responses: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Number of generate calls made so far
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order
    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }

        let prompt = &request.prompt;
        let response = if prompt.starts_with("Classify") {
            r#"{"category": "Report", "confidences": {"Report": 0.9, "Other": 0.1}, "tags": ["mock"]}"#
                .to_string()
        } else if prompt.starts_with("Summarize") {
            "A concise mock summary of the document.\nKey points:\n- first point\n- second point"
                .to_string()
        } else if prompt.starts_with("Extract") {
            r#"{"entities": [{"type": "organization", "value": "Acme Corp", "confidence": 0.95}]}"#
                .to_string()
        } else if prompt.starts_with("Determine") {
            r#"{"primary_intent": "informational", "confidence": 0.8, "suggested_action": "File for reference"}"#
                .to_string()
        } else {
            "mock response".to_string()
        };

        Ok(response)
    }
}

// Wire types for the generation endpoint

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
