//! LLM inference client.
//!
//! Four operations (classify, summarize, extract entities, detect intent),
//! each building a deterministic prompt, calling the configured provider
//! with transient-error retry, and parsing a typed result out of the
//! response. Operations never return `Err`: every failure mode ends up as
//! an error-carrying result value.

pub mod provider;
mod prompts;
pub mod results;

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::InferenceError;
pub use provider::{GenerationRequest, InferenceProvider, MockProvider};
pub use results::{
    ClassificationResult, Entity, EntityExtractionResult, IntentResult, SummaryResult,
};

/// Client for the external inference endpoint
pub struct InferenceClient {
    provider: InferenceProvider,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(provider: InferenceProvider, config: InferenceConfig) -> Self {
        Self { provider, config }
    }

    #[cfg(test)]
    pub(crate) fn provider(&self) -> &InferenceProvider {
        &self.provider
    }

    /// Classify a document into a category with per-category confidence.
    pub async fn classify(
        &self,
        text: &str,
        file_name: &str,
        document_id: &str,
    ) -> ClassificationResult {
        let started = Instant::now();
        let prompt = prompts::classification_prompt(file_name, text);

        match self.generate_with_retry(prompt).await {
            Ok(raw) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                match parse_json::<ClassificationWire>(&raw) {
                    Some(wire) => ClassificationResult {
                        category: wire.category,
                        confidences: wire.confidences,
                        tags: wire.tags,
                        duration_ms,
                        error: None,
                    },
                    None => {
                        warn!(doc_id = %document_id, "Unparseable classification response");
                        ClassificationResult::unparsed(
                            "Could not parse classification response as JSON",
                            duration_ms,
                        )
                    }
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(doc_id = %document_id, error = %e, "Classification call failed");
                ClassificationResult::failure(e.guidance(), duration_ms)
            }
        }
    }

    /// Summarize a document as free text with key points.
    pub async fn summarize(
        &self,
        text: &str,
        file_name: &str,
        document_id: &str,
    ) -> SummaryResult {
        let started = Instant::now();
        let prompt = prompts::summary_prompt(file_name, text);

        match self.generate_with_retry(prompt).await {
            Ok(raw) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let (summary, key_points) = split_summary(&raw);
                SummaryResult {
                    summary,
                    key_points,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(doc_id = %document_id, error = %e, "Summarization call failed");
                SummaryResult::failure(e.guidance(), duration_ms)
            }
        }
    }

    /// Extract typed entities from a document.
    pub async fn extract_entities(
        &self,
        text: &str,
        file_name: &str,
        document_id: &str,
    ) -> EntityExtractionResult {
        let started = Instant::now();
        let prompt = prompts::entity_extraction_prompt(file_name, text);

        match self.generate_with_retry(prompt).await {
            Ok(raw) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                match parse_json::<EntitiesWire>(&raw) {
                    Some(wire) => EntityExtractionResult {
                        entities: wire.entities,
                        duration_ms,
                        error: None,
                    },
                    None => {
                        warn!(doc_id = %document_id, "Unparseable entity response");
                        EntityExtractionResult::failure(
                            "Could not parse entity response as JSON",
                            duration_ms,
                        )
                    }
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(doc_id = %document_id, error = %e, "Entity extraction call failed");
                EntityExtractionResult::failure(e.guidance(), duration_ms)
            }
        }
    }

    /// Detect the primary intent of a document.
    pub async fn detect_intent(
        &self,
        text: &str,
        file_name: &str,
        document_id: &str,
    ) -> IntentResult {
        let started = Instant::now();
        let prompt = prompts::intent_detection_prompt(file_name, text);

        match self.generate_with_retry(prompt).await {
            Ok(raw) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                match parse_json::<IntentWire>(&raw) {
                    Some(wire) => IntentResult {
                        primary_intent: wire.primary_intent,
                        confidence: wire.confidence,
                        suggested_action: wire.suggested_action,
                        duration_ms,
                        error: None,
                    },
                    None => {
                        warn!(doc_id = %document_id, "Unparseable intent response");
                        IntentResult::failure("Could not parse intent response as JSON", duration_ms)
                    }
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(doc_id = %document_id, error = %e, "Intent detection call failed");
                IntentResult::failure(e.guidance(), duration_ms)
            }
        }
    }

    /// Call the provider, retrying transient errors with a doubling delay.
    /// Non-transient errors return immediately; exhaustion wraps the last
    /// transient error.
    async fn generate_with_retry(&self, prompt: String) -> Result<String, InferenceError> {
        let request = GenerationRequest {
            model: self.config.model.clone(),
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let mut delay = self.config.retry_base_delay();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.provider.generate(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    if attempts > self.config.max_retries {
                        return Err(InferenceError::RetriesExhausted {
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    debug!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient inference error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Clean a model response before JSON parsing: drop markdown code-fence
/// lines, then slice from the first `{` to the last `}`.
pub(crate) fn clean_json_response(raw: &str) -> Option<String> {
    let without_fences: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = without_fences.find('{')?;
    let end = without_fences.rfind('}')?;
    if end < start {
        return None;
    }
    Some(without_fences[start..=end].to_string())
}

fn parse_json<T: for<'de> Deserialize<'de>>(raw: &str) -> Option<T> {
    let cleaned = clean_json_response(raw)?;
    serde_json::from_str(&cleaned).ok()
}

/// Split a free-text summary response into prose and bulleted key points.
fn split_summary(raw: &str) -> (String, Vec<String>) {
    let trimmed = raw.trim();
    match trimmed.split_once("Key points:") {
        Some((summary, bullets)) => {
            let key_points = bullets
                .lines()
                .map(str::trim)
                .filter_map(|line| {
                    line.strip_prefix("- ")
                        .or_else(|| line.strip_prefix("* "))
                        .map(str::to_string)
                })
                .collect();
            (summary.trim().to_string(), key_points)
        }
        None => (trimmed.to_string(), Vec::new()),
    }
}

// Wire types parsed out of JSON-expecting responses

#[derive(Debug, Deserialize)]
struct ClassificationWire {
    category: String,
    #[serde(default)]
    confidences: HashMap<String, f32>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesWire {
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct IntentWire {
    primary_intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    suggested_action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InferenceConfig, InferenceProviderKind};

    fn test_config(max_retries: u32, base_delay_ms: u64) -> InferenceConfig {
        InferenceConfig {
            provider: InferenceProviderKind::Mock,
            base_url: "http://localhost:11434".to_string(),
            model: "test-model".to_string(),
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 256,
            request_timeout_secs: 10,
            max_retries,
            retry_base_delay_ms: base_delay_ms,
        }
    }

    fn mock_client(
        responses: Vec<Result<String, InferenceError>>,
        config: InferenceConfig,
    ) -> InferenceClient {
        InferenceClient::new(
            InferenceProvider::Mock(MockProvider::scripted(responses)),
            config,
        )
    }

    fn mock_calls(client: &InferenceClient) -> u32 {
        match client.provider() {
            InferenceProvider::Mock(mock) => mock.call_count(),
            InferenceProvider::Http(_) => panic!("expected mock provider"),
        }
    }

    #[test]
    fn fenced_response_parses_like_bare_json() {
        let bare = r#"{"category": "Invoice", "confidences": {"Invoice": 0.9}, "tags": ["billing"]}"#;
        let fenced = format!(
            "Sure, here is the classification you asked for:\n```json\n{bare}\n```\nLet me know if you need anything else."
        );

        let from_bare: ClassificationWire =
            serde_json::from_str(&clean_json_response(bare).unwrap()).unwrap();
        let from_fenced: ClassificationWire =
            serde_json::from_str(&clean_json_response(&fenced).unwrap()).unwrap();

        assert_eq!(from_bare.category, from_fenced.category);
        assert_eq!(from_bare.confidences, from_fenced.confidences);
        assert_eq!(from_bare.tags, from_fenced.tags);
    }

    #[test]
    fn clean_json_handles_missing_braces() {
        assert!(clean_json_response("no json here").is_none());
        assert!(clean_json_response("} backwards {").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_with_doubling_backoff() {
        let client = mock_client(
            vec![
                Err(InferenceError::Throttled),
                Err(InferenceError::Unavailable { status: 503 }),
                Err(InferenceError::Throttled),
                Ok(r#"{"category": "Report", "confidences": {}, "tags": []}"#.to_string()),
            ],
            test_config(3, 100),
        );

        let started = tokio::time::Instant::now();
        let result = client.classify("content", "doc.txt", "doc-1").await;

        // Delays of 100, 200, and 400 ms before the fourth attempt succeeds
        assert_eq!(started.elapsed().as_millis(), 700);
        assert_eq!(mock_calls(&client), 4);
        assert!(result.error.is_none());
        assert_eq!(result.category, "Report");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_becomes_error_result() {
        let client = mock_client(
            vec![
                Err(InferenceError::Throttled),
                Err(InferenceError::Throttled),
                Err(InferenceError::Throttled),
                Err(InferenceError::Throttled),
            ],
            test_config(3, 50),
        );

        let result = client.classify("content", "doc.txt", "doc-1").await;

        assert_eq!(mock_calls(&client), 4);
        assert!(result.error.is_some());
        assert!(result.category.starts_with("Error:"));
    }

    #[tokio::test(start_paused = true)]
    async fn access_denied_is_never_retried() {
        let client = mock_client(vec![Err(InferenceError::AccessDenied)], test_config(3, 100));

        let started = tokio::time::Instant::now();
        let result = client.classify("content", "doc.txt", "doc-1").await;

        assert_eq!(started.elapsed().as_millis(), 0);
        assert_eq!(mock_calls(&client), 1);
        assert!(result.error.is_some());
        assert!(result.category.starts_with("Error:"));
    }

    #[tokio::test]
    async fn invalid_model_is_never_retried() {
        let client = mock_client(
            vec![Err(InferenceError::InvalidModel {
                model: "nope".to_string(),
            })],
            test_config(3, 100),
        );

        let result = client.summarize("content", "doc.txt", "doc-1").await;

        assert_eq!(mock_calls(&client), 1);
        assert!(result.error.is_some());
        assert!(result.summary.starts_with("Summary unavailable:"));
    }

    #[tokio::test]
    async fn summary_key_points_are_split_out() {
        let client = mock_client(
            vec![Ok(
                "The document covers quarterly results.\nKey points:\n- revenue up\n- costs flat"
                    .to_string(),
            )],
            test_config(0, 10),
        );

        let result = client.summarize("content", "report.pdf", "doc-2").await;

        assert_eq!(result.summary, "The document covers quarterly results.");
        assert_eq!(result.key_points, vec!["revenue up", "costs flat"]);
    }

    #[tokio::test]
    async fn unparseable_classification_falls_back_to_unknown() {
        let client = mock_client(
            vec![Ok("I'm sorry, I can't produce JSON today.".to_string())],
            test_config(0, 10),
        );

        let result = client.classify("content", "doc.txt", "doc-3").await;

        assert_eq!(result.category, "Unknown");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn canned_mock_covers_all_operations() {
        let config = test_config(0, 10);
        let client = InferenceClient::new(InferenceProvider::Mock(MockProvider::canned()), config);

        let classification = client.classify("text", "a.txt", "d").await;
        assert_eq!(classification.category, "Report");

        let entities = client.extract_entities("text", "a.txt", "d").await;
        assert_eq!(entities.entities[0].value, "Acme Corp");

        let intent = client.detect_intent("text", "a.txt", "d").await;
        assert_eq!(intent.primary_intent, "informational");
    }
}
