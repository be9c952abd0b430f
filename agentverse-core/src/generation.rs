//! Text generation via the Gemini `generateContent` API.
//!
//! One request per call: no retries, no streaming, no caching. The most recent
//! prompt/response pair is persisted by `OutputRecord`, overwriting the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::error::AgentverseError;

// ============================================================================
// TextGenerator trait
// ============================================================================

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`, optionally overriding the sampling temperature.
    async fn generate(&self, prompt: &str, temperature: Option<f32>)
        -> Result<String, GenerationError>;

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generate(prompt, None).await
    }

    /// Model name recorded alongside outputs.
    fn model(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Missing API key: set GEMINI_API_KEY or generation.api_key")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no text (finish reason: {finish_reason})")]
    MissingText { finish_reason: String },
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationParams>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiTextClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiTextClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

impl GeminiTextClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiTextClient {
    async fn generate(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: temperature
                .or(self.temperature)
                .map(|temperature| GenerationParams { temperature }),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(GenerationError::Api { code, message });
        }

        let body: GenerateResponse = response.json().await?;
        let candidate = body.candidates.into_iter().next();
        let finish_reason = candidate
            .as_ref()
            .and_then(|c| c.finish_reason.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let text: String = candidate
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::MissingText { finish_reason });
        }

        tracing::debug!(model = %self.model, chars = text.len(), "Generated text");
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Used when no API key is configured: every call reports the missing key.
#[derive(Debug, Clone)]
pub struct UnconfiguredGenerator {
    model: String,
}

impl UnconfiguredGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, prompt: &str, _temperature: Option<f32>) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        Err(GenerationError::MissingApiKey)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Gemini client when a key is present, otherwise a generator that fails per call.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    match GeminiTextClient::new(config) {
        Ok(client) => Ok(Arc::new(client)),
        Err(GenerationError::MissingApiKey) => {
            tracing::warn!("No generation API key configured; requests will fail until one is set");
            Ok(Arc::new(UnconfiguredGenerator::new(config)))
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// Output record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub prompt: String,
    pub text_output: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// Fixed-path JSON file holding only the latest generation.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    path: PathBuf,
}

impl OutputRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, record: &GenerationRecord) -> Result<(), AgentverseError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(std::io::Error::from)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    pub async fn read(&self) -> Result<GenerationRecord, AgentverseError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes).map_err(std::io::Error::from)?)
    }
}

// ============================================================================
// TextAgent
// ============================================================================

/// Generator plus audit record: every successful call overwrites the record.
#[derive(Clone)]
pub struct TextAgent {
    generator: Arc<dyn TextGenerator>,
    record: OutputRecord,
}

impl TextAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, record: OutputRecord) -> Self {
        Self { generator, record }
    }

    pub fn record(&self) -> &OutputRecord {
        &self.record
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    pub async fn respond(&self, prompt: &str) -> Result<String, AgentverseError> {
        let text = self.generator.generate_text(prompt).await?;

        let record = GenerationRecord {
            prompt: prompt.to_string(),
            text_output: text.clone(),
            model: self.generator.model().to_string(),
            generated_at: Utc::now(),
        };
        // The reply is still returned when the audit write fails.
        if let Err(e) = self.record.write(&record).await {
            tracing::error!(error = %e, path = %self.record.path().display(), "Failed to write output record");
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str, base_url: &str) -> GenerationConfig {
        GenerationConfig {
            api_key: api_key.to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: base_url.to_string(),
            temperature: None,
            output_path: "unused.json".to_string(),
            timeout_seconds: 5,
        }
    }

    fn mock_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_generate_text_calls_api() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("test-api-key", &server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-api-key"))
            .and(body_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "what is the meaning of life"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("42")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client.generate_text("what is the meaning of life").await.unwrap();
        assert_eq!(text, "42");
    }

    #[tokio::test]
    async fn test_temperature_override_is_sent() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("k", &server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(body_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "extract"}]}],
                "generationConfig": {"temperature": 0.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("{}")))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client.generate("extract", Some(0.0)).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_empty_prompt_never_calls_upstream() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("k", &server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("unused")))
            .expect(0)
            .mount(&server)
            .await;

        assert!(matches!(
            client.generate_text("").await,
            Err(GenerationError::EmptyPrompt)
        ));
        assert!(matches!(
            client.generate_text("   ").await,
            Err(GenerationError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_missing_api_key() {
        let result = GeminiTextClient::new(&test_config("", "http://localhost"));
        assert!(matches!(result, Err(GenerationError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_unconfigured_generator_reports_missing_key() {
        let generator = create_generator(&test_config("", "http://localhost")).unwrap();
        assert_eq!(generator.model(), "gemini-2.5-flash");
        assert!(matches!(
            generator.generate_text("hello").await,
            Err(GenerationError::MissingApiKey)
        ));

        let err: AgentverseError = generator.generate_text("hello").await.unwrap_err().into();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_api_error_is_reported_without_retry() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("bad-key", &server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        match client.generate_text("hello").await {
            Err(GenerationError::Api { code, message }) => {
                assert_eq!(code, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocked_reply_has_no_text() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("k", &server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        match client.generate_text("hello").await {
            Err(GenerationError::MissingText { finish_reason }) => assert_eq!(finish_reason, "SAFETY"),
            other => panic!("Expected MissingText, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_agent_overwrites_record() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("k", &server.uri())).unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("first")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_reply("second")))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let record = OutputRecord::new(dir.path().join("text_agent_output.json"));
        let agent = TextAgent::new(Arc::new(client), record.clone());

        agent.respond("one").await.unwrap();
        agent.respond("two").await.unwrap();

        let stored = record.read().await.unwrap();
        assert_eq!(stored.prompt, "two");
        assert_eq!(stored.text_output, "second");
        assert_eq!(stored.model, "gemini-2.5-flash");

        // a single JSON object, not an appended log
        let raw = std::fs::read_to_string(record.path()).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).unwrap().is_object());
    }

    #[tokio::test]
    async fn test_text_agent_failure_leaves_record_untouched() {
        let server = MockServer::start().await;
        let client = GeminiTextClient::new(&test_config("k", &server.uri())).unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let record = OutputRecord::new(dir.path().join("out.json"));
        let agent = TextAgent::new(Arc::new(client), record.clone());

        let err = agent.respond("hello").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
        assert!(!record.path().exists());
    }
}
