//! Extraction oracle. One prompt in, one candidate out.
//!
//! The production implementation talks to an Ollama server's chat
//! endpoint in JSON mode. Transport and HTTP failures are errors and
//! abort the run; a reply whose *content* is not the expected JSON
//! degrades to an empty candidate, which the quality gate then
//! rejects on its own terms.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OracleError;
use crate::prompts::SYSTEM_PROMPT;

/// What the oracle claims to have extracted. Confidence is carried
/// unclamped; range enforcement happens in the quality gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionCandidate {
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub extraction_notes: String,
}

impl ExtractionCandidate {
    /// An empty candidate with only a notes marker, used when the
    /// oracle is skipped.
    pub fn empty(notes: &str) -> Self {
        Self {
            extraction_notes: notes.to_string(),
            ..Self::default()
        }
    }

    /// Lenient parse of the oracle's content payload. Malformed JSON
    /// or wrong-typed fields default to empty/zero.
    pub fn from_payload(content: &str) -> Self {
        let value: Value = serde_json::from_str(content).unwrap_or(Value::Null);

        let text_field = |key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        let confidence = match value.get("confidence") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };

        Self {
            question: text_field("question"),
            answer: text_field("answer"),
            confidence,
            extraction_notes: text_field("extraction_notes"),
        }
    }
}

/// Call-and-response extraction service the orchestrator depends on.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Model name recorded in the run manifest.
    fn model_name(&self) -> &str;

    async fn extract(&self, prompt: &str) -> Result<ExtractionCandidate, OracleError>;
}

/// Ollama-backed oracle using the `/api/chat` endpoint in JSON mode.
pub struct OllamaOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaOracle {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ExtractionOracle for OllamaOracle {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, prompt: &str) -> Result<ExtractionCandidate, OracleError> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "format": "json",
            "stream": false,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        let content = envelope
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("{}");

        Ok(ExtractionCandidate::from_payload(content))
    }
}
