//! LLM collaborator: the [`TextModel`] trait and the Gemini REST client.
//!
//! The pipeline only ever talks to `dyn TextModel`, so tests script the
//! collaborator and no network client is constructed when
//! [`crate::config::SummaryConfig::model_client`] is set. The production
//! implementation, [`GeminiModel`], calls the `generateContent` REST
//! endpoint directly over reqwest; the API key is supplied per call, which
//! is what makes pool rotation free (one shared HTTP client, no per-key
//! re-initialisation).
//!
//! Failures are deliberately coarse: [`ModelError`] carries enough to log
//! and classify, and [`ModelError::is_rate_limit`] is the single place that
//! decides what counts as throttling.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// System instruction, if any.
    pub system: Option<String>,
    /// User prompt text.
    pub prompt: String,
    /// Inline image parts (image inputs enter the pipeline this way).
    pub images: Vec<ImagePart>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ModelRequest {
    /// Text-only request with the given prompt.
    pub fn text(system: Option<String>, prompt: String, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            system,
            prompt,
            images: Vec::new(),
            temperature,
            max_output_tokens,
        }
    }
}

/// Base64-encoded inline image attachment.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime: String,
    pub data_base64: String,
}

/// Errors from a single model invocation.
///
/// Retry policy lives elsewhere; this type only reports what happened.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Model returned an empty response")]
    Empty,
}

impl ModelError {
    /// Whether this failure is a throttling signal.
    ///
    /// HTTP 429 is definitive; otherwise the lowercased message is scanned
    /// for quota-class substrings, since several providers report quota
    /// exhaustion as a 400/500 with an explanatory body.
    pub fn is_rate_limit(&self) -> bool {
        if let ModelError::Api { status: 429, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        const SIGNALS: [&str; 7] = [
            "429",
            "quota",
            "rate limit",
            "rate-limit",
            "ratelimit",
            "too many requests",
            "resource_exhausted",
        ];
        SIGNALS.iter().any(|s| text.contains(s))
    }
}

/// An LLM that completes text prompts.
///
/// The API key is an argument rather than construction state so a single
/// client instance serves every key in the pool.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, api_key: &str, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Google Gemini `generateContent` client.
pub struct GeminiModel {
    model: String,
    http: reqwest::Client,
}

impl GeminiModel {
    /// Build a client for the given model id with a per-request timeout.
    pub fn new(model: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            model: model.into(),
            http,
        })
    }

    fn build_request_body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        for image in &request.images {
            parts.push(json!({
                "inline_data": { "mime_type": image.mime, "data": image.data_base64 }
            }));
        }
        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
            }
        });
        if let Some(system) = &request.system {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

#[async_trait]
impl TextModel for GeminiModel {
    async fn complete(&self, api_key: &str, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!(
            "{GEMINI_API_BASE}/models/{}:generateContent?key={}",
            self.model, api_key
        );
        debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            images = request.images.len(),
            "sending generateContent request"
        );

        let response = self
            .http
            .post(&url)
            .json(&self.build_request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generateContent returned an error");
            return Err(ModelError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, 2_000),
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let parts = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| ModelError::Parse(truncate_chars(&payload.to_string(), 400)))?;
        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

impl std::fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModel")
            .field("model", &self.model)
            .finish()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ModelRequest {
        ModelRequest::text(
            Some("be terse".into()),
            "summarize this".into(),
            0.3,
            8_192,
        )
    }

    #[test]
    fn body_includes_system_instruction_and_generation_config() {
        let model = GeminiModel::new("gemini-2.5-flash", Duration::from_secs(30)).unwrap();
        let body = model.build_request_body(&sample_request());

        assert_eq!(body["system_instruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "summarize this");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8_192);
    }

    #[test]
    fn body_omits_system_instruction_when_absent() {
        let model = GeminiModel::new("gemini-2.5-flash", Duration::from_secs(30)).unwrap();
        let mut request = sample_request();
        request.system = None;
        let body = model.build_request_body(&request);
        assert!(body.get("system_instruction").is_none());
    }

    #[test]
    fn body_carries_inline_image_parts() {
        let model = GeminiModel::new("gemini-2.5-flash", Duration::from_secs(30)).unwrap();
        let mut request = sample_request();
        request.images.push(ImagePart {
            mime: "image/jpeg".into(),
            data_base64: "aGVsbG8=".into(),
        });
        let body = model.build_request_body(&request);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    }

    #[test]
    fn status_429_is_rate_limit() {
        let err = ModelError::Api {
            status: 429,
            body: "slow down".into(),
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn quota_text_is_rate_limit() {
        let err = ModelError::Api {
            status: 400,
            body: "Quota exceeded for quota metric".into(),
        };
        assert!(err.is_rate_limit());
        let err = ModelError::Parse("RESOURCE_EXHAUSTED: try later".into());
        assert!(err.is_rate_limit());
    }

    #[test]
    fn ordinary_errors_are_not_rate_limits() {
        let err = ModelError::Api {
            status: 401,
            body: "invalid api key".into(),
        };
        assert!(!err.is_rate_limit());
        // "generateContent" must not trip a bare "rate" substring.
        let err = ModelError::Parse("generateContent response had no candidates".into());
        assert!(!err.is_rate_limit());
        assert!(!ModelError::Empty.is_rate_limit());
    }
}
