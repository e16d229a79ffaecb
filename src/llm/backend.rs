//! The remote generation service.
//!
//! [`CompletionBackend`] is a single request/response exchange with no retry
//! logic of its own; retries and error classification live in the client.

use super::message::{HistoryTurn, MessagePart, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default REST base for the generative language API
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Everything needed for one generation call, already mapped to a concrete model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    pub history: Vec<HistoryTurn>,
    pub parts: Vec<MessagePart>,
    /// Extended-reasoning budget; `None` disables extended reasoning
    pub thinking_budget: Option<u32>,
}

/// A failed exchange, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Symbolic status such as `RESOURCE_EXHAUSTED`
    pub status_text: Option<String>,
    pub message: String,
    /// Retry-after hint surfaced in the error payload
    pub retry_after: Option<Duration>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            status_text: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one exchange. An empty string is a successful, empty answer.
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let body = WireRequest::from(request);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::new(network_error_message(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::new(network_error_message(&e)).with_status(status.as_u16()))?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let parsed: WireResponse = serde_json::from_str(&text).map_err(|e| {
            BackendError::new(format!("Failed to parse model response: {}", e))
                .with_status(status.as_u16())
        })?;
        Ok(parsed.text())
    }
}

fn network_error_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timed out waiting for the model".to_string()
    } else if err.is_connect() {
        "Could not connect to the model service".to_string()
    } else {
        format!("Network error: {}", err)
    }
}

/// Turn an error response body into a [`BackendError`].
///
/// Bodies that aren't the structured error envelope keep the raw text.
pub(crate) fn parse_error_body(status: u16, body: &str) -> BackendError {
    let Ok(envelope) = serde_json::from_str::<WireErrorEnvelope>(body) else {
        return BackendError::new(body.trim().to_string()).with_status(status);
    };
    let err = envelope.error;

    let mut out = BackendError::new(err.message).with_status(err.code.unwrap_or(status));
    if let Some(status_text) = err.status {
        out = out.with_status_text(status_text);
    }
    if let Some(delay) = err
        .details
        .iter()
        .filter_map(|d| d.retry_delay.as_deref())
        .find_map(parse_duration_secs)
    {
        out = out.with_retry_after(delay);
    }
    out
}

/// Parse a protobuf-style duration such as `"37s"` or `"1.5s"`.
/// Values that don't fit a [`Duration`] are treated as absent.
fn parse_duration_secs(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireInlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    thinking_config: WireThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    thinking_budget: u32,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

impl From<&MessagePart> for WirePart {
    fn from(part: &MessagePart) -> Self {
        match part {
            MessagePart::Text(text) => WirePart::text(text),
            MessagePart::InlineData { media_type, data } => WirePart {
                text: None,
                inline_data: Some(WireInlineData {
                    mime_type: media_type.clone(),
                    data: data.clone(),
                }),
            },
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

impl From<&CompletionRequest> for WireRequest {
    fn from(request: &CompletionRequest) -> Self {
        let mut contents: Vec<WireContent> = request
            .history
            .iter()
            .map(|turn| WireContent {
                role: Some(role_name(turn.role)),
                parts: vec![WirePart::text(&turn.text)],
            })
            .collect();
        contents.push(WireContent {
            role: Some(role_name(Role::User)),
            parts: request.parts.iter().map(WirePart::from).collect(),
        });

        WireRequest {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart::text(&request.system_instruction)],
            },
            contents,
            generation_config: request
                .thinking_budget
                .filter(|budget| *budget > 0)
                .map(|thinking_budget| WireGenerationConfig {
                    thinking_config: WireThinkingConfig { thinking_budget },
                }),
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
}

#[derive(Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Deserialize)]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on summarized-thought parts, which are not part of the answer
    #[serde(default)]
    thought: bool,
}

impl WireResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<WireErrorDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireErrorDetail {
    #[serde(default)]
    retry_delay: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(thinking_budget: Option<u32>) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.5-pro".into(),
            system_instruction: "be helpful".into(),
            history: vec![HistoryTurn::user("hi"), HistoryTurn::model("hello")],
            parts: vec![
                MessagePart::InlineData {
                    media_type: "image/png".into(),
                    data: "aGk=".into(),
                },
                MessagePart::text("what is this?"),
            ],
            thinking_budget,
        }
    }

    #[test]
    fn test_request_serialization_with_thinking() {
        let json = serde_json::to_value(WireRequest::from(&request(Some(1024)))).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(
            json["contents"][2]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][2]["parts"][1]["text"], "what is this?");
        assert_eq!(
            json["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
    }

    #[test]
    fn test_zero_budget_omits_thinking_config() {
        for budget in [None, Some(0)] {
            let json = serde_json::to_value(WireRequest::from(&request(budget))).unwrap();
            assert!(json.get("generationConfig").is_none());
        }
    }

    #[test]
    fn test_response_text_skips_thought_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"hidden","thought":true},
            {"text":"Hello "},
            {"text":"world"}
        ]}}]}"#;
        let parsed: WireResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "Hello world");
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let parsed: WireResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn test_parse_quota_error_with_retry_info() {
        let body = r#"{"error":{"code":429,"message":"You exceeded your current quota. Please retry in 37.5s.","status":"RESOURCE_EXHAUSTED","details":[
            {"@type":"type.googleapis.com/google.rpc.QuotaFailure"},
            {"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"37s"}
        ]}}"#;
        let err = parse_error_body(429, body);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.status_text.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert_eq!(err.retry_after, Some(Duration::from_secs(37)));
        assert!(err.message.contains("quota"));
    }

    #[test]
    fn test_parse_unstructured_error_body() {
        let err = parse_error_body(502, "Bad Gateway\n");
        assert_eq!(err.status, Some(502));
        assert_eq!(err.message, "Bad Gateway");
        assert!(err.retry_after.is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_secs("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration_secs("0.5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration_secs("soon"), None);
        assert_eq!(parse_duration_secs("-3s"), None);
        assert_eq!(parse_duration_secs("NaNs"), None);
    }

    #[test]
    fn test_oversized_retry_delay_is_ignored() {
        let body = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED","details":[
            {"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"1e30s"}
        ]}}"#;
        let err = parse_error_body(429, body);
        assert_eq!(err.status, Some(429));
        assert!(err.retry_after.is_none());
    }
}
