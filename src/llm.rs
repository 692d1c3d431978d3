//! Chat model client: the seam between agents and a hosted model
//!
//! Defines the client trait and request/response types for one chat
//! completion round-trip. Two implementations:
//! - `OpenAiChat`: POSTs to an OpenAI-compatible `/chat/completions` endpoint (production)
//! - `MockModel`: returns scripted replies (testing)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Default endpoint for the hosted model.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A JSON schema the model's reply must conform to.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    /// Schema name reported to the model
    pub name: String,
    /// JSON Schema document
    pub schema: serde_json::Value,
}

/// One chat completion request: a system prompt plus a single user turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// When set, the model is asked for JSON matching this schema
    pub response_format: Option<ResponseFormat>,
}

/// Token accounting returned by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// The model's reply.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    /// Model that actually served the request
    pub model: String,
    pub usage: Option<Usage>,
}

/// Errors from chat model operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not available: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model refused the request: {0}")]
    Refused(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Client trait for one-shot chat completions.
///
/// Abstracts over transport (HTTP, mock) so agents don't depend on how the
/// model is reached.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Check if the model can be called at all (e.g. credentials present).
    async fn is_available(&self) -> bool;

    /// Send one request and wait for the reply.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ModelError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiChat {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiChat {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if let Some(format) = &request.response_format {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "schema": format.schema,
                },
            });
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::Unavailable("no API key configured".to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ParseError("response has no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(ModelError::Refused(refusal));
        }
        let content = choice
            .message
            .content
            .ok_or_else(|| ModelError::ParseError("response message has no content".to_string()))?;

        Ok(ChatReply {
            content,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage,
        })
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Mock model for testing: returns scripted replies in order.
///
/// Once the script runs out, the `repeating` reply (if any) is returned for
/// every further request. Every request is recorded for later inspection.
pub struct MockModel {
    available: bool,
    script: Mutex<VecDeque<Result<String, String>>>,
    repeating: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockModel {
    /// Create a mock model that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            script: Mutex::new(VecDeque::new()),
            repeating: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock model that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Queue a successful reply.
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Reply returned once the script is exhausted.
    pub fn repeating(mut self, content: impl Into<String>) -> Self {
        self.repeating = Some(content.into());
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ModelError> {
        if !self.available {
            return Err(ModelError::Unavailable(
                "mock model configured as unavailable".to_string(),
            ));
        }
        self.requests.lock().unwrap().push(request.clone());

        let next = self.script.lock().unwrap().pop_front();
        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(message)) => return Err(ModelError::RequestFailed(message)),
            None => self.repeating.clone().ok_or_else(|| {
                ModelError::RequestFailed("mock script exhausted".to_string())
            })?,
        };

        Ok(ChatReply {
            content,
            model: request.model.clone(),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> ChatRequest {
        ChatRequest {
            model: "o4-mini".to_string(),
            system: "be terse".to_string(),
            user: user.to_string(),
            response_format: None,
        }
    }

    #[tokio::test]
    async fn mock_returns_script_in_order_then_repeats() {
        let model = MockModel::available()
            .with_reply("first")
            .with_failure("boom")
            .repeating("again");

        assert_eq!(model.complete(&request("a")).await.unwrap().content, "first");
        let err = model.complete(&request("b")).await.unwrap_err();
        assert!(matches!(err, ModelError::RequestFailed(ref m) if m == "boom"));
        assert_eq!(model.complete(&request("c")).await.unwrap().content, "again");
        assert_eq!(model.complete(&request("d")).await.unwrap().content, "again");

        let users: Vec<String> = model.requests().into_iter().map(|r| r.user).collect();
        assert_eq!(users, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn mock_unavailable_returns_error() {
        let model = MockModel::unavailable();
        assert!(!model.is_available().await);
        let err = model.complete(&request("x")).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn exhausted_script_without_repeat_fails() {
        let model = MockModel::available();
        assert!(model.complete(&request("x")).await.is_err());
    }

    #[test]
    fn request_body_includes_schema_when_structured() {
        let mut req = request("hello");
        req.response_format = Some(ResponseFormat {
            name: "chunk_analysis".to_string(),
            schema: serde_json::json!({ "type": "object" }),
        });
        let body = OpenAiChat::request_body(&req);
        assert_eq!(body["model"], "o4-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "chunk_analysis");
    }

    #[tokio::test]
    async fn client_without_key_is_unavailable() {
        let client = OpenAiChat::new(DEFAULT_BASE_URL, Some("  ".to_string()), Duration::from_secs(5)).unwrap();
        assert!(!client.is_available().await);
        let err = client.complete(&request("x")).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
    }
}
