//! OpenAI-compatible chat-completions backend.

use super::{Backend, ChatRequest, StructuredRequest, transport_error};
use crate::prompt::{EMPTY_REPLY_FALLBACK, OPENING_FILLER};
use crate::types::{ChatTurn, Role};
use crate::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CONVERSE_TEMPERATURE: f32 = 0.7;

/// Settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericHttpConfig {
    pub api_key: String,
    /// Base URL without a trailing slash, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
}

impl GenericHttpConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.as_ref();
        Self {
            api_key: api_key.into(),
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::MissingCredential(
                "no API key configured for the generic-http provider".into(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::EndpointOrModelNotFound(
                "no base URL configured for the generic-http provider".into(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: Option<ApiChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Backend for any endpoint speaking the chat-completions convention.
#[derive(Debug, Clone)]
pub struct GenericHttpBackend {
    client: reqwest::Client,
    config: GenericHttpConfig,
}

impl GenericHttpBackend {
    pub fn new(config: GenericHttpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &GenericHttpConfig {
        &self.config
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Model => "assistant",
        }
    }

    fn chat_messages<'a>(system: &'a str, turns: &'a [ChatTurn]) -> Vec<ApiMessage<'a>> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ApiMessage {
            role: "system",
            content: system,
        });
        if turns.is_empty() {
            messages.push(ApiMessage {
                role: "user",
                content: OPENING_FILLER,
            });
        } else {
            messages.extend(turns.iter().map(|t| ApiMessage {
                role: Self::role_to_api(t.role),
                content: &t.text,
            }));
        }
        messages
    }

    /// POST a completion request and return the first choice's content.
    async fn complete(&self, request: &ApiRequest<'_>) -> Result<Option<String>> {
        let url = self.config.completions_url();
        tracing::debug!(%url, model = request.model, messages = request.messages.len(), "chat completion request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Unknown(format!("unreadable completion body: {e}")))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content))
    }
}

impl std::fmt::Display for GenericHttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generic-http({}, base={})", self.config.model, self.config.base_url)
    }
}

impl Backend for GenericHttpBackend {
    async fn converse(&self, request: ChatRequest<'_>) -> Result<String> {
        self.config.validate()?;

        let api_request = ApiRequest {
            model: &self.config.model,
            messages: Self::chat_messages(request.system.as_str(), request.turns),
            temperature: CONVERSE_TEMPERATURE,
            response_format: None,
        };

        let text = self
            .complete(&api_request)
            .await?
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string());
        Ok(text)
    }

    async fn generate_structured(&self, request: StructuredRequest<'_>) -> Result<Value> {
        self.config.validate()?;

        let api_request = ApiRequest {
            model: &self.config.model,
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt,
            }],
            temperature: request.temperature,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let text = self
            .complete(&api_request)
            .await?
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::MalformedGenerationOutput("empty structured reply".into()))?;

        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| Error::MalformedGenerationOutput(format!("reply is not JSON: {e}")))?;

        if request.expects_array() {
            Ok(unwrap_array_field(value))
        } else {
            Ok(value)
        }
    }
}

/// JSON-object mode forces an object at the top level, so models wrap the
/// requested array in a single field. Return the first array-valued field, or
/// the value unchanged.
pub(crate) fn unwrap_array_field(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let found = map.values().find(|v| v.is_array()).cloned();
            found.unwrap_or(Value::Object(map))
        }
        other => other,
    }
}

fn upstream_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message);
    match parsed {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("request failed with status {status}"),
    }
}

fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = upstream_message(status, body);
    let detail = format!("{message} (HTTP {})", status.as_u16());
    match status {
        StatusCode::UNAUTHORIZED => Error::AuthInvalid(detail),
        StatusCode::NOT_FOUND => Error::EndpointOrModelNotFound(detail),
        StatusCode::TOO_MANY_REQUESTS => Error::QuotaExceeded(detail),
        _ => Error::Unknown(detail),
    }
}
