//! Managed provider backend (`generateContent` API).
//!
//! The provider's chat sessions require history that starts with a user turn
//! and a separate live message. [`session_seed`] enforces that shape before
//! anything goes on the wire.

use super::{Backend, ChatRequest, StructuredRequest, transport_error};
use crate::prompt::{EMPTY_REPLY_FALLBACK, OPENING_FILLER};
use crate::types::{ChatTurn, Role};
use crate::{Error, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MANAGED_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MANAGED_MODEL: &str = "gemini-3-flash-preview";

/// Settings for the managed provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ManagedConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_MANAGED_BASE_URL.to_string(),
            model: DEFAULT_MANAGED_MODEL.to_string(),
        }
    }

    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Self {
        let base_url = base_url.as_ref();
        self.base_url = base_url.strip_suffix('/').unwrap_or(base_url).to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// History split into what seeds a chat session and the message sent live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSeed<'a> {
    pub history: &'a [ChatTurn],
    pub live: &'a ChatTurn,
}

/// Shape `turns` for a multi-turn session.
///
/// A leading model turn (the synthetic greeting) is dropped, then the last
/// turn becomes the live message and must be from the user.
pub fn session_seed(turns: &[ChatTurn]) -> Result<SessionSeed<'_>> {
    let turns = match turns.first() {
        Some(first) if first.role == Role::Model => &turns[1..],
        _ => turns,
    };
    match turns.split_last() {
        Some((live, history)) if live.role == Role::User => Ok(SessionSeed { history, live }),
        Some((live, _)) => Err(Error::InvalidHistoryState(format!(
            "the last message must be from the user, found a {} turn",
            live.role
        ))),
        None => Err(Error::InvalidHistoryState(
            "no user message left after dropping the opening greeting".into(),
        )),
    }
}

/// Classify a managed-provider error response.
///
/// The provider reports quota and credential problems in its error text
/// rather than in distinct codes, so only the status and body are inspected.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> Error {
    let text = format!("{status}: {body}");
    let lower = body.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        Error::QuotaExceeded(text)
    } else if lower.contains("api key not valid")
        || lower.contains("invalid api key")
        || lower.contains("api_key_invalid")
        || body.contains("Requested entity was not found")
    {
        Error::AuthMissingOrInvalid(text)
    } else {
        Error::Unknown(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent<'a>>,
    contents: Vec<ApiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<ApiPart<'a>>,
}

impl<'a> ApiContent<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![ApiPart { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ApiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl ApiResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Managed provider backend.
#[derive(Debug, Clone)]
pub struct ManagedBackend {
    client: reqwest::Client,
    config: ManagedConfig,
}

impl ManagedBackend {
    pub fn new(config: ManagedConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ManagedConfig {
        &self.config
    }

    fn role_to_api(role: Role) -> &'static str {
        role.as_str()
    }

    fn require_key(&self) -> Result<()> {
        if self.config.api_key.trim().is_empty() {
            return Err(Error::AuthMissingOrInvalid(
                "no API key configured for the managed provider".into(),
            ));
        }
        Ok(())
    }

    async fn generate(&self, request: &ApiRequest<'_>) -> Result<String> {
        let url = self.config.generate_url();
        tracing::debug!(%url, contents = request.contents.len(), "generateContent request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Unknown(format!("unreadable generateContent body: {e}")))?;

        Ok(api_response.text())
    }
}

impl std::fmt::Display for ManagedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "managed({})", self.config.model)
    }
}

impl Backend for ManagedBackend {
    async fn converse(&self, request: ChatRequest<'_>) -> Result<String> {
        self.require_key()?;

        let contents = if request.turns.is_empty() {
            vec![ApiContent::text(Some("user"), OPENING_FILLER)]
        } else {
            let seed = session_seed(request.turns)?;
            seed.history
                .iter()
                .chain(std::iter::once(seed.live))
                .map(|t| ApiContent::text(Some(Self::role_to_api(t.role)), &t.text))
                .collect()
        };

        let api_request = ApiRequest {
            system_instruction: Some(ApiContent::text(None, request.system.as_str())),
            contents,
            generation_config: None,
        };

        let text = self.generate(&api_request).await?;
        if text.trim().is_empty() {
            return Ok(EMPTY_REPLY_FALLBACK.to_string());
        }
        Ok(text)
    }

    async fn generate_structured(&self, request: StructuredRequest<'_>) -> Result<Value> {
        self.require_key()?;

        let api_request = ApiRequest {
            system_instruction: None,
            contents: vec![ApiContent::text(Some("user"), request.prompt)],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request.schema,
            }),
        };

        let text = self.generate(&api_request).await?;
        if text.trim().is_empty() {
            return Err(Error::MalformedGenerationOutput(
                "empty structured reply".into(),
            ));
        }
        serde_json::from_str(text.trim())
            .map_err(|e| Error::MalformedGenerationOutput(format!("reply is not JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::prompt::SystemPrompt;
    use mockito::Matcher;
    use serde_json::json;

    fn backend(server: &mockito::ServerGuard) -> ManagedBackend {
        ManagedBackend::new(
            ManagedConfig::new("g-key")
                .base_url(server.url())
                .model("test-model"),
        )
    }

    fn reply(text: &str) -> String {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
            .to_string()
    }

    #[test]
    fn base_url_loses_one_trailing_slash() {
        let config = ManagedConfig::new("k").base_url("https://proxy.example.com/v1beta/");
        assert_eq!(
            config.generate_url(),
            format!("https://proxy.example.com/v1beta/models/{DEFAULT_MANAGED_MODEL}:generateContent")
        );
        let doubled = ManagedConfig::new("k").base_url("https://proxy.example.com//");
        assert_eq!(doubled.base_url, "https://proxy.example.com/");
    }

    #[test]
    fn seed_drops_leading_greeting_and_pops_live() {
        let turns = vec![
            ChatTurn::model("greeting"),
            ChatTurn::user("idea"),
            ChatTurn::model("why?"),
            ChatTurn::user("because"),
        ];
        let seed = session_seed(&turns).unwrap();
        assert_eq!(seed.history, &turns[1..3]);
        assert_eq!(seed.live.text, "because");
    }

    #[test]
    fn seed_with_only_user_turn_is_empty_history() {
        let turns = vec![ChatTurn::user("hello")];
        let seed = session_seed(&turns).unwrap();
        assert!(seed.history.is_empty());
        assert_eq!(seed.live.text, "hello");
    }

    #[test]
    fn seed_rejects_trailing_model_turn() {
        let turns = vec![ChatTurn::user("a"), ChatTurn::model("b")];
        let err = session_seed(&turns).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHistoryState);
    }

    #[test]
    fn seed_rejects_lone_greeting() {
        let turns = vec![ChatTurn::model("greeting")];
        let err = session_seed(&turns).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHistoryState);
    }

    #[test]
    fn any_history_ending_in_user_is_accepted() {
        let shapes: [&[Role]; 5] = [
            &[Role::User],
            &[Role::Model, Role::User],
            &[Role::User, Role::User],
            &[Role::Model, Role::User, Role::Model, Role::User],
            &[Role::User, Role::Model, Role::Model, Role::User],
        ];
        for shape in shapes {
            let turns: Vec<ChatTurn> = shape
                .iter()
                .map(|r| ChatTurn {
                    role: *r,
                    text: "t".into(),
                })
                .collect();
            assert!(session_seed(&turns).is_ok(), "shape {shape:?}");
        }
    }

    #[test]
    fn failure_classification() {
        let quota = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            "{\"error\": {\"message\": \"Resource has been exhausted\"}}",
        );
        assert_eq!(quota.kind(), ErrorKind::QuotaExceeded);

        let exhausted = classify_failure(StatusCode::BAD_REQUEST, "{\"status\": \"RESOURCE_EXHAUSTED\"}");
        assert_eq!(exhausted.kind(), ErrorKind::QuotaExceeded);

        let key = classify_failure(
            StatusCode::BAD_REQUEST,
            "API key not valid. Please pass a valid API key.",
        );
        assert_eq!(key.kind(), ErrorKind::AuthMissingOrInvalid);

        let missing = classify_failure(StatusCode::NOT_FOUND, "Requested entity was not found.");
        assert_eq!(missing.kind(), ErrorKind::AuthMissingOrInvalid);

        let other = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom 429 times");
        assert_eq!(other.kind(), ErrorKind::Unknown);
        assert!(other.message().contains("boom"));
        assert!(other.message().starts_with("500"));
    }

    #[tokio::test]
    async fn missing_key_is_auth_error() {
        let backend = ManagedBackend::new(ManagedConfig::new(""));
        let system = SystemPrompt::default();
        let err = backend
            .converse(ChatRequest {
                system: &system,
                turns: &[],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthMissingOrInvalid);
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port and model both contain "429"; only the error kind may decide.
        let backend = ManagedBackend::new(
            ManagedConfig::new("g-key")
                .base_url("http://127.0.0.1:1/v429")
                .model("m-429"),
        );
        let system = SystemPrompt::default();
        let err = backend
            .converse(ChatRequest {
                system: &system,
                turns: &[],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkUnreachable);
    }

    #[tokio::test]
    async fn opening_turn_is_single_filler_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .match_body(Matcher::Json(json!({
                "systemInstruction": {"parts": [{"text": "persona"}]},
                "contents": [{"role": "user", "parts": [{"text": OPENING_FILLER}]}]
            })))
            .with_status(200)
            .with_body(reply("Welcome, boss."))
            .create_async()
            .await;

        let system = SystemPrompt::new("persona");
        let text = backend(&server)
            .converse(ChatRequest {
                system: &system,
                turns: &[],
            })
            .await
            .unwrap();
        assert_eq!(text, "Welcome, boss.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn trailing_model_turn_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let system = SystemPrompt::default();
        let turns = vec![ChatTurn::model("hi"), ChatTurn::user("x"), ChatTurn::model("y")];
        let err = backend(&server)
            .converse(ChatRequest {
                system: &system,
                turns: &turns,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidHistoryState);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn quota_response_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_status(429)
            .with_body(
                json!({"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}})
                    .to_string(),
            )
            .create_async()
            .await;

        let system = SystemPrompt::default();
        let err = backend(&server)
            .converse(ChatRequest {
                system: &system,
                turns: &[ChatTurn::user("hello")],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(err.message().contains("Resource has been exhausted"));
    }

    #[tokio::test]
    async fn structured_call_sends_schema() {
        let mut server = mockito::Server::new_async().await;
        let schema = json!({"type": "OBJECT", "properties": {"a": {"type": "STRING"}}});
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": schema.clone()
                }
            })))
            .with_status(200)
            .with_body(reply("{\"a\": \"b\"}"))
            .create_async()
            .await;

        let value = backend(&server)
            .generate_structured(StructuredRequest {
                prompt: "p",
                schema: &schema,
                temperature: 0.2,
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"a": "b"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn structured_call_rejects_garbage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .with_status(200)
            .with_body(reply("[{\"id\": "))
            .create_async()
            .await;

        let schema = json!({"type": "ARRAY"});
        let err = backend(&server)
            .generate_structured(StructuredRequest {
                prompt: "p",
                schema: &schema,
                temperature: 0.5,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGenerationOutput);
    }
}
