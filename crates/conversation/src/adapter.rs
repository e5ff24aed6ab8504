//! The provider-agnostic conversation adapter.

use crate::backend::{Backend, ChatRequest, Provider, ProviderConfig, StructuredRequest};
use crate::options::extract_options;
use crate::prompt::{SystemPrompt, outline_prompt, summary_prompt};
use crate::types::{ChatTurn, ModelReply, NoteCard, NoteSummary, OutlineSection};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const OUTLINE_TEMPERATURE: f32 = 0.5;
const SUMMARY_TEMPERATURE: f32 = 0.2;

fn outline_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": {"type": "STRING"},
                "title": {"type": "STRING"},
                "content": {"type": "STRING"}
            },
            "required": ["id", "title", "content"]
        }
    })
}

fn summary_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "questionSummary": {"type": "STRING"},
            "answerSummary": {"type": "STRING"}
        },
        "required": ["questionSummary", "answerSummary"]
    })
}

/// Stateless front door over a [`Backend`].
///
/// Holds the backend and the system prompt; history is passed in full on
/// every call. Calls are independent and may run concurrently.
#[derive(Debug, Clone)]
pub struct Conversation<B = Provider> {
    backend: B,
    system: SystemPrompt,
}

impl Conversation<Provider> {
    /// Build a conversation over the provider `config` selects.
    pub fn from_config(config: ProviderConfig, system: SystemPrompt) -> Self {
        Self::new(Provider::new(config), system)
    }
}

impl<B: Backend> Conversation<B> {
    pub fn new(backend: B, system: SystemPrompt) -> Self {
        Self { backend, system }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn system(&self) -> &SystemPrompt {
        &self.system
    }

    /// Ask for the session's opening turn.
    pub async fn open(&self) -> Result<ModelReply> {
        self.send(&[], "").await
    }

    /// Send `message` after `history` and return the normalized reply.
    ///
    /// A non-empty `message` is appended to `history` as a user turn. An empty
    /// `message` sends `history` as is, so callers that already pushed the new
    /// user turn, or that want the opening turn, pass `""`.
    pub async fn send(&self, history: &[ChatTurn], message: &str) -> Result<ModelReply> {
        let mut turns = history.to_vec();
        if !message.is_empty() {
            turns.push(ChatTurn::user(message));
        }

        let raw = self
            .backend
            .converse(ChatRequest {
                system: &self.system,
                turns: &turns,
            })
            .await
            .inspect_err(|e| tracing::warn!(kind = ?e.kind(), "conversation call failed: {e}"))?;

        let extracted = extract_options(&raw);
        Ok(ModelReply {
            text: extracted.cleaned_text,
            options: extracted.options,
        })
    }

    /// Fill the template sections from the note cards.
    pub async fn generate_outline(
        &self,
        template: &[OutlineSection],
        notes: &[NoteCard],
    ) -> Result<Vec<OutlineSection>> {
        let prompt = outline_prompt(template, notes);
        let schema = outline_schema();
        tracing::debug!(sections = template.len(), notes = notes.len(), "generating outline");
        self.structured(StructuredRequest {
            prompt: &prompt,
            schema: &schema,
            temperature: OUTLINE_TEMPERATURE,
        })
        .await
    }

    /// Summarize one question/answer pair into two short strings.
    pub async fn summarize(&self, question: &str, answer: &str) -> Result<NoteSummary> {
        let prompt = summary_prompt(question, answer);
        let schema = summary_schema();
        self.structured(StructuredRequest {
            prompt: &prompt,
            schema: &schema,
            temperature: SUMMARY_TEMPERATURE,
        })
        .await
    }

    async fn structured<T: DeserializeOwned>(&self, request: StructuredRequest<'_>) -> Result<T> {
        let value = self
            .backend
            .generate_structured(request)
            .await
            .inspect_err(|e| tracing::warn!(kind = ?e.kind(), "generation call failed: {e}"))?;
        serde_json::from_value(value).map_err(|e| {
            Error::MalformedGenerationOutput(format!("reply has the wrong shape: {e}"))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::backend::{GenericHttpConfig, ManagedConfig};
    use mockito::Matcher;
    use std::sync::Mutex;

    /// Records what it was asked and answers from canned values.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        pub reply: String,
        pub structured: Option<Value>,
        pub seen: Mutex<Vec<Vec<ChatTurn>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Self::default()
            }
        }

        pub(crate) fn structured(value: Value) -> Self {
            Self {
                structured: Some(value),
                ..Self::default()
            }
        }
    }

    impl Backend for ScriptedBackend {
        async fn converse(&self, request: ChatRequest<'_>) -> Result<String> {
            self.seen.lock().unwrap().push(request.turns.to_vec());
            Ok(self.reply.clone())
        }

        async fn generate_structured(&self, request: StructuredRequest<'_>) -> Result<Value> {
            self.prompts.lock().unwrap().push(request.prompt.to_string());
            self.structured
                .clone()
                .ok_or_else(|| Error::Unknown("no structured reply scripted".into()))
        }
    }

    #[tokio::test]
    async fn open_sends_no_turns() {
        let conv = Conversation::new(ScriptedBackend::replying("Welcome"), SystemPrompt::default());
        let reply = conv.open().await.unwrap();
        assert_eq!(reply.text, "Welcome");
        assert_eq!(reply.options, None);
        assert_eq!(conv.backend().seen.lock().unwrap()[0], Vec::<ChatTurn>::new());
    }

    #[tokio::test]
    async fn non_empty_message_is_appended() {
        let conv = Conversation::new(ScriptedBackend::replying("ok"), SystemPrompt::default());
        let history = vec![ChatTurn::model("hi")];
        conv.send(&history, "hello").await.unwrap();
        let seen = conv.backend().seen.lock().unwrap();
        assert_eq!(seen[0], vec![ChatTurn::model("hi"), ChatTurn::user("hello")]);
    }

    #[tokio::test]
    async fn empty_message_sends_history_as_is() {
        let conv = Conversation::new(ScriptedBackend::replying("ok"), SystemPrompt::default());
        let history = vec![ChatTurn::model("hi"), ChatTurn::user("hello")];
        conv.send(&history, "").await.unwrap();
        assert_eq!(conv.backend().seen.lock().unwrap()[0], history);
    }

    #[tokio::test]
    async fn reply_options_are_extracted() {
        let raw = "Pick one.\n~~~json\n{\"suggestedOptions\": [\"blog\", \"talk\"]}\n~~~";
        let conv = Conversation::new(ScriptedBackend::replying(raw), SystemPrompt::default());
        let reply = conv.send(&[], "x").await.unwrap();
        assert_eq!(reply.text, "Pick one.");
        assert_eq!(reply.options, Some(vec!["blog".to_string(), "talk".to_string()]));
    }

    #[tokio::test]
    async fn outline_shape_is_validated() {
        let good = json!([{"id": "s1", "title": "Hook", "content": "Start here"}]);
        let conv = Conversation::new(ScriptedBackend::structured(good), SystemPrompt::default());
        let outline = conv
            .generate_outline(&[OutlineSection::new("s1", "Hook", "...")], &[])
            .await
            .unwrap();
        assert_eq!(outline, vec![OutlineSection::new("s1", "Hook", "Start here")]);

        let bad = json!({"sections": "not a list"});
        let conv = Conversation::new(ScriptedBackend::structured(bad), SystemPrompt::default());
        let err = conv.generate_outline(&[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGenerationOutput);
    }

    #[tokio::test]
    async fn summary_missing_field_is_malformed() {
        let conv = Conversation::new(
            ScriptedBackend::structured(json!({"questionSummary": "purpose"})),
            SystemPrompt::default(),
        );
        let err = conv.summarize("why?", "because").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGenerationOutput);
        let prompts = conv.backend().prompts.lock().unwrap();
        assert!(prompts[0].contains("why?"));
        assert!(prompts[0].contains("because"));
    }

    #[tokio::test]
    async fn managed_greeting_then_message_sends_only_live_turn() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/m:generateContent")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .with_status(200)
            .with_body(
                json!({"candidates": [{"content": {"parts": [{"text": "What is the purpose?"}]}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let config = ProviderConfig::Managed(ManagedConfig::new("k").base_url(server.url()).model("m"));
        let conv = Conversation::from_config(config, SystemPrompt::default());
        let reply = conv.send(&[ChatTurn::model("hi")], "hello").await.unwrap();

        assert_eq!(reply.text, "What is the purpose?");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generic_outline_unwraps_sections_field() {
        let mut server = mockito::Server::new_async().await;
        let content = json!({"sections": [
            {"id": "pas-1", "title": "Problem", "content": "Readers drown in tabs"},
            {"id": "pas-2", "title": "Agitate", "content": "It costs hours"}
        ]})
        .to_string();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": content}}]}).to_string())
            .create_async()
            .await;

        let config = ProviderConfig::GenericHttp(GenericHttpConfig::new("k", server.url(), "m"));
        let conv = Conversation::from_config(config, SystemPrompt::default());
        let template = [
            OutlineSection::new("pas-1", "Problem", "..."),
            OutlineSection::new("pas-2", "Agitate", "..."),
        ];
        let outline = conv.generate_outline(&template, &[]).await.unwrap();

        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].id, "pas-1");
        assert_eq!(outline[1].content, "It costs hours");
    }
}
