//! LLM backend abstraction.
//!
//! Two providers sit behind one trait: the managed provider, reached through
//! its `generateContent` API, and any OpenAI-compatible chat-completions
//! endpoint. [`Provider`] is the tagged union callers build from a
//! [`ProviderConfig`]; each variant owns its transport.

mod generic;
mod managed;

pub use generic::{GenericHttpBackend, GenericHttpConfig};
pub use managed::{
    DEFAULT_MANAGED_BASE_URL, DEFAULT_MANAGED_MODEL, ManagedBackend, ManagedConfig, SessionSeed,
    session_seed,
};

use crate::prompt::SystemPrompt;
use crate::types::ChatTurn;
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;

/// A conversational request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a SystemPrompt,
    /// Conversation to send, oldest first. Empty asks for the opening turn.
    pub turns: &'a [ChatTurn],
}

/// A single-turn request whose reply must be JSON.
#[derive(Debug, Clone, Copy)]
pub struct StructuredRequest<'a> {
    pub prompt: &'a str,
    /// Response schema for the managed provider. Its top-level `type`
    /// (`ARRAY` or `OBJECT`) also tells the generic backend what to expect.
    pub schema: &'a Value,
    /// Sampling temperature for the generic backend.
    pub temperature: f32,
}

impl StructuredRequest<'_> {
    pub(crate) fn expects_array(&self) -> bool {
        self.schema.get("type").and_then(Value::as_str) == Some("ARRAY")
    }
}

/// Trait for LLM backends.
///
/// `converse` returns the raw reply text; option extraction happens above this
/// layer. `generate_structured` returns the parsed JSON payload.
pub trait Backend: Send + Sync {
    fn converse(&self, request: ChatRequest<'_>) -> impl Future<Output = Result<String>> + Send;

    fn generate_structured(
        &self,
        request: StructuredRequest<'_>,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// Classify a failure to get any HTTP response at all by its kind.
pub(super) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_builder() {
        Error::EndpointOrModelNotFound(format!("invalid base URL: {e}"))
    } else if e.is_connect() || e.is_timeout() {
        Error::NetworkUnreachable(format!(
            "could not reach the endpoint; check the network connection and base URL ({e})"
        ))
    } else {
        Error::Unknown(e.to_string())
    }
}

/// Which backend a configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Managed,
    GenericHttp,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::GenericHttp => "generic-http",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" => Ok(Self::Managed),
            "generic-http" => Ok(Self::GenericHttp),
            other => Err(Error::UnsupportedProvider(format!(
                "'{other}' (expected 'managed' or 'generic-http')"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend configuration, one variant per provider kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Managed(ManagedConfig),
    GenericHttp(GenericHttpConfig),
}

impl ProviderConfig {
    /// Build a config from loosely typed settings.
    ///
    /// Empty `base_url` or `model` fall back to the managed provider's
    /// defaults; the generic backend keeps them empty and validates per call.
    pub fn from_parts(kind: &str, api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let config = match kind.parse::<ProviderKind>()? {
            ProviderKind::Managed => {
                let mut config = ManagedConfig::new(api_key);
                if !base_url.is_empty() {
                    config = config.base_url(base_url);
                }
                if !model.is_empty() {
                    config = config.model(model);
                }
                Self::Managed(config)
            }
            ProviderKind::GenericHttp => {
                Self::GenericHttp(GenericHttpConfig::new(api_key, base_url, model))
            }
        };
        Ok(config)
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Managed(_) => ProviderKind::Managed,
            Self::GenericHttp(_) => ProviderKind::GenericHttp,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Managed(c) => &c.model,
            Self::GenericHttp(c) => &c.model,
        }
    }
}

/// A ready-to-use backend for either provider kind.
#[derive(Debug, Clone)]
pub enum Provider {
    Managed(ManagedBackend),
    GenericHttp(GenericHttpBackend),
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        match config {
            ProviderConfig::Managed(c) => Self::Managed(ManagedBackend::new(c)),
            ProviderConfig::GenericHttp(c) => Self::GenericHttp(GenericHttpBackend::new(c)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Managed(_) => ProviderKind::Managed,
            Self::GenericHttp(_) => ProviderKind::GenericHttp,
        }
    }
}

impl From<ProviderConfig> for Provider {
    fn from(config: ProviderConfig) -> Self {
        Self::new(config)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Managed(b) => write!(f, "{b}"),
            Self::GenericHttp(b) => write!(f, "{b}"),
        }
    }
}

impl Backend for Provider {
    async fn converse(&self, request: ChatRequest<'_>) -> Result<String> {
        match self {
            Self::Managed(b) => b.converse(request).await,
            Self::GenericHttp(b) => b.converse(request).await,
        }
    }

    async fn generate_structured(&self, request: StructuredRequest<'_>) -> Result<Value> {
        match self {
            Self::Managed(b) => b.generate_structured(request).await,
            Self::GenericHttp(b) => b.generate_structured(request).await,
        }
    }
}
