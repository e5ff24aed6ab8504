//! Configuration loading from threadball.toml.

use conversation::ProviderConfig;
use serde::Deserialize;
use std::path::Path;

pub const API_KEY_VAR: &str = "THREADBALL_API_KEY";
pub const MODEL_VAR: &str = "THREADBALL_MODEL";
/// Accepted for the managed provider only.
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSection,
}

/// The `[provider]` table.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// "managed" or "generic-http".
    pub kind: String,
    pub api_key: String,
    /// Required for generic-http; optional override for managed.
    pub base_url: String,
    pub model: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: "managed".to_string(),
            api_key: String::new(),
            base_url: String::new(),
            model: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides read through `var`.
    ///
    /// `THREADBALL_API_KEY` wins over the file. `GEMINI_API_KEY` only fills an
    /// empty key, and only for the managed provider.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let provider = &mut self.provider;
        if let Some(key) = var(API_KEY_VAR).filter(|k| !k.is_empty()) {
            provider.api_key = key;
        } else if provider.api_key.is_empty() && provider.kind.trim().eq_ignore_ascii_case("managed") {
            if let Some(key) = var(GEMINI_KEY_VAR).filter(|k| !k.is_empty()) {
                provider.api_key = key;
            }
        }
        if let Some(model) = var(MODEL_VAR).filter(|m| !m.is_empty()) {
            provider.model = model;
        }
        self
    }

    /// Apply overrides from the process environment.
    pub fn with_process_env(self) -> Self {
        self.with_env(|name| std::env::var(name).ok())
    }

    /// Build the provider configuration.
    ///
    /// Fails with `UnsupportedProvider` for an unknown kind. A missing key is
    /// not an error here; the backend reports it on first use.
    pub fn provider(&self) -> conversation::Result<ProviderConfig> {
        let p = &self.provider;
        ProviderConfig::from_parts(&p.kind, &p.api_key, &p.base_url, &p.model)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
