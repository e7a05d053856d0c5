//! Per-provider configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::GenerationSettings;

/// Default per-call timeout for a provider, in milliseconds.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;

/// Backend family behind a provider slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    /// Local Ollama server (native `/api/chat`).
    Ollama,
    /// Any OpenAI-style `/chat/completions` endpoint.
    #[serde(rename = "openai_compatible")]
    #[strum(serialize = "openai_compatible")]
    OpenAiCompatible,
    /// Anthropic Messages API.
    Anthropic,
    /// In-process canned replies.
    Scripted,
}

impl ProviderKind {
    /// Env var conventionally holding this backend's API key.
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAiCompatible => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::Scripted => None,
        }
    }
}

/// Identity, endpoint and operational parameters of one logical provider slot.
///
/// Sessions reference providers by `id` only, so a slot can be reconfigured
/// or swapped without migrating session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub supports_tool_calling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Name of the env var holding the API key. The key itself is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}

impl ProviderConfig {
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint: endpoint.into(),
            model: model.into(),
            supports_tool_calling: false,
            max_tokens: None,
            temperature: None,
            timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            api_key_env: None,
        }
    }

    /// A scripted (in-process) slot.
    pub fn scripted(id: impl Into<String>, supports_tool_calling: bool) -> Self {
        Self::new(id, ProviderKind::Scripted, "", "scripted")
            .with_tool_calling(supports_tool_calling)
    }

    pub fn with_tool_calling(mut self, supported: bool) -> Self {
        self.supports_tool_calling = supported;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Env var the API key is read from.
    pub fn key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.kind.default_api_key_env())
    }

    /// Resolve the API key from the environment.
    pub fn api_key(&self) -> Option<String> {
        let var = self.key_env()?;
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }

    /// Default generation settings for calls against this slot.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: None,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_kinds_default_their_key_env() {
        let cfg = ProviderConfig::new("cloud", ProviderKind::Anthropic, "", "claude");
        assert_eq!(cfg.key_env(), Some("ANTHROPIC_API_KEY"));

        let custom = cfg.with_api_key_env("TEAM_CLAUDE_KEY");
        assert_eq!(custom.key_env(), Some("TEAM_CLAUDE_KEY"));

        let local = ProviderConfig::new("local", ProviderKind::Ollama, "", "llama3.1");
        assert!(local.key_env().is_none());
        assert!(local.api_key().is_none());
    }

    #[test]
    fn kind_uses_snake_case_names() {
        assert_eq!(ProviderKind::OpenAiCompatible.to_string(), "openai_compatible");
        assert_eq!(
            "openai_compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
    }

    #[test]
    fn generation_settings_carry_operational_parameters() {
        let cfg = ProviderConfig::scripted("s", true)
            .with_max_tokens(512)
            .with_temperature(0.2);
        let settings = cfg.generation_settings();
        assert_eq!(settings.max_tokens, Some(512));
        assert_eq!(settings.temperature, Some(0.2));
    }
}
