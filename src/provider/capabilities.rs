//! Provider capabilities descriptor.

use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};

/// Describes what a provider can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    /// Structured (native) tool calling.
    pub supports_tools: bool,
    pub supports_json_mode: bool,
    pub context_length: usize,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: false,
            supports_json_mode: false,
            context_length: 4096,
        }
    }
}

impl ModelCapabilities {
    /// Capabilities as declared by a provider slot's configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let (supports_json_mode, context_length) = match config.kind {
            ProviderKind::Ollama => (true, 8_192),
            ProviderKind::OpenAiCompatible => (true, 128_000),
            ProviderKind::Anthropic => (false, 200_000),
            ProviderKind::Scripted => (true, 4_096),
        };
        Self {
            supports_tools: config.supports_tool_calling,
            supports_json_mode,
            context_length,
        }
    }
}
