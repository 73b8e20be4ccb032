use crate::providers::catalog::ProviderKind;
use serde::{Deserialize, Serialize};

/// Id fragments of models that accept image input.
const VISION_PATTERNS: [&str; 14] = [
    "gpt-4o",
    "gpt-4.1",
    "gpt-5",
    "o3",
    "o4",
    "vision",
    "claude-3",
    "claude-sonnet-4",
    "claude-opus-4",
    "gemini",
    "pixtral",
    "llava",
    "-vl",
    "glm-4v",
];

/// Id fragments of models known to emit reasoning text.
const REASONING_PATTERNS: [&str; 10] = [
    "o1",
    "o3",
    "o4",
    "gpt-5",
    "-r1",
    "reasoner",
    "thinking",
    "qwq",
    "grok-3-mini",
    "magistral",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub provider: ProviderKind,
    pub supports_vision: bool,
    pub supports_reasoning: bool,
    pub custom_provider_id: Option<String>,
}

impl ModelDescriptor {
    /// Describe `id` on `provider`, inferring capability flags from the id.
    pub fn infer(id: &str, provider: ProviderKind) -> Self {
        let lowered = id.to_ascii_lowercase();
        Self {
            id: id.to_string(),
            display_name: id.rsplit('/').next().unwrap_or(id).to_string(),
            provider,
            supports_vision: VISION_PATTERNS.iter().any(|p| lowered.contains(p)),
            supports_reasoning: REASONING_PATTERNS.iter().any(|p| lowered.contains(p)),
            custom_provider_id: None,
        }
    }

    #[must_use]
    pub fn with_custom_provider(mut self, custom_provider_id: impl Into<String>) -> Self {
        self.provider = ProviderKind::Custom;
        self.custom_provider_id = Some(custom_provider_id.into());
        self
    }

    #[must_use]
    pub fn with_vision(mut self, supports_vision: bool) -> Self {
        self.supports_vision = supports_vision;
        self
    }

    /// One-way upgrade applied once a model has been seen reasoning.
    #[must_use]
    pub fn with_reasoning_detected(mut self, detected: bool) -> Self {
        self.supports_reasoning |= detected;
        self
    }

    /// Key used for per-model persisted capability state.
    pub fn capability_key(&self) -> String {
        match &self.custom_provider_id {
            Some(custom) => format!("custom:{custom}/{}", self.id),
            None => format!("{}/{}", self.provider, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_vision_from_id() {
        assert!(ModelDescriptor::infer("gpt-4o-mini", ProviderKind::OpenAi).supports_vision);
        assert!(ModelDescriptor::infer("gemini-2.0-flash", ProviderKind::Gemini).supports_vision);
        assert!(!ModelDescriptor::infer("deepseek-chat", ProviderKind::DeepSeek).supports_vision);
    }

    #[test]
    fn infers_reasoning_from_id() {
        assert!(
            ModelDescriptor::infer("deepseek-reasoner", ProviderKind::DeepSeek).supports_reasoning
        );
        assert!(
            ModelDescriptor::infer("deepseek/deepseek-r1", ProviderKind::OpenRouter)
                .supports_reasoning
        );
        assert!(!ModelDescriptor::infer("gpt-4o", ProviderKind::OpenAi).supports_reasoning);
    }

    #[test]
    fn display_name_drops_vendor_prefix() {
        let model = ModelDescriptor::infer("anthropic/claude-sonnet-4", ProviderKind::OpenRouter);
        assert_eq!(model.display_name, "claude-sonnet-4");
    }

    #[test]
    fn detected_reasoning_never_downgrades() {
        let model = ModelDescriptor::infer("o3-mini", ProviderKind::OpenAi)
            .with_reasoning_detected(false);
        assert!(model.supports_reasoning);
        let plain = ModelDescriptor::infer("gpt-4o", ProviderKind::OpenAi)
            .with_reasoning_detected(true);
        assert!(plain.supports_reasoning);
    }

    #[test]
    fn capability_key_distinguishes_custom_providers() {
        let builtin = ModelDescriptor::infer("m", ProviderKind::Groq);
        let custom = ModelDescriptor::infer("m", ProviderKind::Custom).with_custom_provider("lab");
        assert_eq!(builtin.capability_key(), "groq/m");
        assert_eq!(custom.capability_key(), "custom:lab/m");
    }
}
