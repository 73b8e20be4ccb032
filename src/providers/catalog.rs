//! Provider capability table.
//!
//! Every vendor difference that matters for request construction (base URL,
//! credential placement, endpoint path, wire format) is looked up here instead
//! of being branched on at call sites.

use crate::config::Config;
use crate::core::model::ModelDescriptor;
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    OpenRouter,
    Groq,
    Mistral,
    XAi,
    Moonshot,
    Zhipu,
    SiliconFlow,
    DashScope,
    Together,
    Custom,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// All kinds with a built-in table entry.
    pub fn builtin() -> impl Iterator<Item = Self> {
        Self::iter().filter(|kind| *kind != Self::Custom)
    }
}

/// How the credential travels with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    #[default]
    BearerHeader,
    /// `x-api-key: <key>`
    ApiKeyHeader,
    /// `?key=<key>` appended to the URL
    UrlQueryKey,
}

/// Request/response shape spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    ChatCompletions,
    Responses,
    AnthropicMessages,
    GeminiGenerate,
}

impl WireFormat {
    /// Whether the endpoint is driven as an SSE stream. Claude and Gemini are
    /// adapted as one-shot completions.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::ChatCompletions | Self::Responses)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub auth_style: AuthStyle,
    pub endpoint_path: &'static str,
    /// Environment variables consulted when the config holds no key.
    pub env_keys: &'static [&'static str],
    pub extra_headers: &'static [(&'static str, &'static str)],
}

const fn openai_compatible(
    kind: ProviderKind,
    display_name: &'static str,
    base_url: &'static str,
    endpoint_path: &'static str,
    env_keys: &'static [&'static str],
) -> ProviderSpec {
    ProviderSpec {
        kind,
        display_name,
        base_url,
        auth_style: AuthStyle::BearerHeader,
        endpoint_path,
        env_keys,
        extra_headers: &[],
    }
}

static PROVIDER_TABLE: [ProviderSpec; 13] = [
    openai_compatible(
        ProviderKind::OpenAi,
        "OpenAI",
        "https://api.openai.com",
        "/v1/chat/completions",
        &["OPENAI_API_KEY"],
    ),
    ProviderSpec {
        kind: ProviderKind::Anthropic,
        display_name: "Anthropic",
        base_url: "https://api.anthropic.com",
        auth_style: AuthStyle::ApiKeyHeader,
        endpoint_path: "/v1/messages",
        env_keys: &["ANTHROPIC_API_KEY"],
        extra_headers: &[("anthropic-version", "2023-06-01")],
    },
    ProviderSpec {
        kind: ProviderKind::Gemini,
        display_name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com",
        auth_style: AuthStyle::UrlQueryKey,
        endpoint_path: "/v1beta/models/{model}:generateContent",
        env_keys: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        extra_headers: &[],
    },
    openai_compatible(
        ProviderKind::DeepSeek,
        "DeepSeek",
        "https://api.deepseek.com",
        "/chat/completions",
        &["DEEPSEEK_API_KEY"],
    ),
    ProviderSpec {
        kind: ProviderKind::OpenRouter,
        display_name: "OpenRouter",
        base_url: "https://openrouter.ai/api",
        auth_style: AuthStyle::BearerHeader,
        endpoint_path: "/v1/chat/completions",
        env_keys: &["OPENROUTER_API_KEY"],
        extra_headers: &[("X-Title", "relaychat")],
    },
    openai_compatible(
        ProviderKind::Groq,
        "Groq",
        "https://api.groq.com/openai",
        "/v1/chat/completions",
        &["GROQ_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::Mistral,
        "Mistral",
        "https://api.mistral.ai",
        "/v1/chat/completions",
        &["MISTRAL_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::XAi,
        "xAI",
        "https://api.x.ai",
        "/v1/chat/completions",
        &["XAI_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::Moonshot,
        "Moonshot",
        "https://api.moonshot.cn",
        "/v1/chat/completions",
        &["MOONSHOT_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::Zhipu,
        "Zhipu GLM",
        "https://open.bigmodel.cn/api/paas",
        "/v4/chat/completions",
        &["ZHIPU_API_KEY", "GLM_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::SiliconFlow,
        "SiliconFlow",
        "https://api.siliconflow.cn",
        "/v1/chat/completions",
        &["SILICONFLOW_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::DashScope,
        "DashScope (Qwen)",
        "https://dashscope.aliyuncs.com/compatible-mode",
        "/v1/chat/completions",
        &["DASHSCOPE_API_KEY"],
    ),
    openai_compatible(
        ProviderKind::Together,
        "Together AI",
        "https://api.together.xyz",
        "/v1/chat/completions",
        &["TOGETHER_API_KEY"],
    ),
];

/// Table entry for a built-in provider. `None` for [`ProviderKind::Custom`].
pub fn provider_spec(kind: ProviderKind) -> Option<&'static ProviderSpec> {
    PROVIDER_TABLE.iter().find(|spec| spec.kind == kind)
}

pub fn provider_table() -> &'static [ProviderSpec] {
    &PROVIDER_TABLE
}

/// Transport target for one provider, built-in or user supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub name: String,
    pub base_url: String,
    pub auth_style: AuthStyle,
    pub endpoint_path: String,
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn from_spec(spec: &ProviderSpec) -> Self {
        Self {
            kind: spec.kind,
            name: spec.display_name.to_string(),
            base_url: spec.base_url.to_string(),
            auth_style: spec.auth_style,
            endpoint_path: spec.endpoint_path.to_string(),
            extra_headers: spec
                .extra_headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self.kind {
            ProviderKind::Anthropic => WireFormat::AnthropicMessages,
            ProviderKind::Gemini => WireFormat::GeminiGenerate,
            _ if self.endpoint_path.contains("responses")
                || (self.endpoint_path.is_empty() && self.base_url.contains("responses")) =>
            {
                WireFormat::Responses
            }
            _ => WireFormat::ChatCompletions,
        }
    }

    /// Full endpoint URL for `model`, without credentials.
    pub fn endpoint_url(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint_path.replace("{model}", model);
        let path = path.trim_start_matches('/');

        // A base URL that already names the endpoint is used as-is.
        if path.is_empty() || base.ends_with(path) {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

/// A provider plus the credential it will be called with.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub config: ProviderConfig,
    pub api_key: String,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("config", &self.config)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn validate_base_url(name: &str, base_url: &str) -> Result<()> {
    url::Url::parse(base_url).map_err(|error| {
        ChatError::Configuration(format!("{name} base URL `{base_url}` is invalid: {error}"))
    })?;
    Ok(())
}

/// Resolve transport target and credential for `model` from a settings
/// snapshot. Fails before any network activity when nothing usable is found.
pub fn resolve_provider(config: &Config, model: &ModelDescriptor) -> Result<ResolvedProvider> {
    if let Some(custom_id) = model.custom_provider_id.as_deref() {
        return resolve_custom_provider(config, custom_id);
    }
    if model.provider == ProviderKind::Custom {
        return Err(ChatError::Configuration(format!(
            "model `{}` is bound to a custom provider but names none",
            model.id
        )));
    }

    let spec = provider_spec(model.provider).ok_or_else(|| {
        ChatError::Configuration(format!("no provider entry for {}", model.provider))
    })?;
    let settings = config.providers.get(model.provider.as_str());

    let mut provider = ProviderConfig::from_spec(spec);
    if let Some(base_url) = non_empty(settings.and_then(|s| s.base_url.as_deref())) {
        provider.base_url = base_url;
    }
    if let Some(endpoint_path) = non_empty(settings.and_then(|s| s.endpoint_path.as_deref())) {
        provider.endpoint_path = endpoint_path;
    }
    validate_base_url(&provider.name, &provider.base_url)?;

    let api_key = non_empty(settings.and_then(|s| s.api_key.as_deref()))
        .or_else(|| {
            (config.default_provider == model.provider)
                .then(|| non_empty(config.api_key.as_deref()))
                .flatten()
        })
        .ok_or_else(|| {
            ChatError::Configuration(format!(
                "no API key configured for {}; set it under [providers.{}] or via {}",
                spec.display_name,
                model.provider,
                spec.env_keys.first().copied().unwrap_or("the config file"),
            ))
        })?;

    Ok(ResolvedProvider {
        config: provider,
        api_key,
    })
}

fn resolve_custom_provider(config: &Config, custom_id: &str) -> Result<ResolvedProvider> {
    let custom = config
        .custom_providers
        .iter()
        .find(|provider| provider.id == custom_id)
        .ok_or_else(|| {
            ChatError::Configuration(format!("custom provider `{custom_id}` not found"))
        })?;

    validate_base_url(&custom.name, &custom.base_url)?;

    let api_key = non_empty(custom.api_key.as_deref()).ok_or_else(|| {
        ChatError::Configuration(format!(
            "custom provider `{}` has no API key",
            custom.name
        ))
    })?;

    Ok(ResolvedProvider {
        config: ProviderConfig {
            kind: ProviderKind::Custom,
            name: custom.name.clone(),
            base_url: custom.base_url.clone(),
            auth_style: custom.auth_style,
            endpoint_path: custom.endpoint_path.clone(),
            extra_headers: Vec::new(),
        },
        api_key,
    })
}
