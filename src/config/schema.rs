use crate::providers::catalog::{AuthStyle, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Generic key used for `default_provider` when it has no key of its own.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider")]
    pub default_provider: ProviderKind,
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub generation: GenerationConfig,

    /// Keyed by provider kind (`openai`, `anthropic`, ...).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,

    #[serde(default)]
    pub custom_providers: Vec<CustomProviderConfig>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ocr: Option<OcrConfig>,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            generation: GenerationConfig::default(),
            providers: BTreeMap::new(),
            custom_providers: Vec::new(),
            search: SearchConfig::default(),
            ocr: None,
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Number of prior non-system turns sent with each request.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_history_turns() -> usize {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: None,
            system_prompt: None,
            max_tokens: default_max_tokens(),
            history_turns: default_history_turns(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the built-in base URL (proxies, regional endpoints).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Overrides the built-in endpoint path, e.g. `/v1/responses`.
    #[serde(default)]
    pub endpoint_path: Option<String>,
}

/// A user-configured OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_custom_endpoint_path")]
    pub endpoint_path: String,
    #[serde(default)]
    pub auth_style: AuthStyle,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_custom_endpoint_path() -> String {
    "/v1/chat/completions".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,
    /// SearXNG-compatible JSON search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
}

fn default_search_endpoint() -> String {
    "http://localhost:8888/search".into()
}

fn default_search_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_search_endpoint(),
            max_results: default_search_max_results(),
        }
    }
}

/// Auxiliary vision model used to describe images for text-only models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub custom_provider_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "~/.relaychat/relaychat.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn resolved_database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database_path).into_owned())
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.generation.temperature),
            "generation.temperature must be within 0.0..=2.0, got {}",
            self.generation.temperature
        );
        if let Some(top_p) = self.generation.top_p {
            anyhow::ensure!(
                (0.0..=1.0).contains(&top_p),
                "generation.top_p must be within 0.0..=1.0, got {top_p}"
            );
        }
        anyhow::ensure!(
            self.generation.max_tokens > 0,
            "generation.max_tokens must be positive"
        );

        for key in self.providers.keys() {
            anyhow::ensure!(
                key.parse::<ProviderKind>()
                    .is_ok_and(|kind| kind != ProviderKind::Custom),
                "unknown provider section [providers.{key}]"
            );
        }

        let mut seen = std::collections::HashSet::new();
        for custom in &self.custom_providers {
            anyhow::ensure!(!custom.id.trim().is_empty(), "custom provider id is empty");
            anyhow::ensure!(
                seen.insert(custom.id.as_str()),
                "duplicate custom provider id `{}`",
                custom.id
            );
        }
        Ok(())
    }
}
