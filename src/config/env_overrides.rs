use super::{Config, ProviderSettings};
use crate::providers::catalog::provider_table;

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(non_empty_var);
    }

    /// Apply overrides from an arbitrary variable source.
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("RELAYCHAT_API_KEY") {
            self.api_key = Some(key);
        }

        if let Some(provider) = lookup("RELAYCHAT_PROVIDER") {
            match provider.parse() {
                Ok(kind) => self.default_provider = kind,
                Err(_) => tracing::warn!(provider = %provider, "ignoring unknown RELAYCHAT_PROVIDER"),
            }
        }

        if let Some(model) = lookup("RELAYCHAT_MODEL") {
            self.default_model = model;
        }

        if let Some(temp) = lookup("RELAYCHAT_TEMPERATURE").and_then(|t| t.parse::<f64>().ok())
            && (0.0..=2.0).contains(&temp)
        {
            self.generation.temperature = temp;
        }

        // Vendor key variables only fill gaps; the config file wins.
        for spec in provider_table() {
            let settings = self
                .providers
                .entry(spec.kind.as_str().to_string())
                .or_insert_with(ProviderSettings::default);
            if settings.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
                continue;
            }
            if let Some(key) = spec.env_keys.iter().find_map(|name| lookup(name)) {
                settings.api_key = Some(key);
            }
        }
        self.providers.retain(|_, settings| {
            settings.api_key.is_some() || settings.base_url.is_some() || settings.endpoint_path.is_some()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::catalog::ProviderKind;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)], config: &mut Config) {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config.apply_overrides_from(|name| vars.get(name).cloned());
    }

    #[test]
    fn vendor_key_fills_missing_provider_key() {
        let mut config = Config::default();
        apply(&[("ANTHROPIC_API_KEY", "ant-env")], &mut config);
        assert_eq!(
            config.providers["anthropic"].api_key.as_deref(),
            Some("ant-env")
        );
        assert!(!config.providers.contains_key("groq"));
    }

    #[test]
    fn config_key_wins_over_environment() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".into(),
            ProviderSettings {
                api_key: Some("from-file".into()),
                ..ProviderSettings::default()
            },
        );
        apply(&[("OPENAI_API_KEY", "from-env")], &mut config);
        assert_eq!(
            config.providers["openai"].api_key.as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn secondary_env_name_is_consulted() {
        let mut config = Config::default();
        apply(&[("GOOGLE_API_KEY", "g-key")], &mut config);
        assert_eq!(config.providers["gemini"].api_key.as_deref(), Some("g-key"));
    }

    #[test]
    fn provider_model_and_temperature_overrides() {
        let mut config = Config::default();
        apply(
            &[
                ("RELAYCHAT_PROVIDER", "groq"),
                ("RELAYCHAT_MODEL", "llama-3.3-70b-versatile"),
                ("RELAYCHAT_TEMPERATURE", "0.2"),
            ],
            &mut config,
        );
        assert_eq!(config.default_provider, ProviderKind::Groq);
        assert_eq!(config.default_model, "llama-3.3-70b-versatile");
        assert!((config.generation.temperature - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut config = Config::default();
        apply(
            &[("RELAYCHAT_PROVIDER", "nonesuch"), ("RELAYCHAT_TEMPERATURE", "9")],
            &mut config,
        );
        assert_eq!(config.default_provider, ProviderKind::OpenAi);
        assert!((config.generation.temperature - 0.7).abs() < f64::EPSILON);
    }
}
