//! Environment variable substitution and credential resolution.

use super::types::{Config, ProviderEntry};
use crate::constants::{
    MODEL_ENV, OPENAI_DEFAULT_BASE_URL, OPENROUTER_DEFAULT_BASE_URL, PROVIDER_ENV,
    TEXTGEN_DEFAULT_BASE_URL,
};
use crate::error::ConfigError;
use crate::provider::ProviderKind;

/// Everything needed to reach one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        self.model = Self::resolve_str(&self.model);
        if let Some(ref mut sp) = self.system_prompt {
            *sp = Self::resolve_str(sp);
        }
        if let Some(ref mut dp) = self.default_provider {
            *dp = Self::resolve_str(dp);
        }
        Self::resolve_provider_entry(&mut self.provider.openai);
        Self::resolve_provider_entry(&mut self.provider.openrouter);
        Self::resolve_provider_entry(&mut self.provider.textgen);
    }

    /// Resolves `{env:VAR}` patterns in a single provider entry's `api_key` and `base_url`.
    fn resolve_provider_entry(entry: &mut Option<ProviderEntry>) {
        if let Some(ref mut e) = entry {
            if let Some(ref mut key) = e.api_key {
                *key = Self::resolve_str(key);
            }
            if let Some(ref mut url) = e.base_url {
                *url = Self::resolve_str(url);
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    fn resolve_str(s: &str) -> String {
        let mut result = s.to_string();
        while let Some(start) = result.find("{env:") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 5..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!(
                    "{}{}{}",
                    &result[..start],
                    value,
                    &result[start + end + 1..]
                );
            } else {
                break;
            }
        }
        result
    }

    /// Folds environment settings into the config snapshot.
    ///
    /// `{PROVIDER}_API_KEY` and `TEXTGEN_BASE_URL` win over file values,
    /// `AI_PROVIDER` selects the primary provider and `AI_MODEL` the default model.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for kind in ProviderKind::ALL {
            let env_key = format!("{}_API_KEY", kind.as_str().to_uppercase());
            if let Some(key) = lookup(&env_key) {
                self.entry_mut(kind).get_or_insert_with(ProviderEntry::default).api_key = Some(key);
            }
        }
        if let Some(url) = lookup("TEXTGEN_BASE_URL") {
            self.provider
                .textgen
                .get_or_insert_with(ProviderEntry::default)
                .base_url = Some(url);
        }
        if let Some(provider) = lookup(PROVIDER_ENV) {
            self.default_provider = Some(provider);
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = model;
        }
    }

    pub fn entry(&self, kind: ProviderKind) -> Option<&ProviderEntry> {
        match kind {
            ProviderKind::OpenAI => self.provider.openai.as_ref(),
            ProviderKind::OpenRouter => self.provider.openrouter.as_ref(),
            ProviderKind::TextGen => self.provider.textgen.as_ref(),
        }
    }

    fn entry_mut(&mut self, kind: ProviderKind) -> &mut Option<ProviderEntry> {
        match kind {
            ProviderKind::OpenAI => &mut self.provider.openai,
            ProviderKind::OpenRouter => &mut self.provider.openrouter,
            ProviderKind::TextGen => &mut self.provider.textgen,
        }
    }

    /// Credentials for a provider, or `None` when it cannot be reached.
    ///
    /// OpenAI and OpenRouter need a non-empty API key. The text-generation
    /// backend is usable with either an API key or an explicit base URL.
    pub fn credentials_for(&self, kind: ProviderKind) -> Option<Credentials> {
        let entry = self.entry(kind)?;
        let api_key = non_empty(entry.api_key.as_deref());
        let base_url = non_empty(entry.base_url.as_deref());

        match kind {
            ProviderKind::OpenAI => Some(Credentials {
                api_key: Some(api_key?),
                base_url: base_url.unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            }),
            ProviderKind::OpenRouter => Some(Credentials {
                api_key: Some(api_key?),
                base_url: base_url.unwrap_or_else(|| OPENROUTER_DEFAULT_BASE_URL.to_string()),
            }),
            ProviderKind::TextGen => {
                if api_key.is_none() && base_url.is_none() {
                    return None;
                }
                Some(Credentials {
                    api_key,
                    base_url: base_url.unwrap_or_else(|| TEXTGEN_DEFAULT_BASE_URL.to_string()),
                })
            }
        }
    }

    /// Provider order with the default provider moved to the front.
    ///
    /// Unknown names fail; duplicates are dropped.
    pub fn provider_order(&self) -> Result<Vec<ProviderKind>, ConfigError> {
        let mut order = Vec::new();
        let primary = self.default_provider.as_deref().filter(|p| !p.is_empty());
        for name in primary.into_iter().chain(self.providers.iter().map(String::as_str)) {
            let kind: ProviderKind = name.parse()?;
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        Ok(order)
    }

    /// Providers in order that have usable credentials.
    pub fn configured_providers(&self) -> Result<Vec<(ProviderKind, Credentials)>, ConfigError> {
        Ok(self
            .provider_order()?
            .into_iter()
            .filter_map(|kind| self.credentials_for(kind).map(|c| (kind, c)))
            .collect())
    }

    /// Copy of the config with API keys masked, for display.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        for kind in ProviderKind::ALL {
            if let Some(entry) = copy.entry_mut(kind) {
                if let Some(key) = entry.api_key.as_mut().filter(|k| !k.is_empty()) {
                    *key = "********".to_string();
                }
            }
        }
        copy
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_credentials_means_no_providers() {
        let config = Config::default();
        assert!(config.configured_providers().unwrap().is_empty());
    }

    #[test]
    fn test_env_keys_enable_providers() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("OPENAI_API_KEY", "sk-1"), ("OPENROUTER_API_KEY", "")]));

        let providers = config.configured_providers().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, ProviderKind::OpenAI);
        assert_eq!(providers[0].1.api_key.as_deref(), Some("sk-1"));
        assert_eq!(providers[0].1.base_url, OPENAI_DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_key_overrides_file_key() {
        let mut config = Config::from_toml_str(
            r#"
[provider.openrouter]
api_key = "from-file"
base_url = "http://proxy.local/v1"
"#,
        )
        .unwrap();
        config.apply_env_overrides(env(&[("OPENROUTER_API_KEY", "from-env")]));

        let creds = config.credentials_for(ProviderKind::OpenRouter).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("from-env"));
        assert_eq!(creds.base_url, "http://proxy.local/v1");
    }

    #[test]
    fn test_textgen_needs_key_or_url() {
        let mut config = Config::from_toml_str("[provider.textgen]\napi_key = \"\"\n").unwrap();
        assert!(config.credentials_for(ProviderKind::TextGen).is_none());

        config.apply_env_overrides(env(&[("TEXTGEN_BASE_URL", "http://gpu:8080")]));
        let creds = config.credentials_for(ProviderKind::TextGen).unwrap();
        assert_eq!(creds.api_key, None);
        assert_eq!(creds.base_url, "http://gpu:8080");
    }

    #[test]
    fn test_default_provider_moves_to_front() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("AI_PROVIDER", "TextGen"), ("AI_MODEL", "llama3")]));
        assert_eq!(
            config.provider_order().unwrap(),
            vec![ProviderKind::TextGen, ProviderKind::OpenRouter, ProviderKind::OpenAI]
        );
        assert_eq!(config.model, "llama3");
    }

    #[test]
    fn test_unknown_provider_in_order() {
        let mut config = Config::default();
        config.providers.push("anthropic".into());
        assert_eq!(
            config.provider_order(),
            Err(ConfigError::UnknownProvider("anthropic".into()))
        );
    }

    #[test]
    fn test_redacted_masks_keys() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("OPENAI_API_KEY", "sk-secret")]));
        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_resolve_str_substitutes_missing_as_empty() {
        assert_eq!(
            Config::resolve_str("{env:FAKEVERIFIER_SURELY_UNSET_VAR}"),
            ""
        );
        assert_eq!(Config::resolve_str("plain"), "plain");
    }
}
