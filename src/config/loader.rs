//! File loading and merging for configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::types::{default_model, default_provider_order, Config, ModelTables, ProviderConfig};

impl Config {
    /// Loads the global config from `~/.config/fakeverifier/config.toml`.
    ///
    /// If no config file exists, creates one with `{env:VAR}` placeholders for
    /// API keys and returns it.
    pub(super) fn load_global() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let default_toml = Self::default_toml();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &default_toml)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            return Self::from_toml_str(&default_toml);
        }
        Self::load_from(&path)
    }

    /// Loads and parses a config file without substitutions or env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    /// Parses config from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// Look for fakeverifier.toml in current dir, then walk up to git root.
    pub(super) fn load_project() -> Result<Option<Config>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                return Self::load_from(&candidate).map(Some);
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Merge project config over global config.
    /// Project values win when they differ from the defaults.
    pub(super) fn merge(global: Config, project: Config) -> Config {
        Config {
            model: if project.model != default_model() {
                project.model
            } else {
                global.model
            },
            default_provider: project.default_provider.or(global.default_provider),
            providers: if project.providers != default_provider_order() {
                project.providers
            } else {
                global.providers
            },
            provider: ProviderConfig {
                openai: project.provider.openai.or(global.provider.openai),
                openrouter: project.provider.openrouter.or(global.provider.openrouter),
                textgen: project.provider.textgen.or(global.provider.textgen),
            },
            models: ModelTables {
                free: project.models.free.or(global.models.free),
                paid: project.models.paid.or(global.models.paid),
            },
            sampling: super::SamplingConfig {
                temperature: project.sampling.temperature.or(global.sampling.temperature),
                top_p: project.sampling.top_p.or(global.sampling.top_p),
                max_tokens: project.sampling.max_tokens.or(global.sampling.max_tokens),
            },
            system_prompt: project.system_prompt.or(global.system_prompt),
        }
    }

    fn default_toml() -> String {
        format!(
            r#"model = "{}"
providers = ["openrouter", "openai", "textgen"]

[provider.openrouter]
api_key = "{{env:OPENROUTER_API_KEY}}"
fallback_models = ["meta-llama/llama-3.3-70b-instruct:free", "mistralai/mistral-7b-instruct:free"]

[provider.openai]
api_key = "{{env:OPENAI_API_KEY}}"
fallback_models = ["gpt-4o-mini"]

[provider.textgen]
api_key = "{{env:TEXTGEN_API_KEY}}"
base_url = "{{env:TEXTGEN_BASE_URL}}"
"#,
            default_model()
        )
    }
}
