//! Configuration types and path resolution for fakeverifier-ai.
//!
//! Settings are stored as TOML at the platform's XDG config path
//! (e.g. `~/.config/fakeverifier/config.toml` on Linux), optionally overlaid by
//! a `fakeverifier.toml` found between the working directory and the git root.
//! Config is read once at process start and never mutated afterwards.

mod loader;
mod paths;
mod resolve;
mod types;

pub use resolve::Credentials;
pub use types::{Config, ModelTables, ProviderConfig, ProviderEntry, SamplingConfig, UseCaseModels};

use anyhow::Result;

impl Config {
    /// Load config with precedence: env > project > global > defaults.
    /// Creates default config file if none exists.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project()?;

        let mut config = global;
        if let Some(proj) = project {
            config = Self::merge(config, proj);
        }

        config.resolve_substitutions();
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }
}
