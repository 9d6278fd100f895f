//! Model catalog and configuration display.

use anyhow::Result;
use colored::Colorize;

use fakeverifier_ai::config::Config;
use fakeverifier_ai::error::ConfigError;
use fakeverifier_ai::provider::{ChatBackend, Provider};
use fakeverifier_ai::selection::{ModelCatalog, Tier, UseCase};

/// Prints the model catalog, grouped by tier and use case, then the
/// providers that will be tried.
pub fn list_models(config: &Config, only: Option<Tier>) -> Result<()> {
    let catalog = ModelCatalog::from_tables(&config.models);
    let tiers: Vec<Tier> = match only {
        Some(tier) => vec![tier],
        None => Tier::ALL.to_vec(),
    };

    println!("Model catalog:\n");
    for tier in tiers {
        println!("  {}:", tier.as_str().bold());
        for use_case in UseCase::ALL {
            println!("    {use_case}:");
            match catalog.models(tier, use_case) {
                Ok(models) => {
                    for model in models {
                        let marker = if *model == config.model { " (default)" } else { "" };
                        println!("      {model}{marker}");
                    }
                }
                Err(e) => println!("      ({e})"),
            }
        }
        println!();
    }

    let providers = Provider::all_from_config(config)?;
    if providers.is_empty() {
        println!("{}", ConfigError::NoProviderConfigured.to_string().yellow());
        return Ok(());
    }

    println!("Providers (in fallback order):\n");
    for provider in &providers {
        println!(
            "  {} {}",
            provider.name().bold(),
            format!("[default: {}]", provider.default_model()).dimmed()
        );
        for model in provider.fallback_models() {
            println!("    fallback: {model}");
        }
    }
    Ok(())
}

/// Prints the config path and the resolved config with API keys masked.
pub fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("{} {}", "Config path:".bold(), path.display());
    println!();
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}
