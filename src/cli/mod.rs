//! Command-line interface definition and dispatch for fv-ai.
//!
//! Uses [`clap`] for argument parsing with derive macros. Listing commands
//! live in the [`listing`] submodule.

mod listing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fakeverifier_ai::config::{Config, SamplingConfig};
use fakeverifier_ai::constants::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use fakeverifier_ai::error::ConfigError;
use fakeverifier_ai::fallback::FallbackRouter;
use fakeverifier_ai::message::Message;
use fakeverifier_ai::output::{Renderer, StdoutRenderer};
use fakeverifier_ai::provider::{CompletionRequest, SamplingParams};
use fakeverifier_ai::selection::{model_for_use_case, ModelCatalog, Tier, UsageTracker};

/// Top-level CLI structure for fv-ai.
#[derive(Parser)]
#[command(name = "fv-ai", about = "FakeVerifier AI completions with provider fallback")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
///
/// The `///` doc comments on variants double as `--help` text rendered by clap.
#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question and stream the answer
    Ask(AskArgs),
    /// List the model catalog and configured providers
    Models {
        /// Only show one tier (free, paid)
        #[arg(short, long)]
        tier: Option<String>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: Vec<String>,
    /// Model tried first on every provider (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,
    /// Billing tier used for model selection (free, paid)
    #[arg(short, long, default_value = "free")]
    pub tier: String,
    /// Pick the model from the catalog for this use case (default, search, analysis)
    #[arg(short, long)]
    pub use_case: Option<String>,
    /// System prompt (overrides config)
    #[arg(short, long)]
    pub system: Option<String>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub top_p: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    /// Cancel the request after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Subcommands for the `config` command.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current config with API keys redacted
    Show,
}

pub fn parse() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI command to its handler.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Ask(args) => ask(args).await,
        Commands::Models { tier } => {
            let config = Config::load()?;
            let tier = tier.map(|t| t.parse::<Tier>()).transpose()?;
            listing::list_models(&config, tier)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => {
            let config = Config::load()?;
            match action {
                ConfigAction::Show => listing::show_config(&config)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn ask(args: AskArgs) -> Result<ExitCode> {
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Usage: fv-ai ask \"your question here\"");
    }

    let config = Config::load()?;
    let tier: Tier = args.tier.parse()?;
    let catalog = ModelCatalog::from_tables(&config.models);
    let tracker = Arc::new(UsageTracker::new());

    let model = match (args.model, args.use_case) {
        (Some(model), _) => model,
        (None, Some(use_case)) => model_for_use_case(&catalog, &tracker, tier, use_case.parse()?)?,
        (None, None) => config.model.clone(),
    };
    let sampling = sampling_params(
        args.temperature,
        args.top_p,
        args.max_tokens,
        &config.sampling,
    )?;

    let router = FallbackRouter::from_config(&config)?.with_usage_tracker(tracker, tier);
    info!(providers = ?router.backend_names(), %model, "Router ready");

    let mut messages = Vec::new();
    if let Some(system) = args.system.or_else(|| config.system_prompt.clone()) {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(&prompt));

    let cancel = CancellationToken::new();
    spawn_cancel_on_ctrl_c(cancel.clone());
    if let Some(secs) = args.timeout {
        spawn_cancel_after(cancel.clone(), Duration::from_secs(secs));
    }

    println!("{} [model: {}]", "fv-ai".bold().cyan(), model.yellow());
    println!();
    println!("{} {}", ">".green().bold(), prompt);
    println!();

    let request = CompletionRequest::new(messages, model)
        .with_sampling(sampling)
        .with_cancel(cancel);
    let mut events = router.stream_completion(request);
    let mut renderer = StdoutRenderer::new();

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => renderer.render_event(&event),
            Err(err) => {
                debug!(error = ?err, "Request failed");
                renderer.render_error(err.user_message());
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    renderer.render_done();
    Ok(ExitCode::SUCCESS)
}

fn spawn_cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling request");
            cancel.cancel();
        }
    });
}

fn spawn_cancel_after(cancel: CancellationToken, after: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                info!(secs = after.as_secs(), "Timeout reached, cancelling request");
                cancel.cancel();
            }
        }
    });
}

/// Merges flag values over config defaults and validates ranges.
fn sampling_params(
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    defaults: &SamplingConfig,
) -> Result<SamplingParams, ConfigError> {
    let temperature = temperature
        .or(defaults.temperature)
        .unwrap_or(DEFAULT_TEMPERATURE);
    let top_p = top_p.or(defaults.top_p).unwrap_or(DEFAULT_TOP_P);
    let max_tokens = max_tokens.or(defaults.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS);

    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Invalid(format!(
            "temperature must be between 0 and 2, got {temperature}"
        )));
    }
    if !(top_p > 0.0 && top_p <= 1.0) {
        return Err(ConfigError::Invalid(format!(
            "top_p must be in (0, 1], got {top_p}"
        )));
    }
    if max_tokens == 0 {
        return Err(ConfigError::Invalid("max_tokens must be positive".into()));
    }

    Ok(SamplingParams {
        temperature: Some(temperature),
        top_p: Some(top_p),
        max_tokens: Some(max_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_defaults() {
        let defaults = SamplingConfig {
            temperature: Some(0.7),
            top_p: None,
            max_tokens: Some(512),
        };
        let params = sampling_params(Some(1.1), None, None, &defaults).unwrap();
        assert_eq!(params.temperature, Some(1.1));
        assert_eq!(params.top_p, Some(DEFAULT_TOP_P));
        assert_eq!(params.max_tokens, Some(512));
    }

    #[test]
    fn test_out_of_range_sampling_is_rejected() {
        let defaults = SamplingConfig::default();
        assert!(sampling_params(Some(2.5), None, None, &defaults).is_err());
        assert!(sampling_params(None, Some(0.0), None, &defaults).is_err());
        assert!(matches!(
            sampling_params(None, None, Some(0), &defaults),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_ask_parses_flags() {
        let cli = Cli::try_parse_from([
            "fv-ai", "ask", "--tier", "paid", "--use-case", "analysis", "--timeout", "30", "is",
            "this", "true",
        ])
        .unwrap();
        let Commands::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.prompt.join(" "), "is this true");
        assert_eq!(args.tier, "paid");
        assert_eq!(args.use_case.as_deref(), Some("analysis"));
        assert_eq!(args.timeout, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_token() {
        let cancel = CancellationToken::new();
        spawn_cancel_after(cancel.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!cancel.is_cancelled());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cancel.is_cancelled());
    }
}
