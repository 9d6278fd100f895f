//! Entry point for fv-ai, the FakeVerifier completion CLI.
//!
//! This binary loads environment variables, sets up logging, parses CLI
//! arguments via [`cli`], and dispatches to the chosen subcommand.

mod cli;

use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Runs the fv-ai CLI.
///
/// Logs go to stderr so streamed answers on stdout stay clean. Verbosity is
/// controlled by `RUST_LOG` and defaults to warnings only.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::parse();
    cli::run(cli).await
}
