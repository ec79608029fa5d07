//! CLI entry point - the composition root.
//!
//! Parses arguments, wires logging, builds the client and hands the command
//! to its handler. Failures are printed once and mapped to an exit code.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use numerapi_cli::{Cli, CliError, bootstrap, handlers};

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        let err = CliError::classify(&err);
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = bootstrap(&cli)?;
    handlers::dispatch(&ctx, cli.command).await
}

/// Log to stderr so command output stays pipeable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
