//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the Numerai tournament API.
#[derive(Parser, Debug)]
#[command(name = "numerapi")]
#[command(about = "Download Numerai datasets and upload predictions")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Use the Signals tournament instead of Classic
    #[arg(long, global = true)]
    pub signals: bool,

    /// Public half of the API key
    #[arg(long, global = true, env = "NUMERAI_PUBLIC_ID", hide_env_values = true)]
    pub public_id: Option<String>,

    /// Secret half of the API key
    #[arg(long, global = true, env = "NUMERAI_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from(["numerapi", "--signals", "current-round", "-v"]);
        assert!(cli.verbose);
        assert!(cli.signals);
        assert!(matches!(cli.command, Commands::CurrentRound));
    }

    #[test]
    fn test_missing_command_is_an_error() {
        assert!(Cli::try_parse_from(["numerapi"]).is_err());
    }
}
