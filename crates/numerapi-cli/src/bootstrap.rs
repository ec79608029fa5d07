//! Composition root: turns parsed arguments into a ready client.

use numerapi_client::{
    ClientConfig, Credentials, NumerApi, PUBLIC_ID_VAR, SECRET_KEY_VAR, Tournament,
};

use crate::error::CliError;
use crate::parser::Cli;

/// Everything a handler needs.
#[derive(Debug)]
pub struct CliContext {
    /// Tournament client; also owns the transfer engine.
    pub api: NumerApi,
    /// Draw progress bars for transfers.
    pub show_progress: bool,
}

/// Build the context for one invocation.
///
/// Credentials come from the flags, which fall back to the environment.
/// Compute and trigger ids come from the environment only.
pub fn bootstrap(cli: &Cli) -> Result<CliContext, CliError> {
    let mut config = ClientConfig::from_env();
    if let Some(credentials) = Credentials::from_lookup(|name| match name {
        PUBLIC_ID_VAR => cli.public_id.clone(),
        SECRET_KEY_VAR => cli.secret_key.clone(),
        _ => None,
    }) {
        config = config.with_credentials(credentials);
    }
    if cli.signals {
        config = config.with_tournament(Tournament::Signals);
    }

    let api = NumerApi::new(config).map_err(|e| CliError::Other(e.to_string()))?;
    Ok(CliContext {
        api,
        show_progress: !cli.no_progress,
    })
}
