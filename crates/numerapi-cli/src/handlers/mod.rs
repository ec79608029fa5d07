//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> anyhow::Result<()>`
//! - Thin wrappers that validate CLI input, call the client and print results

pub mod account;
pub mod datasets;
pub mod query;
pub mod submit;
pub mod transfer;

use std::future::Future;

use numerapi_transfer::TransferControl;
use tracing::warn;

use crate::bootstrap::CliContext;
use crate::commands::Commands;
use crate::presentation::TransferBar;

/// Route a parsed command to its handler.
pub async fn dispatch(ctx: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Download {
            url,
            dest,
            resume,
            expected_size,
        } => transfer::download(ctx, &url, &dest, resume, expected_size).await,
        Commands::Upload { file, url, field } => {
            transfer::upload(ctx, &file, &url, field.as_deref()).await
        }
        Commands::ListDatasets { round } => datasets::list(ctx, round).await,
        Commands::DownloadDataset {
            filename,
            dest,
            round,
            resume,
        } => datasets::download(ctx, &filename, dest.as_deref(), round, resume).await,
        Commands::CurrentRound => account::current_round(ctx).await,
        Commands::Models => account::models(ctx).await,
        Commands::Account => account::show(ctx).await,
        Commands::CheckNewRound { hours } => account::check_new_round(ctx, hours).await,
        Commands::Submit { file, model_id } => {
            submit::predictions(ctx, &file, model_id.as_deref()).await
        }
        Commands::Diagnostics { file, model_id } => {
            submit::diagnostics(ctx, &file, model_id.as_deref()).await
        }
        Commands::Query {
            query,
            variables,
            auth,
        } => query::execute(ctx, &query, variables.as_deref(), auth).await,
    }
}

/// Run one transfer with a progress bar and Ctrl-C cancellation.
pub(crate) async fn with_transfer<T, E, F, Fut>(
    mut control: TransferControl,
    label: &str,
    show_progress: bool,
    transfer: F,
) -> anyhow::Result<T>
where
    F: FnOnce(TransferControl) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    anyhow::Error: From<E>,
{
    let bar = TransferBar::attach(&mut control, label, show_progress);
    let token = control.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping transfer");
            token.cancel();
        }
    });

    let result = transfer(control).await;
    interrupt.abort();
    bar.finish().await;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerapi_transfer::TransferError;

    #[tokio::test]
    async fn with_transfer_returns_value() {
        let value = with_transfer(TransferControl::new(), "x", false, |_control| async {
            Ok::<_, TransferError>(42)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn with_transfer_keeps_error_type() {
        let err = with_transfer(TransferControl::new(), "x", true, |control| async move {
            control.cancel();
            Err::<(), _>(TransferError::Cancelled {
                bytes_transferred: 5,
            })
        })
        .await
        .unwrap_err();
        assert!(err.downcast_ref::<TransferError>().is_some_and(TransferError::is_cancelled));
    }
}
