//! `submit` and `diagnostics`.

use std::path::Path;

use anyhow::Context;
use numerapi_transfer::UploadSource;

use super::with_transfer;
use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Upload predictions and print the submission id.
pub async fn predictions(
    ctx: &CliContext,
    file: &Path,
    model_id: Option<&str>,
) -> anyhow::Result<()> {
    let source = existing_file(file)?;
    let label = source.file_name();
    let id = with_transfer(ctx.api.control(), &label, ctx.show_progress, |control| {
        ctx.api.upload_predictions(source, model_id, control)
    })
    .await
    .with_context(|| format!("submitting {}", file.display()))?;

    println!("{id}");
    Ok(())
}

/// Upload predictions for diagnostics and print the diagnostics id.
pub async fn diagnostics(
    ctx: &CliContext,
    file: &Path,
    model_id: Option<&str>,
) -> anyhow::Result<()> {
    let source = existing_file(file)?;
    let label = source.file_name();
    let id = with_transfer(ctx.api.control(), &label, ctx.show_progress, |control| {
        ctx.api.upload_diagnostics(source, model_id, control)
    })
    .await
    .with_context(|| format!("uploading diagnostics {}", file.display()))?;

    println!("{id}");
    Ok(())
}

/// Reject paths that are not regular files before asking the API for anything.
pub(crate) fn existing_file(path: &Path) -> Result<UploadSource, CliError> {
    if path.is_file() {
        Ok(UploadSource::file(path))
    } else {
        Err(CliError::Usage(format!("{} is not a file", path.display())))
    }
}
