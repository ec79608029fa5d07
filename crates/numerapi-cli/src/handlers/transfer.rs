//! `download` and `upload`: plain transfers without the tournament API.

use std::path::Path;

use anyhow::Context;
use numerapi_transfer::{DownloadRequest, UploadRequest};

use super::with_transfer;
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_json;

/// Download `url` into `dest`.
pub async fn download(
    ctx: &CliContext,
    url: &str,
    dest: &Path,
    resume: bool,
    expected_size: Option<u64>,
) -> anyhow::Result<()> {
    let mut request = DownloadRequest::new(url, dest)
        .map_err(|e| CliError::Usage(format!("{url}: {e}")))?
        .with_resume(resume);
    if let Some(size) = expected_size {
        request = request.with_expected_size(size);
    }

    let engine = ctx.api.engine();
    let label = dest.display().to_string();
    let path = with_transfer(ctx.api.control(), &label, ctx.show_progress, |control| {
        engine.download_with(&request, control)
    })
    .await
    .with_context(|| format!("downloading {}", dest.display()))?;

    println!("{}", path.display());
    Ok(())
}

/// Upload `file` to `url`, as a raw PUT or as the multipart field `field`.
pub async fn upload(
    ctx: &CliContext,
    file: &Path,
    url: &str,
    field: Option<&str>,
) -> anyhow::Result<()> {
    let source = super::submit::existing_file(file)?;
    let label = source.file_name();
    let mut request =
        UploadRequest::new(url, source).map_err(|e| CliError::Usage(format!("{url}: {e}")))?;
    if let Some(field) = field {
        request = request.as_form_field(field);
    }

    let engine = ctx.api.engine();
    let ack = with_transfer(ctx.api.control(), &label, ctx.show_progress, |control| {
        engine.upload_with(&request, control)
    })
    .await
    .with_context(|| format!("uploading {}", file.display()))?;

    print_json(&serde_json::to_value(&ack)?)
}
