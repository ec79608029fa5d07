//! `list-datasets` and `download-dataset`.

use std::path::Path;

use anyhow::Context;

use super::with_transfer;
use crate::bootstrap::CliContext;

/// Print available dataset files, one per line.
pub async fn list(ctx: &CliContext, round: Option<u32>) -> anyhow::Result<()> {
    let files = ctx
        .api
        .list_datasets(round)
        .await
        .context("listing datasets")?;
    for file in files {
        println!("{file}");
    }
    Ok(())
}

/// Download one dataset file and print where it landed.
pub async fn download(
    ctx: &CliContext,
    filename: &str,
    dest: Option<&Path>,
    round: Option<u32>,
    resume: bool,
) -> anyhow::Result<()> {
    let path = with_transfer(ctx.api.control(), filename, ctx.show_progress, |control| {
        ctx.api.download_dataset(filename, dest, round, resume, control)
    })
    .await
    .with_context(|| format!("downloading dataset {filename}"))?;

    println!("{}", path.display());
    Ok(())
}
