//! `current-round`, `check-new-round`, `models` and `account`.

use anyhow::Context;

use crate::bootstrap::CliContext;
use crate::presentation::{format_models, print_json};

pub async fn current_round(ctx: &CliContext) -> anyhow::Result<()> {
    match ctx
        .api
        .current_round()
        .await
        .context("fetching current round")?
    {
        Some(round) => println!("{round}"),
        None => println!("no open round"),
    }
    Ok(())
}

pub async fn models(ctx: &CliContext) -> anyhow::Result<()> {
    let models = ctx.api.models().await.context("listing models")?;
    if models.is_empty() {
        eprintln!("No models in the {} tournament", ctx.api.config().tournament());
        return Ok(());
    }
    println!("{}", format_models(&models));
    Ok(())
}

/// Print `1` or `0`, for use in shell scripts.
pub async fn check_new_round(ctx: &CliContext, hours: u32) -> anyhow::Result<()> {
    let new = ctx
        .api
        .check_new_round(hours)
        .await
        .context("checking for a new round")?;
    println!("{}", u8::from(new));
    Ok(())
}

pub async fn show(ctx: &CliContext) -> anyhow::Result<()> {
    let account = ctx.api.account().await.context("fetching account")?;
    print_json(&serde_json::to_value(&account)?)
}
