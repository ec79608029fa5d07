//! `query`: raw GraphQL passthrough.

use anyhow::Context;
use serde_json::Value;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::print_json;

/// Run `query` and pretty-print its data.
pub async fn execute(
    ctx: &CliContext,
    query: &str,
    variables: Option<&str>,
    auth: bool,
) -> anyhow::Result<()> {
    let variables = parse_variables(variables)?;
    let data = ctx
        .api
        .raw_query(query, variables, auth)
        .await
        .context("running query")?;
    print_json(&data)
}

fn parse_variables(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    match serde_json::from_str(raw) {
        Ok(value @ (Value::Object(_) | Value::Null)) => Ok(value),
        Ok(_) => Err(CliError::Usage("--variables must be a JSON object".to_string())),
        Err(e) => Err(CliError::Usage(format!("--variables is not valid JSON: {e}"))),
    }
}
