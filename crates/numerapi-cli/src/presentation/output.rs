//! Stdout formatting.

use std::collections::BTreeMap;

use serde_json::Value;

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One `name  id` line per model, names padded to a common width.
pub fn format_models(models: &BTreeMap<String, String>) -> String {
    let width = models.keys().map(String::len).max().unwrap_or(0);
    models
        .iter()
        .map(|(name, id)| format!("{name:<width$}  {id}"))
        .collect::<Vec<_>>()
        .join("\n")
}
