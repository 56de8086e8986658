use anyhow::{anyhow, Context};
use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a raw API value: pretty JSON, or `key: value` lines for text
pub fn output_value(output_format: OutputFormat, value: &Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => match value {
            Value::Object(map) => {
                for (key, field) in map {
                    println!("{}: {}", key, text_field(field));
                }
            }
            other => println!("{}", text_field(other)),
        },
    }
    Ok(())
}

/// One line per job for `jobs list` in text mode
pub fn output_job_table(output_format: OutputFormat, page: &Value) -> anyhow::Result<()> {
    if output_format == OutputFormat::Json {
        return output_value(output_format, page);
    }

    let jobs = page.get("jobs").and_then(Value::as_array).cloned().unwrap_or_default();
    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!("{:<36}  {:<22}  {:<10}  {:>6}  {}", "ID", "TYPE", "STATUS", "PROG", "BUSINESS");
    for job in &jobs {
        println!(
            "{:<36}  {:<22}  {:<10}  {:>5.0}%  {}",
            job["id"].as_str().unwrap_or("-"),
            job["type"].as_str().unwrap_or("-"),
            job["status"].as_str().unwrap_or("-"),
            job["progress"].as_f64().unwrap_or(0.0) * 100.0,
            job["business_id"].as_str().unwrap_or("-"),
        );
    }

    println!(
        "{} of {} (offset {}){}",
        jobs.len(),
        page["total"],
        page["offset"],
        if page["has_more"].as_bool() == Some(true) { ", more available" } else { "" }
    );
    Ok(())
}

fn text_field(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse `key=value` pairs into a JSON object. Values that parse as JSON
/// (numbers, booleans, arrays) keep their type; everything else is a string.
pub fn parse_params(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut params = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --param '{}', expected key=value", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("invalid --param '{}', key is empty", pair));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

/// Parse a `--payload` argument: inline JSON, or `@path` to read a file
pub fn parse_payload(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?,
        None => raw.to_string(),
    };

    match serde_json::from_str::<Value>(&text).context("payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("payload must be a JSON object")),
    }
}
