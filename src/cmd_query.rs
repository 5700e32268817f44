//! Query subcommand handlers: list, get, clear.

use tabtrace_daemon::{CaptureConfig, DaemonClient, DaemonError, NetworkFilter, NetworkRequest, ResourceType};

pub(crate) async fn cmd_list(
    config: CaptureConfig,
    tab: Option<String>,
    filter: Option<String>,
    types: Vec<String>,
    failed: bool,
    json: bool,
) -> Result<(), DaemonError> {
    let types = parse_types(&types)?;
    let client = DaemonClient::new(config);
    client.ensure_daemon().await?;

    let records = client.list(tab.as_deref()).await?;
    let filter = NetworkFilter {
        pattern: filter,
        types,
        failed,
    };
    let records = filter.apply(records);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No requests captured.");
        return Ok(());
    }
    for record in &records {
        println!("{}", summary_line(record));
    }
    println!("\n{} request(s)", records.len());
    Ok(())
}

pub(crate) async fn cmd_get(
    config: CaptureConfig,
    tab: String,
    id: u64,
    headers: bool,
    body: bool,
    request_body: bool,
    json: bool,
) -> Result<(), DaemonError> {
    let client = DaemonClient::new(config);
    client.ensure_daemon().await?;

    let record = client.get(&tab, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("{}", summary_line(&record));
    if let Some(error) = &record.error {
        println!("  error: {}", error);
    }

    if headers {
        println!("\nRequest headers:");
        for (name, value) in &record.request_headers {
            println!("  {}: {}", name, display_value(value));
        }
        if let Some(response_headers) = &record.response_headers {
            println!("\nResponse headers:");
            for (name, value) in response_headers {
                println!("  {}: {}", name, display_value(value));
            }
        }
    }

    if request_body {
        match &record.request_body {
            Some(payload) => println!("\nRequest body:\n{}", payload),
            None => println!("\nRequest body: (none)"),
        }
    }

    if body {
        match &record.response_body {
            Some(payload) => println!("\nResponse body:\n{}", payload),
            None => println!("\nResponse body: (not captured)"),
        }
    }
    Ok(())
}

pub(crate) async fn cmd_clear(config: CaptureConfig, tab: Option<String>) -> Result<(), DaemonError> {
    let client = DaemonClient::new(config);
    client.ensure_daemon().await?;
    client.clear(tab.as_deref()).await?;

    match tab {
        Some(tab) => println!("Cleared requests for tab {}", tab),
        None => println!("Cleared all requests"),
    }
    Ok(())
}

fn parse_types(raw: &[String]) -> Result<Vec<ResourceType>, DaemonError> {
    raw.iter()
        .map(|s| s.parse().map_err(DaemonError::InvalidConfig))
        .collect()
}

/// One-line rendering used by `list` and the `get` header.
fn summary_line(record: &NetworkRequest) -> String {
    let status = match (record.failed, record.status) {
        (true, _) => "FAILED".to_string(),
        (false, Some(status)) => status.to_string(),
        (false, None) => "-".to_string(),
    };
    let duration = record
        .duration
        .map(|d| format!("{:.0}ms", d))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<5} [{}] {:<6} {:<10} {:>7} {:>8}  {}",
        record.id, record.tab_id, record.method, record.resource_type, status, duration, record.url
    )
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
