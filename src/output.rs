//! Output formatting utilities
//!
//! Handles JSON, YAML, and table output formats.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::OutputFormat;
use crate::config::RuntimeContext;

/// Format and print data according to the configured output format
pub fn print_output<T: Serialize>(ctx: &RuntimeContext, data: &T) -> Result<()> {
    let output = format_output(ctx.output_format(), data)?;
    println!("{output}");
    Ok(())
}

/// Format data for a non-table output format
pub fn format_output<T: Serialize>(format: OutputFormat, data: &T) -> Result<String> {
    let is_tty = std::io::stdout().is_terminal();

    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        _ if is_tty => Ok(serde_json::to_string_pretty(data)?),
        _ => Ok(serde_json::to_string(data)?),
    }
}

/// Print rows as a table on a terminal, or serialized otherwise
pub fn print_table<T: Tabled + Serialize>(ctx: &RuntimeContext, items: &[T]) -> Result<()> {
    if !ctx.is_table_output() {
        return print_output(ctx, &items);
    }

    if items.is_empty() {
        println!("(none)");
        return Ok(());
    }

    let table = build_table(ctx, items);
    println!("{table}");
    Ok(())
}

fn build_table<T: Tabled>(ctx: &RuntimeContext, items: &[T]) -> Table {
    let mut table = Table::new(items);
    table.with(Style::sharp());

    if ctx.global.no_headers || ctx.config.output.no_headers {
        table.with(tabled::settings::Remove::row(
            tabled::settings::object::Rows::first(),
        ));
    }

    table
}

/// Shorten `text` to `max` characters with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{keep}…")
}

/// Human readable age of an RFC 3339 timestamp, e.g. `5m ago`
pub fn changed_ago(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return String::new();
    };
    let seconds = (now - then.with_timezone(&Utc)).num_seconds().max(0);
    if seconds < 5 {
        return "just now".to_string();
    }

    // keep the two largest units
    let full = humantime::format_duration(Duration::from_secs(seconds as u64)).to_string();
    let short: Vec<&str> = full.split(' ').take(2).collect();
    format!("{} ago", short.join(" "))
}

/// Compact on/off style state for tables
pub fn format_state(state: &str, brightness: Option<u8>) -> String {
    match brightness {
        Some(pct) if state == "on" => format!("on {pct}%"),
        _ => state.to_string(),
    }
}
