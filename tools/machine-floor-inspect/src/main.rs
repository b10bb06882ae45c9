//! Offline inspection of captured machine-floor payloads.
//!
//! Reads a backend response saved to disk, either the full
//! `{status, data, error}` envelope or a bare record, runs it through the
//! status presenter and prints what the dashboard would show. No network
//! access is involved.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde_json::{Map, Value};

use machine_floor::api_client::types::{Envelope, MachineStatusRecord};
use machine_floor::presenter::{Indicator, TimestampOptions, ViewState, derive_view_state};

#[derive(Parser, Debug)]
#[command(name = "machine-floor-inspect", version, about)]
struct Args {
    /// Captured payload (JSON). Use `-` for stdin.
    input: PathBuf,

    /// Print field keys and texts as a JSON object.
    #[arg(long)]
    json: bool,

    /// Display offset in minutes for timestamps that carry one.
    #[arg(
        long,
        default_value_t = 0,
        allow_hyphen_values = true,
        value_parser = clap::value_parser!(i32).range(-1559..=1559)
    )]
    utc_offset: i32,

    /// Shift applied to every parsed timestamp, in minutes.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    correction: i64,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let text = read_input(&args.input)?;
    let payload: Value = serde_json::from_str(&text).context("payload is not valid JSON")?;
    let record = record_from_payload(payload)?;
    tracing::debug!(?record, "Parsed record");

    let options = TimestampOptions::default()
        .with_display_offset_minutes(args.utc_offset)
        .with_correction_minutes(args.correction);
    let view = derive_view_state(&record, &options);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&fields_json(&view))?);
    } else {
        print_view(&view);
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Accept an envelope (anything with a `status` key) or a bare record.
fn record_from_payload(payload: Value) -> Result<MachineStatusRecord> {
    if payload.get("status").is_some() {
        let envelope: Envelope = serde_json::from_value(payload)?;
        Ok(envelope.into_record()?)
    } else {
        Ok(serde_json::from_value(payload)?)
    }
}

fn fields_json(view: &ViewState) -> Map<String, Value> {
    view.fields()
        .into_iter()
        .map(|(field, text)| (field.key().to_string(), Value::String(text)))
        .collect()
}

fn print_view(view: &ViewState) {
    let status = view.status_label();
    let label = match status.indicator {
        Indicator::Alert => status.text.red().bold(),
        Indicator::Normal => status.text.green().bold(),
    };
    println!("{}  {}", view.display_name().bold(), label);

    for (field, text) in view.fields().into_iter().skip(2) {
        println!(
            "  {:<20}{:<40}{}",
            field.label(),
            text,
            field.key().dimmed()
        );
    }
}
