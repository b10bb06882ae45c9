//! Command-line interface for the machine-floor backend.
//!
//! One-shot queries: print one machine's status or the whole grid, then
//! exit. Errors print the backend's message and exit non-zero.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use machine_floor::api_client::types::Database;
use machine_floor::config::{Config, parse_machine_id};
use machine_floor::location::Location;
use machine_floor::presenter::{GridCard, Section, derive_view_state};
use machine_floor::render::{RenderPort, TerminalRenderer, present, show_only};
use machine_floor::session::fetch_grid;

#[derive(Parser, Debug)]
#[command(name = "machine-floor-cli", version, about = "Query machine-floor status")]
struct Cli {
    /// Backend base URL (overrides MACHINE_FLOOR_API_URL).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database to query: KOL or AHM.
    #[arg(long, short, global = true)]
    database: Option<Database>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the status of one machine.
    Status {
        /// Machine id or dashboard link. Defaults to `defaultMachineId`.
        machine: Option<String>,

        /// Print the raw record instead of the formatted view.
        #[arg(long)]
        json: bool,
    },

    /// Show every machine in the grid list.
    Grid,
}

#[tokio::main]
async fn main() -> Result<()> {
    machine_floor::tracing::init_journald_or_stdout();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = &cli.url {
        config.set_api_base_url(url);
    }
    if let Some(database) = cli.database {
        config.default_database = database;
    }

    match cli.command {
        Commands::Status { machine, json } => cmd_status(&config, machine.as_deref(), json).await,
        Commands::Grid => cmd_grid(&config).await,
    }
}

/// Work out which machine and database a `status` argument names.
fn resolve_machine(config: &Config, arg: Option<&str>) -> Result<(u32, Database)> {
    let Some(arg) = arg else {
        let id = config
            .default_machine_id
            .context("no machine given and no defaultMachineId configured")?;
        return Ok((id, config.default_database));
    };

    if let Some(id) = parse_machine_id(arg) {
        return Ok((id, config.default_database));
    }

    let location = Location::parse(arg, config.default_database)?;
    let id = location
        .machine_id
        .with_context(|| format!("no machine id in {arg:?}"))?;
    Ok((id, location.database))
}

/// Print the status of one machine.
async fn cmd_status(config: &Config, machine: Option<&str>, json: bool) -> Result<()> {
    let (machine_id, database) = resolve_machine(config, machine)?;
    let client = config.client();
    let record = client.get_machine(machine_id, database).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let view = derive_view_state(&record, &config.timestamp_options());
    let mut renderer = TerminalRenderer::stdout();
    present(&view, &mut renderer);
    show_only(&mut renderer, Some(Section::Dashboard));
    renderer.flush();

    Ok(())
}

/// Print one line per machine in the grid list.
async fn cmd_grid(config: &Config) -> Result<()> {
    let client = config.client();
    let cards = fetch_grid(
        &client,
        &config.grid_machine_ids,
        config.default_database,
        &config.timestamp_options(),
    )
    .await;

    let mut renderer = TerminalRenderer::stdout();
    renderer.render_grid(&cards);
    show_only(&mut renderer, Some(Section::Grid));
    renderer.flush();

    let failed = cards
        .iter()
        .filter(|card| matches!(card, GridCard::Failed { .. }))
        .count();
    if !cards.is_empty() && failed == cards.len() {
        bail!("none of the {} machines could be loaded", cards.len());
    }

    Ok(())
}
