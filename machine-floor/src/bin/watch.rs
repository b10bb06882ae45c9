//! Live machine-floor dashboard in the terminal.
//!
//! Shows one machine (or the grid) and keeps it current: duration counters
//! tick every minute and the backend is polled on the refresh interval.
//! Commands are read line by line from stdin.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

use machine_floor::api_client::MachineSource;
use machine_floor::api_client::types::Database;
use machine_floor::config::Config;
use machine_floor::location::Location;
use machine_floor::render::TerminalRenderer;
use machine_floor::session::{Command, Selection, Session, ViewMode};
use machine_floor::tracing::prelude::*;

const HELP: &str = "Commands: m <id>, db <KOL|AHM>, r, auto on|off, grid, single, q";

#[derive(Parser, Debug)]
#[command(name = "machine-floor-watch", version, about = "Live machine-floor dashboard")]
struct Args {
    /// Backend base URL (overrides MACHINE_FLOOR_API_URL).
    #[arg(long)]
    url: Option<String>,

    /// Machine to show at startup.
    #[arg(long, short)]
    machine: Option<u32>,

    /// Database to query: KOL or AHM.
    #[arg(long, short)]
    database: Option<Database>,

    /// Dashboard link to take the machine and database from.
    #[arg(long)]
    location: Option<String>,

    /// Start in the all-machines grid.
    #[arg(long)]
    grid: bool,

    /// Start with auto-refresh off.
    #[arg(long)]
    no_auto_refresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    machine_floor::tracing::init_journald_or_stdout();

    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(url) = &args.url {
        config.set_api_base_url(url);
    }
    if let Some(database) = args.database {
        config.default_database = database;
    }

    let mut selection = Selection {
        machine_id: None,
        database: config.default_database,
        mode: if args.grid {
            ViewMode::Grid
        } else {
            ViewMode::Single
        },
    };
    if let Some(link) = &args.location {
        let location = Location::parse(link, selection.database)?;
        selection.database = location.database;
        if location.from_url {
            selection.machine_id = location.machine_id;
        }
    }
    if let Some(id) = args.machine {
        selection.machine_id = Some(id);
    }

    if selection.machine_id.is_none() && selection.mode == ViewMode::Single {
        match config.default_machine_id {
            Some(hint) => eprintln!("No machine selected. Type `m <id>`, e.g. `m {hint}`."),
            None => eprintln!("No machine selected. Type `m <id>`."),
        }
    }
    eprintln!("{HELP}");

    let mut settings = config.session_settings();
    settings.auto_refresh = !args.no_auto_refresh;

    info!(api = %config.api_base_url, "Starting machine-floor watch");
    let source: Arc<dyn MachineSource> = Arc::new(config.client());
    let session = Session::new(source, TerminalRenderer::stdout(), settings, selection);

    let (command_tx, command_rx) = mpsc::channel(8);
    let cancellation = CancellationToken::new();
    let mut session_task = tokio::spawn(session.run(command_rx, cancellation.clone()));
    tokio::spawn(read_commands(command_tx));

    tokio::select! {
        result = &mut session_task => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            cancellation.cancel();
            session_task.await?;
        }
    }

    Ok(())
}

/// Forward stdin lines to the session as commands.
///
/// On end of input the sender is held until the session exits, so a
/// watcher without a terminal keeps running.
async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).await.is_err() {
                    return;
                }
            }
            Err(e) => eprintln!("{e}. {HELP}"),
        }
    }

    debug!("stdin closed, no more commands");
    tx.closed().await;
}
