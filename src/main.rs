mod commands;
mod desk;
mod render;
mod state;

use crate::commands::parse_command;
use crate::desk::Desk;
use crate::state::messages::{DeskCommand, InputEvent};
use crate::state::settings::{DeskFile, DeskSettings, SettingsOverrides};
use bracket_engine::cache::StandingsCache;
use bracket_engine::orchestrator::{CompletionOrchestrator, EngineEvent, spawn_listener};
use bracket_engine::store::{MemoryStore, Store};
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(cli_config) = handle_cli_args() else {
        return Ok(());
    };

    better_panic::install();

    let config_path = cli_config.or_else(|| std::env::var_os("BRACKETDESK_CONFIG").map(PathBuf::from));
    let file = match &config_path {
        Some(path) => DeskFile::load(path)?,
        None => DeskFile::default(),
    };
    let env = SettingsOverrides::from_env()?;
    let settings = DeskSettings::resolve(&[&file.desk, &env]);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(StandingsCache::new());
    let (engine_event_tx, engine_event_rx) = mpsc::channel::<EngineEvent>(100);
    let orchestrator = Arc::new(
        CompletionOrchestrator::new(Arc::clone(&store), Arc::clone(&cache), settings.engine.clone())
            .with_events(engine_event_tx),
    );
    let desk = Desk::new(
        Arc::clone(&store),
        cache,
        Arc::clone(&orchestrator),
        settings.snapshot_path.clone(),
    );

    match &config_path {
        Some(path) => {
            let report = desk.configurator().apply(&file.tournament).await?;
            info!("loaded {}", path.display());
            println!(
                "{}: {} divisions, {} pools, {} brackets, {} games",
                file.tournament.name, report.divisions, report.pools, report.brackets, report.games
            );
        }
        None => warn!("no tournament configuration given, starting empty"),
    }

    // Subscribe after loading so the initial games are not replayed.
    let listener = spawn_listener(Arc::clone(&orchestrator), store.subscribe());

    let (input_tx, input_rx) = mpsc::channel::<InputEvent>(100);
    // Plain thread: a read blocked on stdin must not hold up runtime shutdown.
    std::thread::spawn(move || input_handler_task(input_tx));

    main_loop(&desk, input_rx, engine_event_rx).await;

    listener.abort();
    Ok(())
}

/// Returns the optional config path, or None when the process should exit.
fn handle_cli_args() -> Option<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        return Some(None);
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            None
        }
        "-V" | "--version" => {
            println!("bracketdesk {}", env!("CARGO_PKG_VERSION"));
            None
        }
        flag if flag.starts_with('-') => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
        _ => Some(Some(PathBuf::from(arg))),
    }
}

fn usage_text() -> &'static str {
    "bracketdesk - scorekeeping desk for pool-and-bracket tournaments

Usage:
  bracketdesk [tournament.json]
  bracketdesk --help
  bracketdesk --version

Environment:
  BRACKETDESK_CONFIG            Tournament JSON when no path is given
  BRACKETDESK_DEBOUNCE_MS       Pool-completion debounce window (default 5000)
  BRACKETDESK_LEDGER_TTL_SECS   How long processed games are remembered (default 21600)
  BRACKETDESK_CORRECTIONS       reject | overwrite (default reject)
  BRACKETDESK_SNAPSHOT          Where `snapshot` writes (default bracketdesk-snapshot.json)
  BRACKETDESK_LOG               Log filter when RUST_LOG is unset (default info)"
}

async fn main_loop(
    desk: &Desk,
    mut input_events: mpsc::Receiver<InputEvent>,
    mut engine_events: mpsc::Receiver<EngineEvent>,
) {
    loop {
        tokio::select! {
            Some(input) = input_events.recv() => {
                let command = match input {
                    InputEvent::Command(command) => command,
                    InputEvent::Rejected { line, reason } => {
                        println!("? {line}: {reason}");
                        continue;
                    }
                    InputEvent::Closed => break,
                };
                if command == DeskCommand::Quit {
                    break;
                }
                match desk.execute(command).await {
                    Ok(output) if !output.is_empty() => println!("{output}"),
                    Ok(_) => {}
                    Err(e) => println!("! {e:#}"),
                }
            }

            Some(event) = engine_events.recv() => {
                if let EngineEvent::AdvanceFailed { .. } = &event {
                    error!("{}", render::event_line(&event));
                }
                println!(">> {}", render::event_line(&event));
            }

            else => break,
        }
    }
}

fn input_handler_task(input_events: mpsc::Sender<InputEvent>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let event = match parse_command(&line) {
            Ok(Some(command)) => InputEvent::Command(command),
            Ok(None) => continue,
            Err(reason) => InputEvent::Rejected { line, reason },
        };
        if input_events.blocking_send(event).is_err() {
            return;
        }
    }
    let _ = input_events.blocking_send(InputEvent::Closed);
}
