//! gymcache - command-line driver for the PWA gym tracker cache worker.
//!
//! Each invocation plays the part of the browser: it restarts the worker
//! against the on-disk cache, delivers one event, and prints every message
//! the worker broadcasts to pages as a JSON line.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use gymcache_core::{CacheWorker, ClientHub, Config, UpdateOutcome};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: gymcache <command>

Commands:
  install          Cache every manifest asset and activate the worker
  check-update     Refresh the cache if the remote version changed
  check-version    Report fetched and cached versions
  fetch <url>      Serve one request cache-first, body to stdout
  status           List cache stores and the cached version
  serve            Read JSON requests from stdin, one per line

Configuration: ~/.config/gymcache/config.json, GYMCACHE_ORIGIN, GYMCACHE_CACHE_ROOT.
Logging: RUST_LOG (default \"warn\").";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Install,
    CheckUpdate,
    CheckVersion,
    Fetch(String),
    Status,
    Serve,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let command = match args.get(1).map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => Command::Help,
        Some("install") => Command::Install,
        Some("check-update") => Command::CheckUpdate,
        Some("check-version") => Command::CheckVersion,
        Some("fetch") => match args.get(2) {
            Some(url) => Command::Fetch(url.clone()),
            None => bail!("fetch needs a URL\n\n{}", USAGE),
        },
        Some("status") => Command::Status,
        Some("serve") => Command::Serve,
        Some(other) => bail!("Unknown command: {}\n\n{}", other, USAGE),
    };
    Ok(command)
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
fn init_tracing() -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

/// Print every broadcast message until the hub is dropped.
fn spawn_printer(hub: &ClientHub, to_stderr: bool) -> JoinHandle<()> {
    let mut client = hub.connect();
    tokio::spawn(async move {
        while let Some(message) = client.recv().await {
            if to_stderr {
                eprintln!("{}", message.to_json());
            } else {
                println!("{}", message.to_json());
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let _log_guard = init_tracing();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let hub = ClientHub::new();
    let printer = spawn_printer(&hub, matches!(command, Command::Fetch(_)));
    let worker = Arc::new(CacheWorker::from_config(&config, Arc::new(hub.clone()))?);
    info!(cache = worker.cache_name(), root = %worker.storage().root().display(), "Worker starting");

    let result = run(command, Arc::clone(&worker)).await;

    // Dropping every sender lets the printer drain and finish
    drop(worker);
    drop(hub);
    let _ = printer.await;

    result
}

async fn run(command: Command, worker: Arc<CacheWorker>) -> Result<()> {
    match command {
        Command::Install => {
            worker.install().await?;
            let pruned = worker.activate().await?;
            eprintln!(
                "Installed {} assets into {}",
                worker.manifest().assets().len(),
                worker.cache_name()
            );
            for name in pruned {
                eprintln!("Deleted old cache {}", name);
            }
        }
        Command::CheckUpdate => {
            worker.resume().await?;
            match worker.check_for_update().await? {
                UpdateOutcome::Updated {
                    version,
                    cached,
                    failed,
                } => {
                    eprintln!("Updated to {} ({} files cached)", version, cached);
                    for file in failed {
                        eprintln!("  not cached: {}", file);
                    }
                }
                UpdateOutcome::NoUpdate => eprintln!("No update"),
            }
        }
        Command::CheckVersion => {
            worker.resume().await?;
            let check = worker.check_version().await?;
            eprintln!(
                "fetched: {}  cached: {}",
                check.fetched.as_deref().unwrap_or("none"),
                check.cached.as_deref().unwrap_or("none")
            );
        }
        Command::Fetch(url) => {
            worker.resume().await?;
            let response = worker.handle_fetch(&url).await?;
            if !response.is_success() {
                warn!(url = %url, status = response.status, "Non-success response");
            }
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&response.body).await?;
            stdout.flush().await?;
        }
        Command::Status => status(&worker).await?,
        Command::Serve => serve(worker).await?,
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}

async fn status(worker: &CacheWorker) -> Result<()> {
    let state = worker.resume().await?;
    println!("worker: {}", state);

    let storage = worker.storage();
    for name in storage.keys().await? {
        let marker = if name == worker.cache_name() { "*" } else { " " };
        let store = storage.open(&name).await?;
        let keys = store.keys().await?;
        println!("{} {} ({} entries)", marker, name, keys.len());
        for url in keys {
            if let Some(response) = store.match_url(&url).await? {
                println!("    {} {} (cached {} ago)", response.status, url, response.age_display());
            }
        }
    }

    let check = gymcache_core::version::cached_version(storage, worker.manifest().version_resource()).await?;
    println!("cached version: {}", check.as_deref().unwrap_or("none"));
    Ok(())
}

/// Handle requests from stdin. Each line runs as its own task, so
/// overlapping requests interleave the way concurrent page messages do.
async fn serve(worker: Arc<CacheWorker>) -> Result<()> {
    let state = worker.resume().await?;
    info!(%state, "Serving client messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let worker = Arc::clone(&worker);
        tasks.push(tokio::spawn(async move {
            worker.handle_raw_message(&line).await;
        }));
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            warn!(error = %e, "Message task panicked");
        }
    }
    Ok(())
}
