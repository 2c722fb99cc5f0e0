//! g3link CLI - talk to a Glasses 3 device from the shell.
//!
//! Responses and signal events are printed to stdout as JSON. Logs go to
//! stderr; set `RUST_LOG=debug` for protocol traffic.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use g3link::{Config, Connection};
use mimalloc::MiMalloc;
use serde_json::Value;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "g3link")]
#[command(version)]
#[command(about = "Request/response and signal client for Glasses 3 devices")]
struct Cli {
    /// Device hostname (overrides config file and G3_HOSTNAME)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a path (e.g. "/system.recording-unit-serial")
    Get {
        /// API path
        path: String,
        /// Query parameters as a JSON value
        #[arg(long)]
        params: Option<String>,
    },
    /// Post to a path (e.g. "/recorder!start")
    Post {
        /// API path
        path: String,
        /// Request body as a JSON value (null if omitted)
        body: Option<String>,
    },
    /// Print events of a signal until Ctrl-C (e.g. "/recorder:started")
    Watch {
        /// Signal path
        path: String,
        /// Stop after this many events
        #[arg(long)]
        count: Option<usize>,
    },
}

fn parse_json(what: &str, raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|text| {
        serde_json::from_str(text).with_context(|| format!("{what} is not valid JSON: {text}"))
    })
    .transpose()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(conn: &Connection, path: &str, count: Option<usize>) -> Result<()> {
    let (mut events, handle) = conn
        .subscribe(path)
        .await
        .with_context(|| format!("Failed to subscribe to {path}"))?;
    log::info!("[G3] Watching {} (signal {})", path, events.signal_id());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("[G3] Interrupted");
                break;
            }
            event = events.recv() => {
                let Some(body) = event else {
                    log::warn!("[G3] Connection ended while watching {}", path);
                    break;
                };
                print_json(&Value::Array(body))?;
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }

    handle
        .unsubscribe()
        .await
        .with_context(|| format!("Failed to unsubscribe from {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.hostname = Some(host);
    }

    let conn = Connection::connect(&config)
        .await
        .context("Failed to connect to device")?;

    let outcome = match cli.command {
        Commands::Get { path, params } => {
            let params = parse_json("--params", params.as_deref())?;
            match conn.get(&path, params).await {
                Ok(body) => print_json(&body),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Post { path, body } => {
            let body = parse_json("Body", body.as_deref())?;
            match conn.post(&path, body).await {
                Ok(answer) => print_json(&answer),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Watch { path, count } => watch(&conn, &path, count).await,
    };

    conn.close().await;
    outcome
}
