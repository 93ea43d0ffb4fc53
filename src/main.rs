//! # noxy
//!
//! Bridge binary: connects the conversation on stdin/stdout to the MQTT bus
//! and runs one bridge instance per enabled feature until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn, Level};

use noxy_core::{SessionHost, SessionId};
use noxy_host::{Drivers, StdioSession};
use noxy_settings::loader::{load_settings_from_path, settings_path};
use noxy_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Noxy-RED bridge between a conversation session and an MQTT bus.
#[derive(Parser, Debug)]
#[command(name = "noxy", about = "Noxy-RED bridge")]
struct Cli {
    /// Settings file (defaults to `~/.noxy/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format: `json` or `pretty`.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Default log level (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<Level>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let result = runtime.block_on(run(cli));
    // The blocking stdin read never returns on its own.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    let format = match cli.log_format {
        Some(format) => format,
        None => settings.logging.format.parse()?,
    };
    let log_level = match cli.log_level {
        Some(level) => level,
        None => settings
            .logging
            .level
            .parse()
            .map_err(|_| anyhow!("invalid log level: {}", settings.logging.level))?,
    };
    let _telemetry = init_telemetry(TelemetryConfig {
        log_level,
        module_levels: Vec::new(),
        format,
    });
    info!(path = %path.display(), broker = %settings.mqtt.broker_address, port = settings.mqtt.port, "settings loaded");

    let (session, writer) = StdioSession::stdout(SessionId::new());
    info!(session_id = %session.session_id(), "session ready");

    let host = Arc::new(noxy_host::build(
        &settings,
        Arc::clone(&session) as Arc<dyn SessionHost>,
        Drivers::logging(settings.interfaces.vjoy_device),
    ));

    let mut input = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.read_events(BufReader::new(tokio::io::stdin())).await })
    };
    // Bridges connect in the background so an interrupt can cancel their retries.
    let mut starting = {
        let host = Arc::clone(&host);
        let events = session.events().clone();
        tokio::spawn(async move { host.start(&events).await })
    };
    let mut started = false;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("interrupt received"),
                    Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
                }
                break;
            }
            read = &mut input => {
                match read {
                    Ok(Ok(())) => info!("session input ended"),
                    Ok(Err(e)) => warn!(error = %e, "session input failed"),
                    Err(e) => warn!(error = %e, "session reader ended abnormally"),
                }
                break;
            }
            bridges = &mut starting, if !started => {
                started = true;
                match bridges {
                    Ok(bridges) if bridges.is_empty() => warn!("no bridge instance is running"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "bridge startup ended abnormally"),
                }
            }
        }
    }

    info!("shutting down");
    host.shutdown().await;
    if !started {
        // Cancelled starts return promptly.
        if tokio::time::timeout(Duration::from_secs(2), starting).await.is_err() {
            warn!("bridge startup did not stop in time");
        }
    }
    input.abort();

    // The writer drains once every session handle is gone.
    drop(host);
    drop(session);
    if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
        warn!("session output did not drain in time");
    }
    Ok(())
}
