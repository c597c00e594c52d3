//! list-input: standalone entrypoint
//!
//! Overview
//! --------
//! Runs the Redis list input on its own: pops items from the configured list,
//! decodes them, and writes each resulting event as one JSON line to stdout.
//!
//! Responsibilities
//! ----------------
//! - Initialize logging and configuration (`REDIS_*` env vars or `INPUT_CONFIG`).
//! - Build the input; any startup failure exits non-zero.
//! - Cancel the loop on Ctrl-C / SIGTERM and wait for it to drain.
//!
//! Error Model
//! -----------
//! - Initialization failures are fatal.
//! - Per-item decode failures show up as error-tagged events.
//! - A fatal loop error is reported and the process exits non-zero.

use std::io::Write;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use redis_list_input::config::InputConfig;
use redis_list_input::emit::ChannelSink;
use redis_list_input::input::ListInput;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Events buffered between the input and the stdout writer.
const BUS_CAPACITY: usize = 1024;

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c: shutting down"),
        _ = terminate => info!("SIGTERM: shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = InputConfig::from_env()?;
    let input = ListInput::init(&config).await?;

    let (tx, mut rx) = mpsc::channel(BUS_CAPACITY);
    let cancel = CancellationToken::new();
    let task = input.start(ChannelSink::new(tx), cancel.clone());

    let printer = tokio::spawn(async move {
        let stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    let mut out = stdout.lock();
                    if let Err(e) = writeln!(out, "{line}") {
                        error!(error = %e, "stdout write failed");
                    }
                }
                Err(e) => error!(error = %e, "event serialization failed"),
            }
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // Resolves on cancellation or on a fatal input error.
    let outcome = task.await?;
    printer.await?;

    match outcome {
        Ok(stats) => {
            info!(emitted = stats.emitted, decode_errors = stats.decode_errors, "bye");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "input failed");
            Err(e.into())
        }
    }
}
