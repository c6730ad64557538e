//! # pylon-agent
//!
//! Host-side relay agent. Remote clients talk to it over a message channel;
//! this binary speaks the protocol as line-delimited JSON on stdin/stdout so
//! any transport can be bolted in front of it.
//!
//! This binary provides:
//! - **Incoming blobs**: `blob_start` / `blob_chunk` / `blob_end`, written
//!   under the uploads directory after checksum verification
//! - **Outgoing blobs**: `blob_request` streams a local file back as chunks
//! - **Idle sweep**: transfers abandoned mid-way are dropped after a timeout
//!
//! History messages (`history_request` / `history_result`) are not handled
//! here: the agent holds no message log, so they are logged and dropped.
//! `pylon-sync` serves whichever component owns the conversation log.

mod config;
mod error;
mod relay;

use std::sync::Arc;

use pylon_blob::{BlobLimits, BlobTransferManager, TokioFs};
use pylon_shared::constants::{APP_NAME, PROTOCOL_VERSION};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var). Logs go to stderr,
    //    stdout carries protocol messages only.
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pylon_agent=debug,pylon_blob=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        protocol = PROTOCOL_VERSION,
        "Starting {} agent v{}",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = AgentConfig::from_env();
    info!(?config, "Loaded configuration");

    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer);

    let blobs = Arc::new(BlobTransferManager::with_limits(
        config.uploads_dir.clone(),
        TokioFs,
        outbound_tx.clone(),
        BlobLimits {
            max_blob_size: config.max_blob_size,
            ..BlobLimits::default()
        },
    ));

    let relay = Relay::new(blobs.clone());

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Single writer so concurrent senders never interleave lines
    let writer = tokio::spawn(relay::write_outbound(outbound_rx, tokio::io::stdout()));

    // Periodic idle-transfer sweep
    let sweeper = blobs.clone();
    let idle = config.transfer_idle;
    let sweep_interval = config.sweep_interval;
    let sweep = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            relay::sweep_idle(&*sweeper, idle).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Serve stdin until EOF or Ctrl+C
    // -----------------------------------------------------------------------
    tokio::select! {
        result = relay::serve(&relay, BufReader::new(tokio::io::stdin()), outbound_tx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay failed");
                return Err(e.into());
            }
            info!("Input closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Drop every outbound sender so the writer drains and exits.
    sweep.abort();
    let _ = sweep.await;
    drop(relay);
    drop(blobs);
    writer.await??;

    Ok(())
}
