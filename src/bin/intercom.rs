//! Intercom application
//!
//! Runs one full-duplex audio session on the LAN: advertises itself,
//! discovers everyone else, and streams the default input device to every
//! peer while playing back whatever arrives. Video requires a capture and
//! display collaborator and is wired by library consumers, not this binary.
//!
//! Usage: `intercom [config.toml]` — without an argument the per-user config
//! file is used when present, compiled-in defaults otherwise.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_intercom::{
    audio::{CpalSink, CpalSource},
    config::AppConfig,
    session::SessionCoordinator,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN intercom");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&PathBuf::from(&path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => AppConfig::load_default().context("failed to load config")?,
    };
    config.validate().context("invalid configuration")?;

    tracing::info!(
        "audio: {} Hz, {} channels, {} frames/period; discovery on port {}",
        config.audio.sample_rate,
        config.audio.channels,
        config.audio.period_frames,
        config.network.discovery_port,
    );

    let source = CpalSource::new(None, config.audio).context("failed to open input device")?;
    let sink = CpalSink::new(None, config.audio).context("failed to open output device")?;

    let session = SessionCoordinator::start(config, Box::new(source), Box::new(sink), None)
        .context("failed to start session")?;

    println!("Press Enter to stop...");
    let _ = std::io::stdin().read(&mut [0u8])?;

    session.shutdown();
    tracing::info!("Goodbye");
    Ok(())
}
