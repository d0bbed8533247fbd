//! honyaku-host binary.
//!
//! Usage:
//!   honyaku-host --config ~/.config/honyaku/relay.ron
//!   HONYAKU_CONFIG=relay.ron honyaku-host
//!
//! Stdout carries protocol frames only; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use honyaku_channel::MessageChannel;
use honyaku_host::Host;
use honyaku_relay::{RelayConfig, RelayHub};
use tokio_util::sync::CancellationToken;

/// Background relay for the honyaku extension, spoken to over stdio.
#[derive(Parser, Debug)]
#[command(name = "honyaku-host")]
#[command(about = "Native-messaging host for the honyaku streaming relay")]
struct Args {
    /// RON relay configuration; built-in defaults when omitted
    #[arg(long, env = "HONYAKU_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured default model
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = honyaku_telemetry::init_tracing("honyaku-host")?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("loading relay config from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(model) = args.model {
        config.default_model = model;
    }
    config.validate().context("invalid relay config")?;

    let (channel, inbox) = MessageChannel::new();
    let hub = RelayHub::from_config(&config, channel.clone()).context("building HTTP transport")?;
    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(hub.run(inbox, shutdown.clone()));

    tracing::info!(model = %config.default_model, "honyaku-host ready");
    let served = Host::run(channel, tokio::io::stdin(), tokio::io::stdout()).await;

    shutdown.cancel();
    if let Err(e) = relay.await {
        tracing::error!(error = %e, "relay task failed");
    }
    let stats = served?;
    tracing::info!(frames_in = stats.frames_in, frames_out = stats.frames_out, "honyaku-host shutting down");
    Ok(())
}
