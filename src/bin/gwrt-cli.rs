//! Minimal front-end: load a configuration file, build a topology, start it,
//! wait for Ctrl-C, destroy it (SPEC_FULL.md ยง6, "Exit codes"). This binary
//! is illustrative only; the library never installs its own subscriber.

use std::collections::HashMap;
use std::process::ExitCode;

use gwrt::{Broker, GatewayConfig, Topology};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: gwrt-cli <config.json>");
        return ExitCode::FAILURE;
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(path = %path, error = %err, "failed to read configuration file");
            return ExitCode::FAILURE;
        }
    };

    let config = match GatewayConfig::from_json(&text) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to parse configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut topology = match Topology::create(Broker::create(), Some(config), HashMap::new()).await {
        Ok(topology) => topology,
        Err(err) => {
            tracing::error!(error = %err, "failed to build topology");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = topology.start().await {
        tracing::error!(error = %err, "failed to start topology");
        topology.destroy().await;
        return ExitCode::FAILURE;
    }

    tracing::info!("gateway runtime started, waiting for Ctrl-C");
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }

    tracing::info!("shutting down");
    topology.destroy().await;
    ExitCode::SUCCESS
}
