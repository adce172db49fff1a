//! Kida command line
//!
//! Tries UPnP port mapping and then UDP hole punching, reports the outcome,
//! and exits 0 on success or 1 when every strategy was exhausted.

use anyhow::Context;
use clap::Parser;
use kida::config::KidaConfig;
use kida::connectivity::{delete_upnp_mapping, establish_connectivity, ConnectionToken};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "kida")]
#[command(about = "Kida - establish reachability through NAT", long_about = None)]
struct Cli {
    /// JSON config file (defaults are used if it doesn't exist)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to map and punch from
    #[arg(short, long)]
    port: Option<u16>,

    /// Peer address for UDP hole punching
    #[arg(long)]
    peer: Option<SocketAddr>,

    /// Remove the UPnP mapping again before exiting
    #[arg(long)]
    release: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    kida::init_with_level(if cli.verbose { Level::DEBUG } else { Level::INFO });

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => KidaConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => KidaConfig::default(),
    };

    if let Some(port) = cli.port {
        config.set_port(port);
    }
    if let Some(peer) = cli.peer {
        config.set_peer(peer);
    }

    let report = establish_connectivity(&config).await;

    let Some(token) = report.result.into_token() else {
        error!("All connection strategies exhausted with no success.");
        return Ok(ExitCode::FAILURE);
    };

    info!("Success! {}", token);

    if cli.release {
        if let ConnectionToken::PortMapped(_) = token {
            if let Err(e) = delete_upnp_mapping(&config.upnp)
                .await
                .map_err(kida::Error::from)
            {
                warn!("Failed to release UPnP mapping: {}", e);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
