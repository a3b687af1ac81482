//! scatter CLI - run the gateway or a peer storage node
//!
//! Usage:
//!   scatter gateway                  Accept clients on S1
//!   scatter peer --node <2|3|4>      Serve one peer node
//!   scatter config                   Print a sample configuration

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scatter_core::Config;
use scatter_daemon::{Gateway, GatewayContext, PeerContext, PeerNode};

#[derive(Parser)]
#[command(name = "scatter")]
#[command(about = "Extension-routed file federation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true, env = "SCATTER_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root holding S1..S4 (default: home directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway node (S1)
    Gateway {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<IpAddr>,

        /// Address of peer S2
        #[arg(long)]
        peer2: Option<SocketAddr>,

        /// Address of peer S3
        #[arg(long)]
        peer3: Option<SocketAddr>,

        /// Address of peer S4
        #[arg(long)]
        peer4: Option<SocketAddr>,
    },

    /// Run a peer storage node
    Peer {
        /// Node number
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(2..=4))]
        node: u8,

        /// Port to listen on (default: 9000 + node)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<IpAddr>,
    },

    /// Print a sample configuration file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => Config::load(),
    };
    if let Some(root) = cli.root {
        config.storage.root = Some(root);
    }

    match cli.command {
        Commands::Gateway {
            port,
            bind,
            peer2,
            peer3,
            peer4,
        } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            if let Some(addr) = peer2 {
                config.peers.s2 = addr;
            }
            if let Some(addr) = peer3 {
                config.peers.s3 = addr;
            }
            if let Some(addr) = peer4 {
                config.peers.s4 = addr;
            }
            run_gateway(config).await
        }
        Commands::Peer { node, port, bind } => {
            config.peer.node = node;
            if port.is_some() {
                config.peer.port = port;
            }
            if let Some(bind) = bind {
                config.peer.bind = bind;
            }
            run_peer(config).await
        }
        Commands::Config => {
            println!("{}", Config::sample());
            Ok(())
        }
    }
}

async fn run_gateway(config: Config) -> Result<()> {
    let ctx = GatewayContext::from_config(&config);
    info!("Starting scatter gateway...");
    info!("  Peers: S2={} S3={} S4={}", ctx.peers.s2, ctx.peers.s3, ctx.peers.s4);

    let gateway = Gateway::bind(config.gateway.bind_addr(), ctx)
        .await
        .context("failed to start gateway")?;

    // Handle Ctrl+C
    tokio::select! {
        result = gateway.serve() => {
            if let Err(e) = result {
                error!("Gateway error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

async fn run_peer(config: Config) -> Result<()> {
    let ctx = PeerContext::from_config(&config).context("invalid peer configuration")?;
    info!("Starting scatter peer {}...", ctx.node);

    let node = PeerNode::bind(config.peer.bind_addr(), ctx)
        .await
        .context("failed to start peer node")?;

    tokio::select! {
        result = node.serve() => {
            if let Err(e) = result {
                error!("Peer error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
