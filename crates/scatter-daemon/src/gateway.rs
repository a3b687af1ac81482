//! Gateway server - accepts clients and runs one session task per connection

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use scatter_core::{Config, NetworkConfig, PeerDirectory};

use crate::net::FrameStream;
use crate::peer_link::PeerLink;
use crate::session::run_session;

/// Read-only settings shared by every gateway session
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Directory holding `S1`
    pub root: PathBuf,
    pub peers: PeerDirectory,
    pub network: NetworkConfig,
    pub max_file_size: u32,
}

impl GatewayContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.storage.root_dir(),
            peers: config.peers.clone(),
            network: config.network.clone(),
            max_file_size: config.storage.max_file_size,
        }
    }

    /// Fresh handle for talking to the peers
    pub fn link(&self) -> PeerLink<'_> {
        PeerLink::new(&self.peers, &self.network, self.max_file_size)
    }
}

/// Listener-level failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("listener address unavailable: {0}")]
    LocalAddr(io::Error),
}

/// The gateway node
pub struct Gateway {
    listener: TcpListener,
    ctx: Arc<GatewayContext>,
}

impl Gateway {
    pub async fn bind(addr: SocketAddr, ctx: GatewayContext) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Accept clients until the task is dropped
    pub async fn serve(self) -> Result<(), ServerError> {
        info!(
            "scatter gateway listening on {} storing under {:?}",
            self.local_addr()?,
            self.ctx.root.join("S1")
        );

        loop {
            let (socket, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                info!("New connection from {}", remote);
                if let Err(e) = socket.set_nodelay(true) {
                    warn!("Cannot set TCP_NODELAY for {}: {}", remote, e);
                }
                let stream = FrameStream::new(socket, ctx.network.io_timeout());
                match run_session(stream, &ctx).await {
                    Ok(()) => info!("Client {} disconnected", remote),
                    Err(e) => error!("Session error from {}: {}", remote, e),
                }
            });
        }
    }
}
