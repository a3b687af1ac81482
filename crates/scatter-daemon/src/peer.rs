//! Peer storage node
//!
//! Serves the gateway-facing half of the protocol for one node. A peer owns a
//! single extension and only ever touches files under its own `S<n>` tree.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use scatter_core::path::node_root;
use scatter_core::{
    error_status, status, validate_size, Config, ConfigError, Extension, NetworkConfig, NodeId,
    PeerRequest, PhysicalPath,
};

use crate::archive::send_local_archive;
use crate::gateway::ServerError;
use crate::net::{FrameStream, TransportError};
use crate::session::{next_command, rejection_closes, Flow};
use crate::storage::{self, ReceiveError};
use crate::transfer::{remove_local_file, send_local_file};

/// Read-only settings for one peer node
#[derive(Debug, Clone)]
pub struct PeerContext {
    pub node: NodeId,
    /// Directory holding this node's `S<n>` tree
    pub root: PathBuf,
    pub network: NetworkConfig,
    pub max_file_size: u32,
}

impl PeerContext {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            node: config.peer.node_id()?,
            root: config.storage.root_dir(),
            network: config.network.clone(),
            max_file_size: config.storage.max_file_size,
        })
    }

    pub fn extension(&self) -> Extension {
        self.node.extension()
    }

    /// Validate a path the gateway sent for a file this node owns
    fn own_file(&self, raw: &str) -> Result<PhysicalPath, String> {
        let path = PhysicalPath::parse(&self.root, self.node, raw).map_err(error_status)?;
        match path.file_name() {
            Some(name) if self.extension().matches(name) => Ok(path),
            _ => Err(status::INVALID_EXTENSION.to_string()),
        }
    }

    fn own_extension(&self, token: &str) -> Option<Extension> {
        Extension::parse(token)
            .ok()
            .filter(|ext| *ext == self.extension())
    }
}

/// A peer storage node
pub struct PeerNode {
    listener: TcpListener,
    ctx: Arc<PeerContext>,
}

impl PeerNode {
    pub async fn bind(addr: SocketAddr, ctx: PeerContext) -> Result<Self, ServerError> {
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

    pub async fn serve(self) -> Result<(), ServerError> {
        info!(
            "scatter peer {} listening on {} storing {} files under {:?}",
            self.ctx.node,
            self.local_addr()?,
            self.ctx.extension(),
            node_root(&self.ctx.root, self.ctx.node)
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
                debug!("Gateway connection from {}", remote);
                let stream = FrameStream::new(socket, ctx.network.io_timeout());
                if let Err(e) = run_peer_session(stream, &ctx).await {
                    error!("Peer session error from {}: {}", remote, e);
                }
            });
        }
    }
}

/// Serve gateway commands until the connection closes
pub async fn run_peer_session<S>(
    mut client: FrameStream<S>,
    ctx: &PeerContext,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = next_command(&mut client, ctx.network.idle_timeout()).await? {
        if dispatch_peer(&mut client, ctx, &line).await? == Flow::Close {
            break;
        }
    }
    Ok(())
}

async fn dispatch_peer<S>(
    client: &mut FrameStream<S>,
    ctx: &PeerContext,
    line: &str,
) -> Result<Flow, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match PeerRequest::parse(line) {
        Ok(request) => request,
        Err(e) => {
            client.send_text(&error_status(&e)).await?;
            return Ok(if rejection_closes(&e, line) {
                Flow::Close
            } else {
                Flow::Continue
            });
        }
    };

    debug!("{} <- {}", ctx.node, line);
    match request {
        PeerRequest::Upload { path } => return store(client, ctx, &path).await,
        PeerRequest::Remove { path } => {
            let status = match ctx.own_file(&path) {
                Ok(path) => remove_local_file(&path.to_path_buf()).await,
                Err(status) => status,
            };
            client.send_text(&status).await?;
        }
        PeerRequest::Download { path } => match ctx.own_file(&path) {
            Ok(path) => {
                send_local_file(
                    client,
                    &path.to_path_buf(),
                    None,
                    status::FILE_READY,
                    ctx.max_file_size,
                )
                .await?
            }
            Err(status) => client.send_text(&status).await?,
        },
        PeerRequest::Archive { extension } => match ctx.own_extension(&extension) {
            Some(ext) => {
                let tree = node_root(&ctx.root, ctx.node);
                send_local_archive(client, &tree, ext, ctx.max_file_size).await?
            }
            None => client.send_text(status::UNSUPPORTED_EXTENSION).await?,
        },
        PeerRequest::ListNames { dir, extension } => {
            list(client, ctx, &dir, &extension).await?
        }
    }
    Ok(Flow::Continue)
}

/// `uploadf <phys>` followed by size and payload
async fn store<S>(
    client: &mut FrameStream<S>,
    ctx: &PeerContext,
    raw: &str,
) -> Result<Flow, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let size = client.recv_size().await?;
    if validate_size(size, ctx.max_file_size).is_err() {
        client.send_text(status::INVALID_SIZE).await?;
        return Ok(Flow::Close);
    }

    let path = match ctx.own_file(raw) {
        Ok(path) => path,
        Err(status) => {
            client.discard(size as u64).await?;
            client.send_text(&status).await?;
            return Ok(Flow::Continue);
        }
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = storage::create_dir_tree(&parent.to_path_buf()).await {
            warn!("{}", e);
            client.discard(size as u64).await?;
            client.send_text(status::DIR_CREATE_FAILED).await?;
            return Ok(Flow::Continue);
        }
    }

    let status = match storage::receive_to_file(client, &path.to_path_buf(), size).await {
        Ok(()) => {
            info!("Stored {} ({} bytes)", path, size);
            status::UPLOADED.to_string()
        }
        Err(ReceiveError::Storage(e)) => {
            warn!("{}", e);
            error_status("Failed to write file on server")
        }
        Err(ReceiveError::Transport(e)) => return Err(e),
    };
    client.send_text(&status).await?;
    Ok(Flow::Continue)
}

/// `dispfnames <dir> <ext>`
async fn list<S>(
    client: &mut FrameStream<S>,
    ctx: &PeerContext,
    raw_dir: &str,
    token: &str,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(ext) = ctx.own_extension(token) else {
        return client.send_text(status::UNSUPPORTED_EXTENSION).await;
    };
    let dir = match PhysicalPath::parse(&ctx.root, ctx.node, raw_dir) {
        Ok(dir) => dir,
        Err(e) => return client.send_text(&error_status(e)).await,
    };

    let names = storage::list_names(&dir.to_path_buf(), ext).await;
    let blob = storage::join_names(&names);
    client.send_text(status::NAMES_READY).await?;
    client.send_size(blob.len() as u32).await?;
    client.send_all(&blob).await
}
