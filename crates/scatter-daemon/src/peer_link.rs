//! Outbound connections from the gateway to the peer nodes
//!
//! Every operation opens its own connection, sends one command line and reads
//! the peer's reply; nothing is pooled or reused across operations.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use scatter_core::{
    is_error_status, validate_size, Extension, NetworkConfig, NodeId, PeerDirectory, PeerRequest,
    PhysicalPath, ValidationError,
};

use crate::net::{FrameStream, TransportError};

/// Failures talking to a peer
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("no peer address configured for {0}")]
    NoAddress(NodeId),

    #[error("{node} unreachable at {addr}: {source}")]
    Unreachable {
        node: NodeId,
        addr: SocketAddr,
        source: TransportError,
    },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("peer announced {0}")]
    InvalidSize(#[from] ValidationError),
}

/// A peer's answer: either its `Error:` status, or a successful result
#[derive(Debug)]
pub enum PeerResponse<T> {
    Refused(String),
    Ready(T),
}

/// A payload the peer has announced but not yet sent
///
/// The connection is positioned right before the payload bytes, so the caller
/// can stream them onward without holding the whole payload.
pub struct PeerPayload {
    pub status: String,
    pub name: Option<String>,
    pub size: u32,
    stream: FrameStream<TcpStream>,
}

impl PeerPayload {
    /// Forward the payload to `to`, one chunk at a time
    pub async fn relay_to<T>(mut self, to: &mut FrameStream<T>) -> Result<(), TransportError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.stream.relay_to(to, self.size as u64).await
    }
}

impl std::fmt::Debug for PeerPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPayload")
            .field("status", &self.status)
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

/// Client side of the gateway-to-peer protocol
pub struct PeerLink<'a> {
    peers: &'a PeerDirectory,
    network: &'a NetworkConfig,
    max_size: u32,
}

impl<'a> PeerLink<'a> {
    pub fn new(peers: &'a PeerDirectory, network: &'a NetworkConfig, max_size: u32) -> Self {
        Self {
            peers,
            network,
            max_size,
        }
    }

    async fn open(
        &self,
        node: NodeId,
        request: &PeerRequest,
    ) -> Result<FrameStream<TcpStream>, PeerError> {
        let addr = self.peers.addr(node).ok_or(PeerError::NoAddress(node))?;
        let mut stream = FrameStream::connect(
            addr,
            self.network.connect_timeout(),
            self.network.io_timeout(),
        )
        .await
        .map_err(|source| PeerError::Unreachable { node, addr, source })?;

        let line = request.to_line();
        debug!("-> {} {}", node, line);
        stream.send_text(&line).await?;
        Ok(stream)
    }

    /// Push `size` bytes from `reader` to `path` on its node; returns the peer's status
    pub async fn push_file<R>(
        &self,
        path: &PhysicalPath,
        reader: &mut R,
        size: u32,
    ) -> Result<String, PeerError>
    where
        R: AsyncRead + Unpin,
    {
        let request = PeerRequest::Upload {
            path: path.to_wire(),
        };
        let mut stream = self.open(path.node(), &request).await?;
        stream.send_size(size).await?;
        stream.send_from(reader, size as u64).await?;
        Ok(stream.recv_text().await?)
    }

    /// Ask the owning node to delete `path`; returns the peer's status
    pub async fn remove(&self, path: &PhysicalPath) -> Result<String, PeerError> {
        let request = PeerRequest::Remove {
            path: path.to_wire(),
        };
        let mut stream = self.open(path.node(), &request).await?;
        Ok(stream.recv_text().await?)
    }

    /// Request a file; on success the reply is positioned before its payload
    pub async fn fetch(&self, path: &PhysicalPath) -> Result<PeerResponse<PeerPayload>, PeerError> {
        let request = PeerRequest::Download {
            path: path.to_wire(),
        };
        let mut stream = self.open(path.node(), &request).await?;

        let status = stream.recv_text().await?;
        if is_error_status(&status) {
            return Ok(PeerResponse::Refused(status));
        }
        let size = validate_size(stream.recv_size().await?, self.max_size)?;

        Ok(PeerResponse::Ready(PeerPayload {
            status,
            name: None,
            size,
            stream,
        }))
    }

    /// Ask `node` to build its archive of `ext`
    pub async fn request_archive(
        &self,
        node: NodeId,
        ext: Extension,
    ) -> Result<PeerResponse<PeerPayload>, PeerError> {
        let request = PeerRequest::Archive {
            extension: ext.to_string(),
        };
        let mut stream = self.open(node, &request).await?;

        let status = stream.recv_text().await?;
        if is_error_status(&status) {
            return Ok(PeerResponse::Refused(status));
        }
        let name = stream.recv_text().await?;
        let size = validate_size(stream.recv_size().await?, self.max_size)?;

        Ok(PeerResponse::Ready(PeerPayload {
            status,
            name: Some(name),
            size,
            stream,
        }))
    }

    /// Names of `ext` files directly inside `dir`, as a newline-joined blob
    pub async fn list_names(
        &self,
        dir: &PhysicalPath,
        ext: Extension,
    ) -> Result<PeerResponse<Vec<u8>>, PeerError> {
        let request = PeerRequest::ListNames {
            dir: dir.to_wire(),
            extension: ext.to_string(),
        };
        let mut stream = self.open(dir.node(), &request).await?;

        let status = stream.recv_text().await?;
        if is_error_status(&status) {
            return Ok(PeerResponse::Refused(status));
        }
        let size = stream.recv_size().await?;
        if size > self.max_size {
            return Err(ValidationError::InvalidSize {
                size: size as u64,
                max: self.max_size,
            }
            .into());
        }
        Ok(PeerResponse::Ready(stream.recv_all(size as usize).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::net::TcpListener;

    /// Peer directory whose S2 entry points at a one-shot scripted listener
    async fn scripted_peer<F, Fut>(script: F) -> (PeerDirectory, tokio::task::JoinHandle<()>)
    where
        F: FnOnce(FrameStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            script(FrameStream::new(socket, std::time::Duration::from_secs(5))).await;
        });
        let peers = PeerDirectory {
            s2: addr,
            ..PeerDirectory::default()
        };
        (peers, handle)
    }

    fn pdf_path() -> PhysicalPath {
        PhysicalPath::new("/home/u", NodeId::Peer2, "docs/a.pdf")
    }

    #[tokio::test]
    async fn test_push_file() {
        let (peers, peer) = scripted_peer(|mut s| async move {
            assert_eq!(s.recv_text().await.unwrap(), "uploadf /home/u/S2/docs/a.pdf");
            let size = s.recv_size().await.unwrap();
            assert_eq!(s.recv_all(size as usize).await.unwrap(), b"hello");
            s.send_text("File uploaded successfully to Server").await.unwrap();
        })
        .await;

        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        let mut reader: &[u8] = b"hello";
        let status = link.push_file(&pdf_path(), &mut reader, 5).await.unwrap();
        assert_eq!(status, "File uploaded successfully to Server");
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_refused() {
        let (peers, peer) = scripted_peer(|mut s| async move {
            s.recv_text().await.unwrap();
            s.send_text("Error: File does not exist on Server").await.unwrap();
        })
        .await;

        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        match link.fetch(&pdf_path()).await.unwrap() {
            PeerResponse::Refused(status) => {
                assert_eq!(status, "Error: File does not exist on Server")
            }
            PeerResponse::Ready(_) => panic!("expected refusal"),
        }
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_announcement() {
        let (peers, peer) = scripted_peer(|mut s| async move {
            s.recv_text().await.unwrap();
            s.send_text("Success: File found and ready to transfer").await.unwrap();
            s.send_size(4096).await.unwrap();
        })
        .await;

        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        let err = link.fetch(&pdf_path()).await.unwrap_err();
        assert!(matches!(err, PeerError::InvalidSize(_)));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_names() {
        let (peers, peer) = scripted_peer(|mut s| async move {
            assert_eq!(s.recv_text().await.unwrap(), "dispfnames /home/u/S2/docs .pdf");
            s.send_text("Success: Names ready").await.unwrap();
            s.send_size(6).await.unwrap();
            s.send_all(b"b.pdf\n").await.unwrap();
        })
        .await;

        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        let dir = PhysicalPath::new(Path::new("/home/u"), NodeId::Peer2, "docs");
        match link.list_names(&dir, Extension::Pdf).await.unwrap() {
            PeerResponse::Ready(blob) => assert_eq!(blob, b"b.pdf\n"),
            PeerResponse::Refused(status) => panic!("unexpected refusal: {}", status),
        }
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        // Bind then drop so the port is very likely closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let peers = PeerDirectory {
            s2: addr,
            ..PeerDirectory::default()
        };
        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        let err = link.remove(&pdf_path()).await.unwrap_err();
        assert!(matches!(err, PeerError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_no_address_for_local_node() {
        let peers = PeerDirectory::default();
        let network = NetworkConfig::default();
        let link = PeerLink::new(&peers, &network, 1024);
        let local = PhysicalPath::new("/home/u", NodeId::Local, "a.c");
        let err = link.remove(&local).await.unwrap_err();
        assert!(matches!(err, PeerError::NoAddress(NodeId::Local)));
    }
}
