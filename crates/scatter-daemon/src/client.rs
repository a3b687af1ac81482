//! Gateway client - the client side of the client/gateway protocol

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use scatter_core::{
    is_error_status, validate_size, GatewayRequest, NetworkConfig, ValidationError,
    DEFAULT_MAX_FILE_SIZE,
};

use crate::net::{FrameStream, TransportError};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("gateway announced {0}")]
    InvalidSize(#[from] ValidationError),

    #[error("payload of {0} bytes does not fit a size field")]
    TooLarge(usize),
}

/// Outcome of one request: the gateway's success value or its `Error:` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Success(T),
    Failed(String),
}

impl<T> Reply<T> {
    pub fn success(self) -> Option<T> {
        match self {
            Reply::Success(value) => Some(value),
            Reply::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }
}

/// A file or archive received from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub status: String,
    pub name: String,
    pub data: Vec<u8>,
}

/// Connection to a scatter gateway
pub struct GatewayClient<S = TcpStream> {
    stream: FrameStream<S>,
    max_size: u32,
}

impl GatewayClient<TcpStream> {
    pub async fn connect(addr: SocketAddr, network: &NetworkConfig) -> Result<Self, ClientError> {
        let stream =
            FrameStream::connect(addr, network.connect_timeout(), network.io_timeout()).await?;
        Ok(Self::new(stream))
    }
}

impl<S> GatewayClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: FrameStream<S>) -> Self {
        Self {
            stream,
            max_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Largest payload accepted from the gateway
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    /// Raw access, for sending lines the typed methods would never produce
    pub fn stream_mut(&mut self) -> &mut FrameStream<S> {
        &mut self.stream
    }

    async fn send_request(&mut self, request: &GatewayRequest) -> Result<(), ClientError> {
        let line = request.to_line();
        debug!("-> {}", line);
        self.stream.send_text(&line).await?;
        Ok(())
    }

    /// Status, then name, size and payload unless the status is an error
    async fn recv_file(&mut self) -> Result<Reply<Received>, ClientError> {
        let status = self.stream.recv_text().await?;
        if is_error_status(&status) {
            return Ok(Reply::Failed(status));
        }
        let name = self.stream.recv_text().await?;
        let size = validate_size(self.stream.recv_size().await?, self.max_size)?;
        let data = self.stream.recv_all(size as usize).await?;
        Ok(Reply::Success(Received { status, name, data }))
    }

    /// Upload `(name, contents)` pairs into `dest`; one status per file
    pub async fn upload(
        &mut self,
        files: &[(&str, &[u8])],
        dest: &str,
    ) -> Result<Vec<String>, ClientError> {
        let request = GatewayRequest::Upload {
            files: files.iter().map(|(name, _)| name.to_string()).collect(),
            dest: dest.to_string(),
        };
        self.send_request(&request).await?;

        for (_, data) in files {
            let size = u32::try_from(data.len()).map_err(|_| ClientError::TooLarge(data.len()))?;
            self.stream.send_size(size).await?;
            self.stream.send_all(data).await?;
        }

        let mut statuses = Vec::with_capacity(files.len());
        for _ in files {
            statuses.push(self.stream.recv_text().await?);
        }
        Ok(statuses)
    }

    /// Download each path; one reply per path, in order
    pub async fn download(&mut self, paths: &[&str]) -> Result<Vec<Reply<Received>>, ClientError> {
        let request = GatewayRequest::Download {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        };
        self.send_request(&request).await?;

        let mut replies = Vec::with_capacity(paths.len());
        for _ in paths {
            replies.push(self.recv_file().await?);
        }
        Ok(replies)
    }

    /// Remove each path; one status per path, in order
    pub async fn remove(&mut self, paths: &[&str]) -> Result<Vec<String>, ClientError> {
        let request = GatewayRequest::Remove {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        };
        self.send_request(&request).await?;

        let mut statuses = Vec::with_capacity(paths.len());
        for _ in paths {
            statuses.push(self.stream.recv_text().await?);
        }
        Ok(statuses)
    }

    /// Fetch the archive of every file carrying `ext`
    pub async fn archive(&mut self, ext: &str) -> Result<Reply<Received>, ClientError> {
        let request = GatewayRequest::Archive {
            extension: ext.to_string(),
        };
        self.send_request(&request).await?;
        self.recv_file().await
    }

    /// Newline-terminated names found under `dir` across all nodes
    pub async fn list_names(&mut self, dir: &str) -> Result<Reply<String>, ClientError> {
        let request = GatewayRequest::ListNames {
            dir: dir.to_string(),
        };
        self.send_request(&request).await?;

        let status = self.stream.recv_text().await?;
        if is_error_status(&status) {
            return Ok(Reply::Failed(status));
        }
        let size = self.stream.recv_size().await?;
        if size > self.max_size {
            return Err(ValidationError::InvalidSize {
                size: size as u64,
                max: self.max_size,
            }
            .into());
        }
        let blob = self.stream.recv_all(size as usize).await?;
        Ok(Reply::Success(String::from_utf8_lossy(&blob).into_owned()))
    }
}
