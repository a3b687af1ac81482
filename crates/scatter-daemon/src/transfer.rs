//! Download and remove pipelines
//!
//! Each requested path gets its own complete response before the next path is
//! looked at, so one bad path never disturbs the framing of its siblings.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use scatter_core::{error_status, route, status, LogicalPath, PhysicalPath, Route};

use crate::gateway::GatewayContext;
use crate::net::{FrameStream, TransportError};
use crate::peer_link::PeerResponse;
use crate::storage;

/// Send a file from local disk: `status`, optional `name`, size, payload
///
/// A missing file, a non-regular file or one over `max_size` is answered with
/// an error status instead.
pub async fn send_local_file<S>(
    client: &mut FrameStream<S>,
    path: &Path,
    name: Option<&str>,
    ready_status: &str,
    max_size: u32,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let opened = match tokio::fs::File::open(path).await {
        Ok(file) => match file.metadata().await {
            Ok(meta) if meta.is_file() => Some((file, meta.len())),
            _ => None,
        },
        Err(_) => None,
    };
    let Some((mut file, size)) = opened else {
        debug!("{:?} not found", path);
        return client.send_text(status::NOT_FOUND).await;
    };

    if size == 0 || size > max_size as u64 {
        warn!("Refusing to send {:?}: {} bytes", path, size);
        return client.send_text(status::INVALID_SIZE).await;
    }

    client.send_text(ready_status).await?;
    if let Some(name) = name {
        client.send_text(name).await?;
    }
    client.send_size(size as u32).await?;
    client.send_from(&mut file, size).await
}

/// Delete a local file, reporting the outcome as a status line
pub async fn remove_local_file(path: &Path) -> String {
    if storage::regular_file_size(path).await.is_none() {
        return status::NOT_FOUND.to_string();
    }
    match storage::remove_file(path).await {
        Ok(()) => status::REMOVED.to_string(),
        Err(e) => {
            warn!("{}", e);
            error_status("Failed to remove file")
        }
    }
}

/// Resolve and route a client path, or produce the status that rejects it
fn resolve(ctx: &GatewayContext, raw: &str) -> Result<(PhysicalPath, Route), String> {
    let logical = LogicalPath::parse(raw).map_err(error_status)?;
    let local = logical.resolve(&ctx.root);
    let route = route(&local).map_err(|e| {
        debug!("{}: {}", raw, e);
        status::INVALID_EXTENSION.to_string()
    })?;
    Ok((local, route))
}

/// `downlf <path1> [path2]`
pub async fn handle_download<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    paths: &[String],
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for raw in paths {
        download_one(client, ctx, raw).await?;
    }
    Ok(())
}

async fn download_one<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    raw: &str,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (local, route) = match resolve(ctx, raw) {
        Ok(resolved) => resolved,
        Err(status) => return client.send_text(&status).await,
    };
    let name = local.file_name().unwrap_or_default().to_string();

    if route.node.is_local() {
        return send_local_file(
            client,
            &local.to_path_buf(),
            Some(name.as_str()),
            status::FILE_READY,
            ctx.max_file_size,
        )
        .await;
    }

    match ctx.link().fetch(&route.path).await {
        Ok(PeerResponse::Ready(payload)) => {
            client.send_text(status::PEER_FILE_READY).await?;
            client.send_text(&name).await?;
            client.send_size(payload.size).await?;
            payload.relay_to(client).await
        }
        Ok(PeerResponse::Refused(status)) => client.send_text(&status).await,
        Err(e) => {
            warn!("Fetching {} from {} failed: {}", raw, route.node, e);
            client
                .send_text(&error_status(format!(
                    "Failed to retrieve file from {}",
                    route.node
                )))
                .await
        }
    }
}

/// `removef <path1> [path2]`
pub async fn handle_remove<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    paths: &[String],
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for raw in paths {
        let status = remove_one(ctx, raw).await;
        client.send_text(&status).await?;
    }
    Ok(())
}

async fn remove_one(ctx: &GatewayContext, raw: &str) -> String {
    let (local, route) = match resolve(ctx, raw) {
        Ok(resolved) => resolved,
        Err(status) => return status,
    };

    if route.node.is_local() {
        return remove_local_file(&local.to_path_buf()).await;
    }

    match ctx.link().remove(&route.path).await {
        Ok(status) => status,
        Err(e) => {
            warn!("Removing {} on {} failed: {}", raw, route.node, e);
            error_status(format!("Failed to remove file from {}", route.node))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatter_core::{NetworkConfig, PeerDirectory, DEFAULT_MAX_FILE_SIZE};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::DuplexStream;

    fn context(root: &Path) -> GatewayContext {
        // Peers point at a port nobody listens on
        let dead = "127.0.0.1:1".parse().unwrap();
        GatewayContext {
            root: root.to_path_buf(),
            peers: PeerDirectory {
                s2: dead,
                s3: dead,
                s4: dead,
            },
            network: NetworkConfig {
                connect_timeout_secs: 2,
                ..NetworkConfig::default()
            },
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    fn pair() -> (FrameStream<DuplexStream>, FrameStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            FrameStream::new(a, Duration::from_secs(5)),
            FrameStream::new(b, Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn test_download_local_then_missing() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("S1/src")).unwrap();
        std::fs::write(temp.path().join("S1/src/a.c"), b"int x;").unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        let paths = vec!["~S1/src/a.c".to_string(), "~S1/src/gone.c".to_string()];
        handle_download(&mut server, &ctx, &paths).await.unwrap();

        assert_eq!(client.recv_text().await.unwrap(), status::FILE_READY);
        assert_eq!(client.recv_text().await.unwrap(), "a.c");
        let size = client.recv_size().await.unwrap();
        assert_eq!(client.recv_all(size as usize).await.unwrap(), b"int x;");
        assert_eq!(client.recv_text().await.unwrap(), status::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_rejects_before_io() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        let paths = vec!["~S1/a.exe".to_string(), "/etc/passwd.c".to_string()];
        handle_download(&mut server, &ctx, &paths).await.unwrap();

        assert_eq!(client.recv_text().await.unwrap(), status::INVALID_EXTENSION);
        assert!(client.recv_text().await.unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_download_unreachable_peer_keeps_going() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("S1")).unwrap();
        std::fs::write(temp.path().join("S1/a.c"), b"c").unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        let paths = vec!["~S1/b.pdf".to_string(), "~S1/a.c".to_string()];
        handle_download(&mut server, &ctx, &paths).await.unwrap();

        assert_eq!(
            client.recv_text().await.unwrap(),
            "Error: Failed to retrieve file from S2"
        );
        assert_eq!(client.recv_text().await.unwrap(), status::FILE_READY);
    }

    #[tokio::test]
    async fn test_remove_local() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("S1")).unwrap();
        std::fs::write(temp.path().join("S1/a.c"), b"c").unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        let paths = vec!["~S1/a.c".to_string(), "~S1/a.c".to_string()];
        handle_remove(&mut server, &ctx, &paths).await.unwrap();

        assert_eq!(client.recv_text().await.unwrap(), status::REMOVED);
        assert_eq!(client.recv_text().await.unwrap(), status::NOT_FOUND);
        assert!(!temp.path().join("S1/a.c").exists());
    }

    #[tokio::test]
    async fn test_remove_directory_is_not_a_file() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("S1/dir.c")).unwrap();
        assert_eq!(
            remove_local_file(&temp.path().join("S1/dir.c")).await,
            status::NOT_FOUND
        );
    }
}
