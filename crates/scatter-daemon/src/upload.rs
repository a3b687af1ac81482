//! Upload pipeline
//!
//! Every file is first landed under the gateway's own tree. Files owned by a
//! peer are then pushed there and the local copy is deleted only once the peer
//! confirms; on any failure the staged copy stays where it is.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use scatter_core::path::validate_filename;
use scatter_core::{
    error_status, route, status, validate_size, LogicalPath, PhysicalPath, Route,
};

use crate::gateway::GatewayContext;
use crate::net::{FrameStream, TransportError};
use crate::session::Flow;
use crate::storage::{self, ReceiveError};

/// What happened to one file during the receive phase
enum Staged {
    /// On local disk at the route's gateway-side path
    Ready { local: PhysicalPath, route: Route, size: u32 },
    /// Already decided; this status goes to the client
    Failed(String),
}

/// `uploadf <name1> [name2] [name3] <dest>`
///
/// The client sends a size and a payload for every named file right after the
/// command line; all of them are consumed even when the command cannot succeed,
/// and exactly one status per file comes back. A rejected size or a broken
/// stream ends the command early: no statuses for the files before it, and
/// copies still waiting for a peer are removed.
pub async fn handle_upload<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    files: &[String],
    dest: &str,
) -> Result<Flow, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let dest_dir = prepare_destination(ctx, dest).await;

    let mut staged = Vec::with_capacity(files.len());
    match receive_files(client, ctx, files, &dest_dir, &mut staged).await {
        Ok(Flow::Continue) => {}
        aborted => {
            abandon(&staged).await;
            if let Ok(dir) = &dest_dir {
                storage::remove_dir_best_effort(&dir.to_path_buf()).await;
            }
            aborted?;
            client.send_text(status::INVALID_SIZE).await?;
            return Ok(Flow::Close);
        }
    }

    for outcome in staged {
        let status = match outcome {
            Staged::Ready { local, route, size } => commit(ctx, &local, &route, size).await,
            Staged::Failed(status) => status,
        };
        client.send_text(&status).await?;
    }

    if let Ok(dir) = &dest_dir {
        storage::remove_dir_best_effort(&dir.to_path_buf()).await;
    }
    Ok(Flow::Continue)
}

/// Receive phase. `Flow::Close` means a size was rejected and nothing after
/// it was read; the caller still owes the client that status.
async fn receive_files<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    files: &[String],
    dest_dir: &Result<PhysicalPath, String>,
    staged: &mut Vec<Staged>,
) -> Result<Flow, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for name in files {
        let size = client.recv_size().await?;
        if let Err(e) = validate_size(size, ctx.max_file_size) {
            warn!("Upload of {} aborted: {}", name, e);
            return Ok(Flow::Close);
        }

        let outcome = match dest_dir {
            Ok(dir) => stage_file(client, dir, name, size, staged.as_slice()).await?,
            Err(status) => {
                client.discard(size as u64).await?;
                Staged::Failed(status.clone())
            }
        };
        staged.push(outcome);
    }
    Ok(Flow::Continue)
}

/// Drop staged copies that were waiting to move to a peer
async fn abandon(staged: &[Staged]) {
    for outcome in staged {
        if let Staged::Ready { local, route, .. } = outcome {
            if !route.node.is_local() {
                discard_staged(&local.to_path_buf()).await;
            }
        }
    }
}

/// Resolve the destination and create it on the gateway
async fn prepare_destination(ctx: &GatewayContext, dest: &str) -> Result<PhysicalPath, String> {
    let logical = LogicalPath::parse(dest).map_err(error_status)?;
    let dir = logical.resolve(&ctx.root);
    storage::create_dir_tree(&dir.to_path_buf())
        .await
        .map_err(|e| {
            warn!("{}", e);
            status::DIR_CREATE_FAILED.to_string()
        })?;
    Ok(dir)
}

/// Receive one payload into the destination directory
async fn stage_file<S>(
    client: &mut FrameStream<S>,
    dir: &PhysicalPath,
    name: &str,
    size: u32,
    earlier: &[Staged],
) -> Result<Staged, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let base = name.rsplit('/').next().unwrap_or(name);
    if let Err(e) = validate_filename(base) {
        client.discard(size as u64).await?;
        return Ok(Staged::Failed(error_status(e)));
    }

    let local = dir.join(base);
    let taken = earlier
        .iter()
        .any(|seen| matches!(seen, Staged::Ready { local: other, .. } if *other == local));
    if taken {
        debug!("{} named twice in one upload", base);
        client.discard(size as u64).await?;
        return Ok(Staged::Failed(error_status(format!(
            "Duplicate file name {} in upload",
            base
        ))));
    }

    let route = match route(&local) {
        Ok(route) => route,
        Err(e) => {
            debug!("{}: {}", name, e);
            client.discard(size as u64).await?;
            return Ok(Staged::Failed(status::INVALID_EXTENSION.to_string()));
        }
    };

    match storage::receive_to_file(client, &local.to_path_buf(), size).await {
        Ok(()) => {
            debug!("Staged {} ({} bytes) at {}", base, size, local);
            Ok(Staged::Ready { local, route, size })
        }
        Err(ReceiveError::Storage(e)) => {
            warn!("{}", e);
            Ok(Staged::Failed(error_status("Failed to write file on server")))
        }
        Err(ReceiveError::Transport(e)) => Err(e),
    }
}

/// Leave a local file in place or migrate it to its owning peer
async fn commit(ctx: &GatewayContext, local: &PhysicalPath, route: &Route, size: u32) -> String {
    if route.node.is_local() {
        info!("Stored {}", local);
        return status::UPLOADED.to_string();
    }

    let local_path = local.to_path_buf();
    let mut file = match tokio::fs::File::open(&local_path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot reopen staged {:?}: {}", local_path, e);
            return error_status("Failed to read staged file");
        }
    };

    let pushed = ctx.link().push_file(&route.path, &mut file, size).await;
    drop(file);
    match pushed {
        Ok(status) if !scatter_core::is_error_status(&status) => {
            discard_staged(&local_path).await;
            info!("Moved {} to {}", local, route.path);
            status
        }
        Ok(status) => {
            warn!("{} refused {}: {}", route.node, route.path, status);
            status
        }
        Err(e) => {
            warn!("Push of {} to {} failed: {}", local, route.node, e);
            error_status(format!("Failed to transfer file to {}", route.node))
        }
    }
}

async fn discard_staged(path: &Path) {
    if let storage::Cleanup::Skipped(kind) = storage::remove_file_best_effort(path).await {
        warn!("Staged copy {:?} left behind: {:?}", path, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatter_core::{NetworkConfig, PeerDirectory};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::DuplexStream;

    fn context(root: &Path) -> GatewayContext {
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
            max_file_size: 1024,
        }
    }

    fn pair() -> (FrameStream<DuplexStream>, FrameStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            FrameStream::new(a, Duration::from_secs(5)),
            FrameStream::new(b, Duration::from_secs(5)),
        )
    }

    async fn send_file(client: &mut FrameStream<DuplexStream>, data: &[u8]) {
        client.send_size(data.len() as u32).await.unwrap();
        client.send_all(data).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_local_file() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"int main;").await;
        let flow = handle_upload(&mut server, &ctx, &["main.c".to_string()], "~S1/src")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(client.recv_text().await.unwrap(), status::UPLOADED);
        assert_eq!(
            std::fs::read(temp.path().join("S1/src/main.c")).unwrap(),
            b"int main;"
        );
    }

    #[tokio::test]
    async fn test_failed_push_keeps_staged_copy() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"report").await;
        send_file(&mut client, b"bad").await;
        let files = vec!["r.pdf".to_string(), "x.exe".to_string()];
        handle_upload(&mut server, &ctx, &files, "~S1/docs").await.unwrap();

        assert_eq!(
            client.recv_text().await.unwrap(),
            "Error: Failed to transfer file to S2"
        );
        assert_eq!(client.recv_text().await.unwrap(), status::INVALID_EXTENSION);
        assert_eq!(std::fs::read(temp.path().join("S1/docs/r.pdf")).unwrap(), b"report");
        assert!(!temp.path().join("S1/docs/x.exe").exists());
    }

    #[tokio::test]
    async fn test_bad_destination_drains_every_file() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"one").await;
        send_file(&mut client, b"two").await;
        let files = vec!["a.c".to_string(), "b.c".to_string()];
        let flow = handle_upload(&mut server, &ctx, &files, "/tmp/elsewhere")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        let first = client.recv_text().await.unwrap();
        assert!(first.starts_with("Error:"));
        assert_eq!(client.recv_text().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_invalid_size_closes_session() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        client.send_size(4096).await.unwrap();
        let flow = handle_upload(&mut server, &ctx, &["big.c".to_string()], "~S1")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Close);
        assert_eq!(client.recv_text().await.unwrap(), status::INVALID_SIZE);
        assert!(!temp.path().join("S1/big.c").exists());
    }

    #[tokio::test]
    async fn test_client_disconnect_mid_payload() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        client.send_size(100).await.unwrap();
        client.send_all(&[1u8; 10]).await.unwrap();
        drop(client);

        let result = handle_upload(&mut server, &ctx, &["a.c".to_string()], "~S1").await;
        assert!(result.is_err());
        assert!(!temp.path().join("S1/a.c").exists());
    }

    #[tokio::test]
    async fn test_repeated_name_keeps_first_payload() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"first").await;
        send_file(&mut client, b"second").await;
        let files = vec!["x.c".to_string(), "nested/x.c".to_string()];
        handle_upload(&mut server, &ctx, &files, "~S1/dup").await.unwrap();

        assert_eq!(client.recv_text().await.unwrap(), status::UPLOADED);
        assert_eq!(
            client.recv_text().await.unwrap(),
            "Error: Duplicate file name x.c in upload"
        );
        assert_eq!(std::fs::read(temp.path().join("S1/dup/x.c")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_invalid_size_stops_remaining_files() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"report").await;
        client.send_size(0).await.unwrap();
        send_file(&mut client, b"never read").await;
        let files = vec!["a.pdf".to_string(), "b.c".to_string(), "c.c".to_string()];
        let flow = handle_upload(&mut server, &ctx, &files, "~S1/docs")
            .await
            .unwrap();
        drop(server);

        assert_eq!(flow, Flow::Close);
        assert_eq!(client.recv_text().await.unwrap(), status::INVALID_SIZE);
        assert!(client.recv_text().await.unwrap_err().is_closed());
        assert!(!temp.path().join("S1/docs/a.pdf").exists());
        assert!(!temp.path().join("S1/docs/c.c").exists());
        assert!(!temp.path().join("S1/docs").exists());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_local_and_drops_pending_copies() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let (mut server, mut client) = pair();

        send_file(&mut client, b"kept").await;
        send_file(&mut client, b"pending").await;
        client.send_size(100).await.unwrap();
        client.send_all(&[7u8; 10]).await.unwrap();
        drop(client);

        let files = vec!["keep.c".to_string(), "a.pdf".to_string(), "b.txt".to_string()];
        let result = handle_upload(&mut server, &ctx, &files, "~S1/mix").await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(temp.path().join("S1/mix/keep.c")).unwrap(), b"kept");
        assert!(!temp.path().join("S1/mix/a.pdf").exists());
        assert!(!temp.path().join("S1/mix/b.txt").exists());
    }
}
