//! Archive export
//!
//! The node that owns an extension bundles every matching file under its tree
//! into one tar. The gateway builds `.c` archives itself and proxies the rest
//! from the owning peer, streaming them through without buffering.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use scatter_core::{error_status, place, status, Extension, NodeId};

use crate::gateway::GatewayContext;
use crate::net::{FrameStream, TransportError};
use crate::peer_link::PeerResponse;
use crate::storage::StorageError;

/// A finished archive on local disk, deleted when dropped
pub struct BuiltArchive {
    file: NamedTempFile,
    pub entries: usize,
    pub size: u64,
}

impl BuiltArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Collect every regular file named `*<ext>` under `tree`, sorted, relative to `tree`
fn collect_entries(tree: &Path, ext: Extension) -> Vec<(PathBuf, PathBuf)> {
    WalkDir::new(tree)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| ext.matches(name))
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(tree).ok()?.to_path_buf();
            Some((entry.path().to_path_buf(), relative))
        })
        .collect()
}

fn write_archive(tree: &Path, ext: Extension) -> Result<Option<BuiltArchive>, StorageError> {
    let entries = collect_entries(tree, ext);
    if entries.is_empty() {
        return Ok(None);
    }

    let mut file = NamedTempFile::new().map_err(|e| StorageError::Archive(e.to_string()))?;
    {
        let mut builder = tar::Builder::new(file.as_file_mut());
        builder.mode(tar::HeaderMode::Deterministic);
        for (source, relative) in &entries {
            builder
                .append_path_with_name(source, relative)
                .map_err(|e| StorageError::Archive(format!("{:?}: {}", source, e)))?;
        }
        builder
            .finish()
            .map_err(|e| StorageError::Archive(e.to_string()))?;
    }

    let size = file
        .as_file()
        .metadata()
        .map_err(|e| StorageError::Archive(e.to_string()))?
        .len();

    Ok(Some(BuiltArchive {
        file,
        entries: entries.len(),
        size,
    }))
}

/// Build the archive of `ext` files under `tree` on a blocking thread
///
/// `Ok(None)` means no file matched.
pub async fn build_archive(
    tree: PathBuf,
    ext: Extension,
) -> Result<Option<BuiltArchive>, StorageError> {
    tokio::task::spawn_blocking(move || write_archive(&tree, ext))
        .await
        .map_err(|e| StorageError::Archive(format!("archive task failed: {}", e)))?
}

/// Build and send a node's own archive: status, name, size, payload
///
/// Build failures become error statuses; the temporary artifact is gone once
/// this returns, whatever the outcome.
pub async fn send_local_archive<S>(
    client: &mut FrameStream<S>,
    tree: &Path,
    ext: Extension,
    max_size: u32,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(name) = ext.archive_name() else {
        return client.send_text(status::UNSUPPORTED_EXTENSION).await;
    };

    let archive = match build_archive(tree.to_path_buf(), ext).await {
        Ok(Some(archive)) => archive,
        Ok(None) => return client.send_text(status::NO_FILES).await,
        Err(e) => {
            warn!("Archive of {} under {:?} failed: {}", ext, tree, e);
            return client.send_text(&error_status("Failed to create tar file")).await;
        }
    };

    if archive.size > max_size as u64 {
        warn!("Archive of {} is {} bytes, over the {} byte limit", ext, archive.size, max_size);
        return client.send_text(&error_status("Archive too large")).await;
    }

    let mut file = match tokio::fs::File::open(archive.path()).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot reopen archive {:?}: {}", archive.path(), e);
            return client.send_text(&error_status("Failed to open tar file")).await;
        }
    };

    info!("Sending {} ({} files, {} bytes)", name, archive.entries, archive.size);
    client.send_text(status::TAR_READY).await?;
    client.send_text(name).await?;
    client.send_size(archive.size as u32).await?;
    client.send_from(&mut file, archive.size).await
}

/// `downltar <ext>` on the gateway
pub async fn handle_archive<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    token: &str,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ext = match Extension::parse(token) {
        Ok(ext) if ext.archive_name().is_some() => ext,
        _ => return client.send_text(status::UNSUPPORTED_EXTENSION).await,
    };

    let node = place(ext);
    if node == NodeId::Local {
        let tree = scatter_core::path::node_root(&ctx.root, node);
        return send_local_archive(client, &tree, ext, ctx.max_file_size).await;
    }

    match ctx.link().request_archive(node, ext).await {
        Ok(PeerResponse::Ready(payload)) => {
            client.send_text(&payload.status).await?;
            client
                .send_text(payload.name.as_deref().unwrap_or_default())
                .await?;
            client.send_size(payload.size).await?;
            payload.relay_to(client).await
        }
        Ok(PeerResponse::Refused(status)) => client.send_text(&status).await,
        Err(e) => {
            warn!("Archive request to {} failed: {}", node, e);
            client
                .send_text(&error_status(format!("Failed to get tar file from {}", node)))
                .await
        }
    }
}
