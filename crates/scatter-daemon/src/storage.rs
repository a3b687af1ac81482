//! Local filesystem operations shared by the gateway and the peer nodes

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use scatter_core::{Extension, CHUNK_SIZE};

use crate::net::{FrameStream, TransportError};

/// Filesystem failures, reported to the requester as status lines
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to remove {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("archive build failed: {0}")]
    Archive(String),
}

/// Outcome of an operation whose failure is tolerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Done,
    Skipped(io::ErrorKind),
}

impl Cleanup {
    fn from_result(what: &str, path: &Path, result: io::Result<()>) -> Self {
        match result {
            Ok(()) => Cleanup::Done,
            Err(e) => {
                debug!("{} {:?} skipped: {}", what, path, e);
                Cleanup::Skipped(e.kind())
            }
        }
    }
}

/// Remove a directory if it is empty; anything else leaves it in place
pub async fn remove_dir_best_effort(path: &Path) -> Cleanup {
    Cleanup::from_result("rmdir", path, fs::remove_dir(path).await)
}

/// Remove a file if present; failures are only logged
pub async fn remove_file_best_effort(path: &Path) -> Cleanup {
    Cleanup::from_result("unlink", path, fs::remove_file(path).await)
}

/// Create `path` and all its parents; an existing directory is fine
pub async fn create_dir_tree(path: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| StorageError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Size of a regular file, or `None` if nothing readable is there
pub async fn regular_file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

pub async fn remove_file(path: &Path) -> Result<(), StorageError> {
    fs::remove_file(path)
        .await
        .map_err(|source| StorageError::Remove {
            path: path.to_path_buf(),
            source,
        })
}

/// Failure while landing a payload on disk
#[derive(Error, Debug)]
pub enum ReceiveError {
    /// The sending connection failed; it is out of step and must be dropped
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The disk failed; the payload was drained so the connection is still usable
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Receive `size` payload bytes from `stream` straight into the file at `path`
///
/// The file is created or truncated. On any failure the partial file is
/// removed, so a file is either complete or absent.
pub async fn receive_to_file<S>(
    stream: &mut FrameStream<S>,
    path: &Path,
    size: u32,
) -> Result<(), ReceiveError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut file = match fs::File::create(path).await {
        Ok(file) => file,
        Err(source) => {
            stream.discard(size as u64).await?;
            return Err(StorageError::Write {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = size as u64;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let read = match stream.recv_some(&mut buf[..want]).await {
            Ok(read) => read,
            Err(e) => {
                drop(file);
                remove_file_best_effort(path).await;
                return Err(e.into());
            }
        };
        remaining -= read as u64;

        if let Err(source) = file.write_all(&buf[..read]).await {
            drop(file);
            remove_file_best_effort(path).await;
            stream.discard(remaining).await?;
            return Err(StorageError::Write {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    }

    if let Err(source) = file.flush().await {
        drop(file);
        remove_file_best_effort(path).await;
        return Err(StorageError::Write {
            path: path.to_path_buf(),
            source,
        }
        .into());
    }

    Ok(())
}

/// Sorted names of regular files in `dir` carrying `ext` (non-recursive)
///
/// A missing or unreadable directory lists as empty.
pub async fn list_names(dir: &Path, ext: Extension) -> Vec<String> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("listing {:?} as empty: {}", dir, e);
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading directory {:?}: {}", dir, e);
                break;
            }
        };

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !ext.matches(&name) {
            continue;
        }
        if regular_file_size(&entry.path()).await.is_some() {
            names.push(name);
        }
    }

    names.sort();
    names
}

/// Newline-terminated concatenation of `names`
pub fn join_names(names: &[String]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(names.iter().map(|n| n.len() + 1).sum());
    for name in names {
        blob.extend_from_slice(name.as_bytes());
        blob.push(b'\n');
    }
    blob
}
