//! Name aggregation across the federation

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use scatter_core::{error_status, place, status, Extension, LogicalPath, PhysicalPath};

use crate::gateway::GatewayContext;
use crate::net::{FrameStream, TransportError};
use crate::peer_link::PeerResponse;
use crate::storage;

/// Names of every placed file directly inside `dir`, grouped by extension in
/// the fixed order `.c`, `.pdf`, `.txt`, `.zip`
///
/// A node that cannot be asked, or refuses, contributes nothing.
pub async fn collect_names(ctx: &GatewayContext, dir: &PhysicalPath) -> Vec<u8> {
    let link = ctx.link();
    let mut blob = Vec::new();

    for ext in Extension::ALL {
        let node = place(ext);
        if node.is_local() {
            let names = storage::list_names(&dir.to_path_buf(), ext).await;
            blob.extend_from_slice(&storage::join_names(&names));
            continue;
        }

        match link.list_names(&dir.with_node(node), ext).await {
            Ok(PeerResponse::Ready(names)) => blob.extend_from_slice(&names),
            Ok(PeerResponse::Refused(status)) => {
                debug!("{} has no {} names: {}", node, ext, status);
            }
            Err(e) => warn!("Listing {} on {} failed: {}", ext, node, e),
        }
    }

    blob
}

/// `dispfnames <path>`
pub async fn handle_list_names<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    raw: &str,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let dir = match LogicalPath::parse(raw) {
        Ok(logical) => logical.resolve(&ctx.root),
        Err(e) => return client.send_text(&error_status(e)).await,
    };

    let blob = collect_names(ctx, &dir).await;
    if blob.len() > ctx.max_file_size as usize {
        return client.send_text(&error_status("Name list too large")).await;
    }

    client.send_text(status::NAMES_READY).await?;
    client.send_size(blob.len() as u32).await?;
    client.send_all(&blob).await
}
