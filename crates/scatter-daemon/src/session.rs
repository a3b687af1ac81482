//! Per-connection command loop on the gateway

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use scatter_core::{error_status, tokenize, CommandError, GatewayRequest, Verb};

use crate::archive::handle_archive;
use crate::gateway::GatewayContext;
use crate::names::handle_list_names;
use crate::net::{FrameStream, TransportError};
use crate::transfer::{handle_download, handle_remove};
use crate::upload::handle_upload;

/// Whether a session keeps reading commands after the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Whether a rejected command line leaves the stream in an unknown state
///
/// Besides over-long lines, a malformed upload may already be followed by
/// payload bytes that cannot be accounted for.
pub fn rejection_closes(error: &CommandError, line: &str) -> bool {
    if error.is_fatal() {
        return true;
    }
    tokenize(line)
        .ok()
        .and_then(|tokens| Verb::parse(tokens[0]).ok())
        == Some(Verb::Upload)
}

/// Read one command line, waiting at most `idle` for it to start
///
/// `Ok(None)` means the client went away between commands.
pub async fn next_command<S>(
    client: &mut FrameStream<S>,
    idle: Duration,
) -> Result<Option<String>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match client.recv_text_within(idle).await {
        Ok(line) => Ok(Some(line)),
        Err(e) if e.is_closed() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Serve commands until the client leaves or the stream becomes unusable
pub async fn run_session<S>(
    mut client: FrameStream<S>,
    ctx: &GatewayContext,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = next_command(&mut client, ctx.network.idle_timeout()).await? {
        if dispatch(&mut client, ctx, &line).await? == Flow::Close {
            info!("Closing session after {:?}", line);
            break;
        }
    }
    debug!("Session ended");
    Ok(())
}

/// Run one command line to completion
pub async fn dispatch<S>(
    client: &mut FrameStream<S>,
    ctx: &GatewayContext,
    line: &str,
) -> Result<Flow, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match GatewayRequest::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected {:?}: {}", line, e);
            client.send_text(&error_status(&e)).await?;
            return Ok(if rejection_closes(&e, line) {
                Flow::Close
            } else {
                Flow::Continue
            });
        }
    };

    debug!("<- {}", request.to_line());
    match request {
        GatewayRequest::Upload { files, dest } => handle_upload(client, ctx, &files, &dest).await,
        GatewayRequest::Download { paths } => {
            handle_download(client, ctx, &paths).await?;
            Ok(Flow::Continue)
        }
        GatewayRequest::Remove { paths } => {
            handle_remove(client, ctx, &paths).await?;
            Ok(Flow::Continue)
        }
        GatewayRequest::Archive { extension } => {
            handle_archive(client, ctx, &extension).await?;
            Ok(Flow::Continue)
        }
        GatewayRequest::ListNames { dir } => {
            handle_list_names(client, ctx, &dir).await?;
            Ok(Flow::Continue)
        }
    }
}
