use crate::networking::messages::{Request, RequestType, ResponseType};
use crate::peer::node::PeerNode;
use crate::peer::PeerError;
use log::{info, warn};
use std::sync::Arc;

///
/// # Router for requests arriving at a peer.
///
/// Peers answer downloads from other peers and stale-refresh notifications from the coordinator.
/// Registry requests are not served here.
///
pub async fn handle_received_request(node: Arc<PeerNode>, request: Request) -> ResponseType {
    info!("Received request: {}", request);

    match request.request_type {
        RequestType::DownloadFile { file } => {
            let content = node.serve_download(&file).await;
            if content.is_none() {
                info!("Nothing to serve for {} requested by {}", file, request.sender);
            }
            ResponseType::Download { content }
        }
        RequestType::StaleRefresh { file } => handle_stale_refresh(&node, &file).await,
        other => {
            warn!("Peer {} does not serve {}", node.info().name, other);
            ResponseType::Unsupported
        }
    }
}

async fn handle_stale_refresh(node: &PeerNode, file: &str) -> ResponseType {
    match node.refresh_cached(file).await {
        Ok(()) => ResponseType::Ack { ok: true },
        Err(PeerError::PreconditionMissing(_)) => {
            info!("Ignoring refresh of {}, no cached copy here", file);
            ResponseType::Ack { ok: false }
        }
        Err(e) => {
            warn!("Refresh of {} failed: {}", file, e);
            ResponseType::Ack { ok: false }
        }
    }
}
