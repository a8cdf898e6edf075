use crate::coordinator::registry::{RefreshTarget, Registry};
use crate::networking::clients::PeerClient;
use crate::networking::messages::{Request, RequestType, ResponseType};
use crate::networking::node_info::NodeInfo;
use crate::storage::file_store::validate_file_name;
use futures::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

///
/// # Router for requests arriving at the coordinator.
///
/// Called on its own task for each incoming connection. Mutations take the registry's write lock,
/// lookups take the read lock. No lock is held while talking to peers.
///
pub async fn handle_received_request(
    request: Request,
    registry: Arc<RwLock<Registry>>,
    peer_client: PeerClient,
) -> ResponseType {
    info!("Received request: {}", request);

    match request.request_type {
        RequestType::Register { peer, files } => handle_register(peer, files, registry).await,
        RequestType::Heartbeat {
            peer_id,
            new_files,
            deleted_files,
            changed_files,
        } => {
            handle_heartbeat(
                peer_id,
                new_files,
                deleted_files,
                changed_files,
                registry,
                peer_client,
            )
            .await
        }
        RequestType::ListFiles => {
            let files = registry.read().await.list_files();
            ResponseType::Files { files }
        }
        RequestType::ResolveFileLocation { file } => {
            let address = registry.read().await.resolve(&file);
            if address.is_none() {
                info!("No holder known for {}", file);
            }
            ResponseType::Location { address }
        }
        RequestType::RegisterReplica { peer_id, file } => {
            let result = registry.write().await.register_replica(&peer_id, &file);
            if let Err(e) = &result {
                warn!("Unable to add {} as holder of {}: {}", peer_id, file, e);
            }
            ResponseType::Ack { ok: result.is_ok() }
        }
        RequestType::DeregisterReplica { peer_id, file } => {
            let result = registry.write().await.deregister_replica(&peer_id, &file);
            if let Err(e) = &result {
                warn!("Unable to remove {} as holder of {}: {}", peer_id, file, e);
            }
            ResponseType::Ack { ok: result.is_ok() }
        }
        other @ (RequestType::DownloadFile { .. } | RequestType::StaleRefresh { .. }) => {
            warn!("Coordinator does not serve {}", other);
            ResponseType::Unsupported
        }
    }
}

///
/// Handles `REGISTER` requests. Names that cannot denote a shared file are dropped.
///
async fn handle_register(
    peer: NodeInfo,
    files: Vec<String>,
    registry: Arc<RwLock<Registry>>,
) -> ResponseType {
    let files = valid_names(files);
    registry.write().await.register(&peer, &files);
    info!("Peer {} joined with {} files", peer, files.len());
    ResponseType::Ack { ok: true }
}

///
/// Handles `HEARTBEAT` requests.
///
/// The registry is updated under the write lock. The stale-refresh fan-out for changed files runs
/// on its own task once the lock is released, so the reporting peer is answered without waiting
/// for other holders.
///
async fn handle_heartbeat(
    peer_id: String,
    new_files: Vec<String>,
    deleted_files: Vec<String>,
    changed_files: Vec<String>,
    registry: Arc<RwLock<Registry>>,
    peer_client: PeerClient,
) -> ResponseType {
    let new_files = valid_names(new_files);
    let result = registry
        .write()
        .await
        .heartbeat(&peer_id, &new_files, &deleted_files, &changed_files);

    let targets = match result {
        Ok(targets) => targets,
        Err(e) => {
            warn!("Rejected heartbeat: {}", e);
            return ResponseType::Ack { ok: false };
        }
    };

    if !targets.is_empty() {
        tokio::spawn(fan_out_stale_refresh(targets, peer_client));
    }
    ResponseType::Ack { ok: true }
}

///
/// Sends `STALE_REFRESH` to every target concurrently. Failures are logged and do not affect the
/// other targets.
///
async fn fan_out_stale_refresh(targets: Vec<RefreshTarget>, peer_client: PeerClient) {
    let peer_client = &peer_client;
    let calls = targets.iter().map(|target| async move {
        let result = peer_client.stale_refresh(&target.address, &target.file).await;
        (target, result)
    });

    for (target, result) in join_all(calls).await {
        match result {
            Ok(true) => info!("{} refreshed {}", target.peer_id, target.file),
            Ok(false) => warn!(
                "{} could not refresh its copy of {}",
                target.peer_id, target.file
            ),
            Err(e) => error!(
                "Failed to send STALE_REFRESH for {} to {}: {}",
                target.file, target.peer_id, e
            ),
        }
    }
}

fn valid_names(files: Vec<String>) -> Vec<String> {
    files
        .into_iter()
        .filter(|file| match validate_file_name(file) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring file: {}", e);
                false
            }
        })
        .collect()
}
