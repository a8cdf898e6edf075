use crate::networking::message_dispatcher::{DispatchError, MessageDispatcher};
use crate::networking::messages::{FileContent, RequestType, ResponseType};
use crate::networking::node_info::NodeInfo;
use std::sync::Arc;

///
/// Typed view of the coordinator service used by peers.
///
/// `Ok(false)` style results mean the coordinator answered but did not know the peer or file.
/// Transport problems surface as `DispatchError`.
///
#[derive(Clone)]
pub struct CoordinatorClient {
    dispatcher: Arc<MessageDispatcher>,
    address: String,
}

impl CoordinatorClient {
    pub fn new(dispatcher: Arc<MessageDispatcher>, address: impl Into<String>) -> Self {
        CoordinatorClient {
            dispatcher,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn register(&self, peer: NodeInfo, files: Vec<String>) -> Result<bool, DispatchError> {
        self.ack(RequestType::Register { peer, files }).await
    }

    pub async fn heartbeat(
        &self,
        peer_id: &str,
        new_files: Vec<String>,
        deleted_files: Vec<String>,
        changed_files: Vec<String>,
    ) -> Result<bool, DispatchError> {
        self.ack(RequestType::Heartbeat {
            peer_id: peer_id.to_string(),
            new_files,
            deleted_files,
            changed_files,
        })
        .await
    }

    pub async fn list_files(&self) -> Result<Vec<String>, DispatchError> {
        match self
            .dispatcher
            .send_request(&self.address, RequestType::ListFiles)
            .await?
        {
            ResponseType::Files { files } => Ok(files),
            other => Err(DispatchError::UnexpectedResponse(other)),
        }
    }

    pub async fn resolve_file_location(&self, file: &str) -> Result<Option<String>, DispatchError> {
        let request = RequestType::ResolveFileLocation {
            file: file.to_string(),
        };
        match self.dispatcher.send_request(&self.address, request).await? {
            ResponseType::Location { address } => Ok(address),
            other => Err(DispatchError::UnexpectedResponse(other)),
        }
    }

    pub async fn register_replica(&self, peer_id: &str, file: &str) -> Result<bool, DispatchError> {
        self.ack(RequestType::RegisterReplica {
            peer_id: peer_id.to_string(),
            file: file.to_string(),
        })
        .await
    }

    pub async fn deregister_replica(
        &self,
        peer_id: &str,
        file: &str,
    ) -> Result<bool, DispatchError> {
        self.ack(RequestType::DeregisterReplica {
            peer_id: peer_id.to_string(),
            file: file.to_string(),
        })
        .await
    }

    async fn ack(&self, request: RequestType) -> Result<bool, DispatchError> {
        match self.dispatcher.send_request(&self.address, request).await? {
            ResponseType::Ack { ok } => Ok(ok),
            other => Err(DispatchError::UnexpectedResponse(other)),
        }
    }
}

///
/// Typed view of the peer-to-peer service. Used by peers for downloads and by the
/// coordinator for stale-refresh fan-out.
///
#[derive(Clone)]
pub struct PeerClient {
    dispatcher: Arc<MessageDispatcher>,
}

impl PeerClient {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        PeerClient { dispatcher }
    }

    pub async fn download_file(
        &self,
        address: &str,
        file: &str,
    ) -> Result<Option<FileContent>, DispatchError> {
        let request = RequestType::DownloadFile {
            file: file.to_string(),
        };
        match self.dispatcher.send_request(address, request).await? {
            ResponseType::Download { content } => Ok(content),
            other => Err(DispatchError::UnexpectedResponse(other)),
        }
    }

    pub async fn stale_refresh(&self, address: &str, file: &str) -> Result<bool, DispatchError> {
        let request = RequestType::StaleRefresh {
            file: file.to_string(),
        };
        match self.dispatcher.send_request(address, request).await? {
            ResponseType::Ack { ok } => Ok(ok),
            other => Err(DispatchError::UnexpectedResponse(other)),
        }
    }
}
