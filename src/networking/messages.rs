use crate::constants::MAX_MESSAGE_SIZE_MB;
use crate::networking::node_info::NodeInfo;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Upper bound for a serialized request or response, and the most a single connection buffers.
pub const MAX_MESSAGE_SIZE: usize = MAX_MESSAGE_SIZE_MB * 1024 * 1024;

/// RequestId type is used to identify request-response pairs. Currently, it is just type alias to Uuid.
pub type RequestId = Uuid;

/// Request type enum
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum RequestType {
    /// `Register` announces a peer joining the cluster together with the files it owns.
    Register { peer: NodeInfo, files: Vec<String> },
    /// `Heartbeat` reports the differences found by a peer's sync tick.
    Heartbeat {
        peer_id: String,
        new_files: Vec<String>,
        deleted_files: Vec<String>,
        changed_files: Vec<String>,
    },
    /// `ListFiles` asks the coordinator for every known file name.
    ListFiles,
    /// `ResolveFileLocation` asks the coordinator for the address of one holder of `file`.
    ResolveFileLocation { file: String },
    /// `RegisterReplica` adds `peer_id` to the holders of `file`.
    RegisterReplica { peer_id: String, file: String },
    /// `DeregisterReplica` removes `peer_id` from the holders of `file`.
    DeregisterReplica { peer_id: String, file: String },
    /// `DownloadFile` asks a peer for the current bytes of `file`.
    DownloadFile { file: String },
    /// `StaleRefresh` instructs a peer to re-download its cached copy of `file`.
    StaleRefresh { file: String },
}

/// Bytes of a file together with the address of the peer owning it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FileContent {
    #[serde(with = "hex")]
    pub data: Vec<u8>,
    pub origin: String,
}

/// Response type enum
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum ResponseType {
    /// Ack is the reply to every mutating request. `ok` is false when the named peer or file is unknown.
    Ack { ok: bool },
    /// Files is a response type associated with ListFiles request type.
    Files { files: Vec<String> },
    /// Location is a response type associated with ResolveFileLocation request type.
    Location { address: Option<String> },
    /// Download is a response type associated with DownloadFile request type.
    Download { content: Option<FileContent> },
    /// Unsupported is sent back when a service receives a request it does not serve.
    Unsupported,
}

///
/// Request struct representing a request message.
///
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Request {
    pub request_type: RequestType,
    pub sender: String,
    pub request_id: RequestId,
}

impl Request {
    ///
    /// Default constructor for Request struct.
    ///
    pub fn new(request_type: RequestType, sender: impl Into<String>) -> Self {
        Request {
            request_type,
            sender: sender.into(),
            request_id: Uuid::new_v4(),
        }
    }
}

///
/// Represents a response message.
///
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Response {
    pub response_type: ResponseType,
    pub request_id: RequestId,
}

impl Response {
    ///
    /// Default constructor for Response struct.
    ///
    pub fn new(response_type: ResponseType, request_id: RequestId) -> Self {
        Response {
            response_type,
            request_id,
        }
    }
}

impl Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Register { peer, files } => {
                write!(f, "Register({}, {} files)", peer, files.len())
            }
            RequestType::Heartbeat {
                peer_id,
                new_files,
                deleted_files,
                changed_files,
            } => write!(
                f,
                "Heartbeat({}, +{} -{} ~{})",
                peer_id,
                new_files.len(),
                deleted_files.len(),
                changed_files.len()
            ),
            RequestType::ListFiles => write!(f, "ListFiles"),
            RequestType::ResolveFileLocation { file } => write!(f, "ResolveFileLocation({})", file),
            RequestType::RegisterReplica { peer_id, file } => {
                write!(f, "RegisterReplica({}, {})", peer_id, file)
            }
            RequestType::DeregisterReplica { peer_id, file } => {
                write!(f, "DeregisterReplica({}, {})", peer_id, file)
            }
            RequestType::DownloadFile { file } => write!(f, "DownloadFile({})", file),
            RequestType::StaleRefresh { file } => write!(f, "StaleRefresh({})", file),
        }
    }
}

impl Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseType::Ack { ok } => write!(f, "Ack({})", ok),
            ResponseType::Files { files } => write!(f, "Files({})", files.len()),
            ResponseType::Location { address: Some(address) } => {
                write!(f, "Location({})", address)
            }
            ResponseType::Location { address: None } => write!(f, "Location(none)"),
            ResponseType::Download { content: Some(content) } => write!(
                f,
                "Download({} bytes from {})",
                content.data.len(),
                content.origin
            ),
            ResponseType::Download { content: None } => write!(f, "Download(none)"),
            ResponseType::Unsupported => write!(f, "Unsupported"),
        }
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] from {}",
            self.request_type, self.request_id, self.sender
        )
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.response_type, self.request_id)
    }
}
