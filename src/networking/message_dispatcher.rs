use crate::networking::messages::{
    Request, RequestId, RequestType, Response, ResponseType, MAX_MESSAGE_SIZE,
};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unable to reach {address}: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Connection failed mid-exchange: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Message exceeds the maximum message size")]
    TooLarge,
    #[error("Response id {received} does not match request id {expected}")]
    MismatchedResponse {
        expected: RequestId,
        received: RequestId,
    },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(ResponseType),
}

impl DispatchError {
    /// Transport failures that may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::Unreachable { .. } | DispatchError::Timeout(_) | DispatchError::Io(_)
        )
    }
}

///
/// Serializes `message` as JSON, writes it and closes the write half of the stream.
/// The peer reads until EOF, so the shutdown marks the end of the message.
///
pub(crate) async fn write_message<S, T>(stream: &mut S, message: &T) -> Result<(), DispatchError>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(DispatchError::TooLarge);
    }
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;
    Ok(())
}

///
/// Reads one JSON message until EOF. Refuses anything above `MAX_MESSAGE_SIZE`.
///
pub(crate) async fn read_message<S, T>(stream: &mut S) -> Result<T, DispatchError>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut data = Vec::new();
    (&mut *stream)
        .take(MAX_MESSAGE_SIZE as u64 + 1)
        .read_to_end(&mut data)
        .await?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(DispatchError::TooLarge);
    }
    Ok(serde_json::from_slice(&data)?)
}

///
/// Issues requests to other processes of the cluster.
///
/// Every call opens its own TCP connection, so a dispatcher can be shared freely between tasks.
/// Each call is bounded by `request_timeout`, which covers connecting, sending and receiving.
///
pub struct MessageDispatcher {
    sender: String,
    request_timeout: Duration,
}

impl MessageDispatcher {
    pub fn new(sender: impl Into<String>, request_timeout: Duration) -> Self {
        MessageDispatcher {
            sender: sender.into(),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    ///
    /// Sends a request to `address` and waits for the matching response.
    ///
    pub async fn send_request(
        &self,
        address: &str,
        request_type: RequestType,
    ) -> Result<ResponseType, DispatchError> {
        let request = Request::new(request_type, self.sender.clone());
        debug!("Sending {} to {}", request, address);

        let response = match timeout(self.request_timeout, exchange(address, &request)).await {
            Ok(result) => result?,
            Err(_) => return Err(DispatchError::Timeout(address.to_string())),
        };

        if response.request_id != request.request_id {
            return Err(DispatchError::MismatchedResponse {
                expected: request.request_id,
                received: response.request_id,
            });
        }

        debug!("Received {} from {}", response, address);
        Ok(response.response_type)
    }
}

async fn exchange(address: &str, request: &Request) -> Result<Response, DispatchError> {
    let mut stream =
        TcpStream::connect(address)
            .await
            .map_err(|source| DispatchError::Unreachable {
                address: address.to_string(),
                source,
            })?;
    write_message(&mut stream, request).await?;
    read_message(&mut stream).await
}
