use crate::networking::message_dispatcher::{read_message, write_message, DispatchError};
use crate::networking::messages::{Request, Response, ResponseType};
use anyhow::{bail, Result};
use log::{debug, error, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

///
/// Accepts request connections for a coordinator or a peer.
///
/// Every connection carries exactly one request and one response. Connections are handled on
/// their own task, so one slow request never stalls the others.
///
pub struct TcpListenerService {
    listener: TcpListener,
    address: SocketAddr,
    read_timeout: Duration,
}

impl TcpListenerService {
    pub async fn bind(address: &str, read_timeout: Duration) -> Result<TcpListenerService> {
        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(e) => {
                bail!("Error opening TCP Listener on {}: {}", address, e);
            }
        };

        let address = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                bail!("Error reading Socket Address: {}", e);
            }
        };

        Ok(TcpListenerService {
            listener,
            address,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    ///
    /// Runs the accept loop on a new task. `handler` maps each request to its response.
    /// Aborting the returned handle stops accepting new connections.
    ///
    pub fn spawn<H, Fut>(self, handler: H) -> JoinHandle<()>
    where
        H: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseType> + Send + 'static,
    {
        let handler = Arc::new(handler);
        tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match self.listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection on {}: {}", self.address, e);
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                let read_timeout = self.read_timeout;
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handler, read_timeout).await {
                        warn!("Failed to serve connection from {}: {}", peer_addr, e);
                    }
                });
            }
        })
    }
}

async fn handle_connection<H, Fut>(
    mut stream: TcpStream,
    handler: Arc<H>,
    read_timeout: Duration,
) -> Result<(), DispatchError>
where
    H: Fn(Request) -> Fut,
    Fut: Future<Output = ResponseType>,
{
    let request: Request = match timeout(read_timeout, read_message(&mut stream)).await {
        Ok(request) => request?,
        Err(_) => return Err(DispatchError::Timeout("inbound request".to_string())),
    };
    debug!("Received request: {}", request);

    let request_id = request.request_id;
    let response = Response::new(handler(request).await, request_id);
    debug!("Answering with {}", response);

    write_message(&mut stream, &response).await
}
