pub mod registry;
pub mod request_handler;

use crate::constants::COORDINATOR_SENDER_NAME;
use crate::networking::clients::PeerClient;
use crate::networking::message_dispatcher::MessageDispatcher;
use crate::networking::tcp_listener::TcpListenerService;
use registry::Registry;
use request_handler::handle_received_request;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

///
/// Central registry service. Brokers peer addresses and relays change notifications; never
/// touches file content.
///
pub struct Coordinator {
    registry: Arc<RwLock<Registry>>,
    peer_client: PeerClient,
}

impl Coordinator {
    /// `request_timeout` bounds every stale-refresh call made to peers.
    pub fn new(request_timeout: Duration) -> Self {
        let dispatcher = MessageDispatcher::new(COORDINATOR_SENDER_NAME, request_timeout);
        Coordinator {
            registry: Arc::new(RwLock::new(Registry::new())),
            peer_client: PeerClient::new(Arc::new(dispatcher)),
        }
    }

    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        Arc::clone(&self.registry)
    }

    ///
    /// Starts serving requests arriving at `listener`.
    ///
    pub fn start_listening(self: Arc<Self>, listener: TcpListenerService) -> JoinHandle<()> {
        listener.spawn(move |request| {
            let registry = Arc::clone(&self.registry);
            let peer_client = self.peer_client.clone();
            handle_received_request(request, registry, peer_client)
        })
    }
}
