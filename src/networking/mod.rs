pub mod clients;
pub mod message_dispatcher;
pub mod messages;
pub mod node_info;
pub mod tcp_listener;
