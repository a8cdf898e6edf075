use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity of a peer as known to the rest of the cluster.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Hash)]
pub struct NodeInfo {
    /// Unique name chosen by the peer.
    pub name: String,
    /// `host:port` other peers connect to.
    pub address: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        NodeInfo {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}
