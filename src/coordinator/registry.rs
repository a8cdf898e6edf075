use crate::networking::node_info::NodeInfo;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Unknown peer '{0}'")]
    UnknownPeer(String),
    #[error("Unknown file '{0}'")]
    UnknownFile(String),
}

///
/// Peers holding a copy of one file, in the order they were added.
/// The first holder is the origin and stays first for the lifetime of the record.
///
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    holders: Vec<String>,
}

impl FileRecord {
    fn new(origin: &str) -> Self {
        FileRecord {
            holders: vec![origin.to_string()],
        }
    }

    pub fn origin(&self) -> &str {
        &self.holders[0]
    }

    pub fn holders(&self) -> &[String] {
        &self.holders
    }

    fn is_held_by(&self, peer_id: &str) -> bool {
        self.holders.iter().any(|holder| holder == peer_id)
    }
}

/// Address and liveness bookkeeping of a registered peer.
/// Timestamps are recorded but never used to evict a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub address: String,
    pub last_heartbeat: SystemTime,
}

/// A replica holder that has to re-download `file` after its origin changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTarget {
    pub file: String,
    pub peer_id: String,
    pub address: String,
}

///
/// # Cluster-wide registry of files and peers.
///
/// Plain data structure without any synchronization of its own; the coordinator keeps it behind
/// a lock. Every operation on an unknown peer or file returns a `RegistryError` and leaves the
/// registry untouched.
///
#[derive(Debug, Default)]
pub struct Registry {
    files: HashMap<String, FileRecord>,
    hosts: HashMap<String, HostRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    ///
    /// Treats the call as a fresh join of `peer`.
    ///
    /// Whatever the registry remembered about an earlier incarnation of the peer is dropped first:
    /// it is removed from every replica set, and records it was the origin of disappear. Each
    /// announced file then gets a record with the peer as its only holder.
    ///
    pub fn register(&mut self, peer: &NodeInfo, files: &[String]) {
        self.files.retain(|_, record| {
            if record.origin() == peer.name {
                return false;
            }
            record.holders.retain(|holder| holder != &peer.name);
            true
        });

        for file in files {
            self.files.insert(file.clone(), FileRecord::new(&peer.name));
        }

        self.hosts.insert(
            peer.name.clone(),
            HostRecord {
                address: peer.address.clone(),
                last_heartbeat: SystemTime::now(),
            },
        );
    }

    ///
    /// Applies one heartbeat. Returns the holders that must refresh their copies of the changed
    /// files; the reporting peer itself is never among them.
    ///
    pub fn heartbeat(
        &mut self,
        peer_id: &str,
        new_files: &[String],
        deleted_files: &[String],
        changed_files: &[String],
    ) -> Result<Vec<RefreshTarget>, RegistryError> {
        let host = self
            .hosts
            .get_mut(peer_id)
            .ok_or_else(|| RegistryError::UnknownPeer(peer_id.to_string()))?;
        host.last_heartbeat = SystemTime::now();

        for file in new_files {
            // Re-announced by its own origin: replica holders stay listed.
            if self.files.get(file).is_some_and(|record| record.origin() == peer_id) {
                continue;
            }
            self.files.insert(file.clone(), FileRecord::new(peer_id));
        }

        for file in deleted_files {
            self.files.remove(file);
        }

        let mut targets = Vec::new();
        for file in changed_files {
            let Some(record) = self.files.get(file) else {
                continue;
            };
            for holder in record.holders.iter().filter(|holder| *holder != peer_id) {
                if let Some(host) = self.hosts.get(holder) {
                    targets.push(RefreshTarget {
                        file: file.clone(),
                        peer_id: holder.clone(),
                        address: host.address.clone(),
                    });
                }
            }
        }
        Ok(targets)
    }

    /// All known file names, sorted.
    pub fn list_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.files.keys().cloned().collect();
        files.sort();
        files
    }

    /// Address of a holder of `file`, chosen uniformly at random among all holders.
    pub fn resolve(&self, file: &str) -> Option<String> {
        self.resolve_with(file, &mut rand::rng())
    }

    pub fn resolve_with<R: Rng + ?Sized>(&self, file: &str, rng: &mut R) -> Option<String> {
        let record = self.files.get(file)?;
        let candidates: Vec<&String> = record
            .holders
            .iter()
            .filter_map(|holder| self.hosts.get(holder).map(|host| &host.address))
            .collect();
        candidates.choose(rng).map(|address| (*address).clone())
    }

    /// Adds `peer_id` to the holders of `file`. Adding an existing holder changes nothing.
    pub fn register_replica(&mut self, peer_id: &str, file: &str) -> Result<(), RegistryError> {
        if !self.hosts.contains_key(peer_id) {
            return Err(RegistryError::UnknownPeer(peer_id.to_string()));
        }
        let record = self
            .files
            .get_mut(file)
            .ok_or_else(|| RegistryError::UnknownFile(file.to_string()))?;
        if !record.is_held_by(peer_id) {
            record.holders.push(peer_id.to_string());
        }
        Ok(())
    }

    ///
    /// Removes `peer_id` from the holders of `file`.
    /// The origin leaving deletes the whole record, so a record never exists without its origin.
    ///
    pub fn deregister_replica(&mut self, peer_id: &str, file: &str) -> Result<(), RegistryError> {
        let record = self
            .files
            .get_mut(file)
            .ok_or_else(|| RegistryError::UnknownFile(file.to_string()))?;
        if record.origin() == peer_id {
            self.files.remove(file);
        } else {
            record.holders.retain(|holder| holder != peer_id);
        }
        Ok(())
    }

    pub fn file_record(&self, file: &str) -> Option<&FileRecord> {
        self.files.get(file)
    }

    pub fn host(&self, peer_id: &str) -> Option<&HostRecord> {
        self.hosts.get(peer_id)
    }

    /// Snapshot of every registered peer, sorted by name.
    pub fn hosts(&self) -> Vec<(String, HostRecord)> {
        let mut hosts: Vec<(String, HostRecord)> = self
            .hosts
            .iter()
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        hosts.sort_by(|a, b| a.0.cmp(&b.0));
        hosts
    }
}
