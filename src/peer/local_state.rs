use crate::storage::fingerprint::Fingerprint;
use std::collections::{BTreeSet, HashMap};

/// What a peer knows about one file name.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEntry {
    /// Authored and stored by this peer.
    Owned { fingerprint: Fingerprint },
    /// Copy fetched from `origin`. A stale copy is never served and is re-fetched on next access.
    Cached { origin: String, fresh: bool },
}

///
/// Differences between two scans of the mounted directory, as reported in a heartbeat.
///
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub new_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub changed_files: Vec<String>,
    /// Cached copies replaced by an owned file of the same name during the scan.
    pub superseded_cache: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.deleted_files.is_empty() && self.changed_files.is_empty()
    }

    ///
    /// Folds a later report into one that was never delivered, so the pair can be sent as a single
    /// heartbeat. The coordinator applies new files before deletions, so a name ends up in at
    /// most one of the three lists, according to its latest state.
    ///
    pub fn merge(self, later: SyncReport) -> SyncReport {
        let mut new: BTreeSet<String> = self.new_files.into_iter().collect();
        let mut deleted: BTreeSet<String> = self.deleted_files.into_iter().collect();
        let mut changed: BTreeSet<String> = self.changed_files.into_iter().collect();

        for file in later.new_files {
            deleted.remove(&file);
            changed.remove(&file);
            new.insert(file);
        }
        for file in later.deleted_files {
            new.remove(&file);
            changed.remove(&file);
            deleted.insert(file);
        }
        for file in later.changed_files {
            // A file the coordinator has not heard of yet has no other holders to refresh.
            if !new.contains(&file) {
                changed.insert(file);
            }
        }

        SyncReport {
            new_files: new.into_iter().collect(),
            deleted_files: deleted.into_iter().collect(),
            changed_files: changed.into_iter().collect(),
            superseded_cache: Vec::new(),
        }
    }
}

///
/// # Owned and cached files of a single peer.
///
/// One map of tagged entries, so a name is either owned or cached, never both. Holds no file
/// content; callers do all disk I/O outside the lock guarding this table.
///
#[derive(Debug, Default)]
pub struct LocalState {
    entries: HashMap<String, LocalEntry>,
}

impl LocalState {
    pub fn new() -> Self {
        LocalState::default()
    }

    pub fn entry(&self, name: &str) -> Option<&LocalEntry> {
        self.entries.get(name)
    }

    pub fn owned_files(&self) -> Vec<String> {
        self.sorted_names(|entry| matches!(entry, LocalEntry::Owned { .. }))
    }

    pub fn fresh_cached_files(&self) -> Vec<String> {
        self.sorted_names(|entry| matches!(entry, LocalEntry::Cached { fresh: true, .. }))
    }

    fn sorted_names(&self, filter: impl Fn(&LocalEntry) -> bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| filter(*entry))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    ///
    /// Records the result of a directory scan. `scanned` holds every owned file currently on disk
    /// with its freshly computed fingerprint.
    ///
    /// Only a file that was already owned and whose fingerprint differs is reported as changed.
    /// Every scanned fingerprint is stored, so a file is never reported changed on the scan that
    /// first sees it.
    ///
    pub fn apply_scan(&mut self, scanned: &HashMap<String, Fingerprint>) -> SyncReport {
        let mut report = SyncReport::default();

        let deleted: Vec<String> = self
            .entries
            .iter()
            .filter(|(name, entry)| {
                matches!(entry, LocalEntry::Owned { .. }) && !scanned.contains_key(*name)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in deleted {
            self.entries.remove(&name);
            report.deleted_files.push(name);
        }

        let mut names: Vec<&String> = scanned.keys().collect();
        names.sort();
        for name in names {
            let fingerprint = scanned[name];
            match self.entries.get(name) {
                Some(LocalEntry::Owned {
                    fingerprint: previous,
                }) => {
                    if *previous != fingerprint {
                        report.changed_files.push(name.clone());
                    }
                }
                Some(LocalEntry::Cached { .. }) => {
                    report.superseded_cache.push(name.clone());
                    report.new_files.push(name.clone());
                }
                None => report.new_files.push(name.clone()),
            }
            self.entries
                .insert(name.clone(), LocalEntry::Owned { fingerprint });
        }

        report.deleted_files.sort();
        report
    }

    ///
    /// Records a freshly downloaded copy. Refused when the name became owned in the meantime.
    ///
    pub fn record_cached(&mut self, name: &str, origin: &str) -> bool {
        if let Some(LocalEntry::Owned { .. }) = self.entries.get(name) {
            return false;
        }
        self.entries.insert(
            name.to_string(),
            LocalEntry::Cached {
                origin: origin.to_string(),
                fresh: true,
            },
        );
        true
    }

    /// Origin of a cached entry, fresh or stale.
    pub fn cached_origin(&self, name: &str) -> Option<&str> {
        match self.entries.get(name) {
            Some(LocalEntry::Cached { origin, .. }) => Some(origin),
            _ => None,
        }
    }

    /// Marks a cached entry stale. Returns false when `name` is not cached.
    pub fn mark_stale(&mut self, name: &str) -> bool {
        match self.entries.get_mut(name) {
            Some(LocalEntry::Cached { fresh, .. }) => {
                *fresh = false;
                true
            }
            _ => false,
        }
    }

    /// Drops a cached entry. Owned entries are left alone.
    pub fn forget_cached(&mut self, name: &str) {
        if let Some(LocalEntry::Cached { .. }) = self.entries.get(name) {
            self.entries.remove(name);
        }
    }
}
