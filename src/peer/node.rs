use crate::config::Config;
use crate::networking::clients::{CoordinatorClient, PeerClient};
use crate::networking::message_dispatcher::MessageDispatcher;
use crate::networking::messages::FileContent;
use crate::networking::node_info::NodeInfo;
use crate::networking::tcp_listener::TcpListenerService;
use crate::peer::incoming_request_handler::handle_received_request;
use crate::peer::local_state::{LocalEntry, LocalState, SyncReport};
use crate::peer::{PeerError, PeerSettings};
use crate::storage::file_store::{validate_file_name, FileStore};
use crate::storage::fingerprint::Fingerprint;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

///
/// # A peer of the file store.
///
/// Shared (behind an `Arc`) by three independent units: the inbound server answering other peers
/// and the coordinator, the background sync loop, and the client surface used by the CLI.
/// They only meet in `state`, whose lock is never held across disk or network I/O.
///
pub struct PeerNode {
    info: NodeInfo,
    store: FileStore,
    state: RwLock<LocalState>,
    /// Heartbeat content that could not be delivered yet.
    unsent: Mutex<SyncReport>,
    coordinator: CoordinatorClient,
    peers: PeerClient,
    settings: PeerSettings,
}

impl PeerNode {
    pub fn new(info: NodeInfo, directory: impl Into<PathBuf>, config: &Config) -> Self {
        let dispatcher = Arc::new(MessageDispatcher::new(
            info.name.clone(),
            config.request_timeout(),
        ));
        PeerNode {
            store: FileStore::new(directory),
            state: RwLock::new(LocalState::new()),
            unsent: Mutex::new(SyncReport::default()),
            coordinator: CoordinatorClient::new(
                Arc::clone(&dispatcher),
                config.coordinator_address.clone(),
            ),
            peers: PeerClient::new(dispatcher),
            settings: PeerSettings::from_config(config),
            info,
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub async fn local_entry(&self, file: &str) -> Option<LocalEntry> {
        self.state.read().await.entry(file).cloned()
    }

    ///
    /// Starts answering `DOWNLOAD_FILE` and `STALE_REFRESH` requests arriving at `listener`.
    ///
    pub fn start_listening(self: Arc<Self>, listener: TcpListenerService) -> JoinHandle<()> {
        listener.spawn(move |request| handle_received_request(Arc::clone(&self), request))
    }

    ///
    /// Joins the cluster: discards cached copies left by a previous run, scans the mounted
    /// directory and registers every owned file with the coordinator.
    ///
    pub async fn join(&self) -> Result<(), PeerError> {
        let purged = self.store.purge_cached_files().await?;
        if purged > 0 {
            info!("Discarded {} cached files from a previous run", purged);
        }

        let scanned = self.scan_directory().await?;
        let files = {
            let mut state = self.state.write().await;
            state.apply_scan(&scanned);
            state.owned_files()
        };

        let file_count = files.len();
        if !self.coordinator.register(self.info.clone(), files).await? {
            warn!("Coordinator did not acknowledge the registration of {}", self.info);
        }
        info!("{} joined the cluster with {} files", self.info, file_count);
        Ok(())
    }

    /// Every file name known to the coordinator.
    pub async fn catalog(&self) -> Result<Vec<String>, PeerError> {
        Ok(self.coordinator.list_files().await?)
    }

    ///
    /// Returns the content of `file`.
    ///
    /// Owned and fresh cached copies are read from disk without asking anybody. Otherwise a holder
    /// is resolved through the coordinator and the file is downloaded from it, cached locally and
    /// this peer registers as a further holder. Failed downloads are retried with backoff, and
    /// every attempt resolves again, so a retry may pick another holder.
    ///
    pub async fn fetch(&self, file: &str) -> Result<Vec<u8>, PeerError> {
        validate_file_name(file)?;

        let entry = self.state.read().await.entry(file).cloned();
        match entry {
            Some(LocalEntry::Owned { .. }) => match self.store.read_owned(file).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_not_found() => {
                    debug!("Owned file {} was removed since the last scan", file)
                }
                Err(e) => return Err(e.into()),
            },
            Some(LocalEntry::Cached { fresh: true, .. }) => {
                match self.store.read_cached(file).await {
                    Ok(data) => return Ok(data),
                    Err(e) if e.is_not_found() => {
                        warn!("Cached copy of {} disappeared from disk", file);
                        self.state.write().await.forget_cached(file);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(LocalEntry::Cached { fresh: false, .. }) | None => {}
        }

        let content = self
            .with_retries(file, || self.resolve_and_download(file))
            .await?;
        self.store_cached_copy(file, content).await
    }

    ///
    /// Answers a download request. Owned files and fresh cached copies are read from disk at call
    /// time; anything else, including stale copies, is reported as absent.
    ///
    pub async fn serve_download(&self, file: &str) -> Option<FileContent> {
        if validate_file_name(file).is_err() {
            warn!("Refusing download of invalid file name {:?}", file);
            return None;
        }

        let entry = self.state.read().await.entry(file).cloned();
        let (result, origin) = match entry {
            Some(LocalEntry::Owned { .. }) => {
                (self.store.read_owned(file).await, self.info.address.clone())
            }
            Some(LocalEntry::Cached {
                origin,
                fresh: true,
            }) => (self.store.read_cached(file).await, origin),
            _ => return None,
        };

        match result {
            Ok(data) => Some(FileContent { data, origin }),
            Err(e) => {
                warn!("Unable to read {} for download: {}", file, e);
                None
            }
        }
    }

    ///
    /// Re-downloads the cached copy of `file` from its origin.
    ///
    /// A file that is not cached here is a precondition failure, not a fault. When the origin
    /// cannot deliver, the copy is dropped, marked stale and this peer stops advertising it, so
    /// the next `fetch` goes back to the cluster.
    ///
    pub async fn refresh_cached(&self, file: &str) -> Result<(), PeerError> {
        let entry = self.state.read().await.entry(file).cloned();
        let (origin, was_fresh) = match entry {
            Some(LocalEntry::Cached { origin, fresh }) => (origin, fresh),
            _ => return Err(PeerError::PreconditionMissing(file.to_string())),
        };

        match self.refresh_from(&origin, file).await {
            Ok(true) => {
                info!("Refreshed cached copy of {} from {}", file, origin);
                if !was_fresh {
                    self.advertise_replica(file).await;
                }
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                self.invalidate_cached(file).await;
                Err(e)
            }
        }
    }

    ///
    /// One sync tick: rescans the directory, updates the fingerprints and reports the differences
    /// in a single heartbeat. Differences that could not be delivered are sent with the next
    /// tick. A coordinator that no longer knows this peer gets a fresh registration instead.
    ///
    pub async fn sync_once(&self) -> Result<SyncReport, PeerError> {
        let scanned = self.scan_directory().await?;
        let report = self.state.write().await.apply_scan(&scanned);

        for file in &report.superseded_cache {
            info!("{} is now owned locally, dropping the cached copy", file);
            if let Err(e) = self.store.remove_cached(file).await {
                warn!("Unable to remove cached copy of {}: {}", file, e);
            }
        }

        let mut unsent = self.unsent.lock().await;
        let pending = std::mem::take(&mut *unsent).merge(report.clone());

        let result = self
            .coordinator
            .heartbeat(
                &self.info.name,
                pending.new_files.clone(),
                pending.deleted_files.clone(),
                pending.changed_files.clone(),
            )
            .await;

        match result {
            Ok(true) => {}
            Ok(false) => {
                warn!("Coordinator does not know {}, registering again", self.info);
                self.rejoin().await?;
            }
            Err(e) => {
                *unsent = pending;
                return Err(e.into());
            }
        }
        Ok(report)
    }

    ///
    /// Runs `sync_once` every `sync_interval` until `shutdown` changes or its sender goes away.
    ///
    pub async fn run_sync_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = time::sleep(self.settings.sync_interval) => {}
                _ = shutdown.changed() => {
                    info!("Stopping the sync loop of {}", self.info);
                    return;
                }
            }

            match self.sync_once().await {
                Ok(report) if !report.is_empty() => info!(
                    "Reported {} new, {} deleted and {} changed files",
                    report.new_files.len(),
                    report.deleted_files.len(),
                    report.changed_files.len()
                ),
                Ok(_) => debug!("Nothing changed in {:?}", self.store.root()),
                Err(e) => error!("Sync tick failed: {}", e),
            }
        }
    }

    async fn scan_directory(&self) -> Result<HashMap<String, Fingerprint>, PeerError> {
        let mut scanned = HashMap::new();
        for file in self.store.list_owned_files().await? {
            match self.store.fingerprint_owned(&file).await {
                Ok(fingerprint) => {
                    scanned.insert(file, fingerprint);
                }
                Err(e) if e.is_not_found() => debug!("{} vanished during the scan", file),
                Err(e) => warn!("Unable to fingerprint {}: {}", file, e),
            }
        }
        Ok(scanned)
    }

    async fn rejoin(&self) -> Result<(), PeerError> {
        let (owned, cached) = {
            let state = self.state.read().await;
            (state.owned_files(), state.fresh_cached_files())
        };
        self.coordinator.register(self.info.clone(), owned).await?;
        for file in cached {
            self.advertise_replica(&file).await;
        }
        Ok(())
    }

    async fn resolve_and_download(&self, file: &str) -> Result<FileContent, PeerError> {
        let address = self
            .coordinator
            .resolve_file_location(file)
            .await?
            .ok_or_else(|| PeerError::NotFound(file.to_string()))?;

        // The coordinator may still list this peer for a copy it no longer has.
        if address == self.info.address {
            return Err(PeerError::StaleHolder {
                address,
                file: file.to_string(),
            });
        }
        self.download_from(&address, file).await
    }

    async fn download_from(&self, address: &str, file: &str) -> Result<FileContent, PeerError> {
        debug!("Downloading {} from {}", file, address);
        self.peers
            .download_file(address, file)
            .await?
            .ok_or_else(|| PeerError::StaleHolder {
                address: address.to_string(),
                file: file.to_string(),
            })
    }

    /// Returns false when the file became owned locally while downloading.
    async fn refresh_from(&self, origin: &str, file: &str) -> Result<bool, PeerError> {
        let content = self
            .with_retries(file, || self.download_from(origin, file))
            .await?;
        self.store.write_cached(file, &content.data).await?;
        if !self.state.write().await.record_cached(file, &content.origin) {
            self.store.remove_cached(file).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn store_cached_copy(
        &self,
        file: &str,
        content: FileContent,
    ) -> Result<Vec<u8>, PeerError> {
        self.store.write_cached(file, &content.data).await?;

        if !self.state.write().await.record_cached(file, &content.origin) {
            // An owned file of the same name appeared meanwhile; it takes precedence.
            self.store.remove_cached(file).await?;
            return Ok(content.data);
        }

        info!(
            "Cached {} ({} bytes, origin {})",
            file,
            content.data.len(),
            content.origin
        );
        self.advertise_replica(file).await;
        Ok(content.data)
    }

    ///
    /// Lists this peer as a holder of its cached copy of `file`. A copy the coordinator refuses to
    /// list would never be refreshed, so it is marked stale and dropped from disk instead.
    ///
    async fn advertise_replica(&self, file: &str) {
        match self.coordinator.register_replica(&self.info.name, file).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "Coordinator refused {} as holder of {}, dropping the cached copy",
                    self.info.name, file
                );
                if self.state.write().await.mark_stale(file) {
                    if let Err(e) = self.store.remove_cached(file).await {
                        warn!("Unable to remove unlisted copy of {}: {}", file, e);
                    }
                }
            }
            Err(e) => warn!("Unable to register as holder of {}: {}", file, e),
        }
    }

    async fn invalidate_cached(&self, file: &str) {
        if !self.state.write().await.mark_stale(file) {
            return;
        }
        warn!(
            "Cached copy of {} could not be refreshed, fetching it again on next access",
            file
        );
        if let Err(e) = self.store.remove_cached(file).await {
            warn!("Unable to remove stale copy of {}: {}", file, e);
        }
        if let Err(e) = self
            .coordinator
            .deregister_replica(&self.info.name, file)
            .await
        {
            warn!("Unable to deregister as holder of {}: {}", file, e);
        }
    }

    async fn with_retries<T, F, Fut>(&self, file: &str, mut operation: F) -> Result<T, PeerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PeerError>>,
    {
        let mut backoff = self.settings.retry_backoff;
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.settings.fetch_attempts => {
                    warn!(
                        "Attempt {}/{} to download {} failed: {}",
                        attempt, self.settings.fetch_attempts, file, e
                    );
                    time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
