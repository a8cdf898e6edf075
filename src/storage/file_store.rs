use crate::constants::{CACHE_FILE_PREFIX, PARTIAL_FILE_SUFFIX};
use crate::storage::fingerprint::Fingerprint;
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid file name '{0}'")]
    InvalidName(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

///
/// Checks that a name received from the network denotes a plain file directly inside the mounted
/// directory. The file namespace is flat, and cache-prefixed names are reserved.
///
pub fn validate_file_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(CACHE_FILE_PREFIX);
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

///
/// # Mounted directory of a peer.
///
/// Owned files are ordinary files in the directory. Cached copies live next to them under
/// `CACHE_FILE_PREFIX` and are invisible to `list_owned_files`.
/// The store never keeps content in memory; every read goes to disk.
///
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owned_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn cached_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", CACHE_FILE_PREFIX, name))
    }

    /// Names of the regular files in the directory, cache entries excluded, sorted.
    pub async fn list_owned_files(&self) -> Result<Vec<String>, StoreError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!("Skipping file with non UTF-8 name {:?}", name);
                    continue;
                }
            };
            if name.starts_with(CACHE_FILE_PREFIX) {
                continue;
            }
            // Follows symlinks, unlike `DirEntry::file_type`.
            match fs::metadata(entry.path()).await {
                Ok(metadata) if metadata.is_file() => files.push(name),
                Ok(_) => {}
                Err(e) => debug!("Skipping {:?}: {}", entry.path(), e),
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deletes every cache-prefixed entry. Returns how many were removed.
    pub async fn purge_cached_files(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_cached = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(CACHE_FILE_PREFIX));
            if is_cached && entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn read_owned(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_file_name(name)?;
        Ok(fs::read(self.owned_path(name)).await?)
    }

    pub async fn read_cached(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_file_name(name)?;
        Ok(fs::read(self.cached_path(name)).await?)
    }

    pub async fn fingerprint_owned(&self, name: &str) -> Result<Fingerprint, StoreError> {
        let content = self.read_owned(name).await?;
        Ok(Fingerprint::from_content(&content))
    }

    ///
    /// Replaces the cached copy of `name`. The content goes to a uniquely named partial file
    /// first and is renamed into place, so readers never observe a half-written copy.
    ///
    pub async fn write_cached(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_file_name(name)?;
        let partial_path = self.root.join(format!(
            "{}{}.{}{}",
            CACHE_FILE_PREFIX,
            name,
            Uuid::new_v4().simple(),
            PARTIAL_FILE_SUFFIX
        ));
        if let Err(e) = fs::write(&partial_path, data).await {
            let _ = fs::remove_file(&partial_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&partial_path, self.cached_path(name)).await {
            let _ = fs::remove_file(&partial_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Removes the cached copy of `name`. A missing copy is not an error.
    pub async fn remove_cached(&self, name: &str) -> Result<(), StoreError> {
        validate_file_name(name)?;
        match fs::remove_file(self.cached_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
