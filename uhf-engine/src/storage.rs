use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::error::{ChannelError, Result};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Storage: Send + Sync {
    /// Directory every relative path is resolved against.
    fn root(&self) -> &Path;

    fn read_bytes(&self, path: &Path) -> std::result::Result<Vec<u8>, StorageError>;

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::result::Result<(), StorageError>;

    /// Whether a media file can be opened. Used to flag programs in error.
    fn is_readable(&self, path: &Path) -> bool;
}

/// Channel files on the local file system.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Storage for FsStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read_bytes(&self, path: &Path) -> std::result::Result<Vec<u8>, StorageError> {
        match fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::result::Result<(), StorageError> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)?;
        Ok(())
    }

    fn is_readable(&self, path: &Path) -> bool {
        fs::File::open(self.root.join(path)).is_ok()
    }
}

/// In-memory storage. Writes to paths registered with
/// [`MemoryStorage::fail_writes_to`] fail with an I/O error.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    root: PathBuf,
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/channel"),
            ..Default::default()
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        lock(&self.files).insert(path.into(), bytes.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        lock(&self.files).get(path.as_ref()).cloned()
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        lock(&self.failing).insert(path.into());
    }

    pub fn allow_writes_to(&self, path: impl AsRef<Path>) {
        lock(&self.failing).remove(path.as_ref());
    }
}

impl Storage for MemoryStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read_bytes(&self, path: &Path) -> std::result::Result<Vec<u8>, StorageError> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::result::Result<(), StorageError> {
        if lock(&self.failing).contains(path) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "write refused",
            )));
        }
        lock(&self.files).insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn is_readable(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads and decodes one JSON document. `//` and `/* */` comments are
/// stripped first since channel files are edited by hand.
pub fn load_json<T: DeserializeOwned>(storage: &dyn Storage, path: &Path) -> Result<T> {
    let bytes = storage.read_bytes(path).map_err(|source| ChannelError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_json(path, &bytes)
}

pub fn decode_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    let stripped = json_comments::StripComments::new(bytes);
    serde_json::from_reader(stripped).map_err(|source| ChannelError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn encode_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|source| ChannelError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn store_json<T: Serialize>(storage: &dyn Storage, path: &Path, value: &T) -> Result<()> {
    let bytes = encode_json(path, value)?;
    storage
        .write_bytes(path, &bytes)
        .map_err(|source| ChannelError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Rejects documents whose version tag is not one of `accepted`.
pub fn check_version(path: &Path, found: &str, accepted: &[&'static str]) -> Result<()> {
    if accepted.contains(&found) {
        return Ok(());
    }
    Err(ChannelError::UnsupportedVersion {
        path: path.to_path_buf(),
        found: found.to_string(),
        expected: accepted.first().copied().unwrap_or_default(),
    })
}
