//! Session storage
//!
//! One session slot per install. The file store writes atomically so a
//! crash mid-save never leaves a torn document behind.

use crate::error::StoreError;
use crate::session::SESSION_FILE_NAME;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Durable home of the encoded session.
pub trait PersistenceStore: Send + Sync {
    fn save(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// `Ok(None)` when no session has been saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removing a session that does not exist is not an error.
    fn delete(&self) -> Result<(), StoreError>;
}

/// Session stored as a single file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SESSION_FILE_NAME))
    }

    /// The documents directory, or the temp dir when there is none.
    pub fn default_location() -> Self {
        Self::in_dir(session_dir(dirs_next::document_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn session_dir(documents: Option<PathBuf>) -> PathBuf {
    documents.unwrap_or_else(std::env::temp_dir)
}

impl PersistenceStore for FileStore {
    fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;
        // One staging file per save; the last rename wins.
        let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
        temp.write_all(bytes).map_err(write_err)?;
        temp.flush().map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|err| write_err(err.error))?;
        log::info!("saved session ({} bytes) to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn delete(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("deleted session {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Delete {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// In-memory slot for hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            slot: Mutex::new(Some(bytes)),
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PersistenceStore for MemoryStore {
    fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.contents())
    }

    fn delete(&self) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Write a gzip-compressed copy of a session document.
pub fn write_backup(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let backup_err = |source| StoreError::Backup {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::create(path).map_err(backup_err)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(bytes).map_err(backup_err)?;
    encoder.finish().map_err(backup_err)?;
    log::info!("wrote session backup {}", path.display());
    Ok(())
}

/// Read back a document written by [`write_backup`].
pub fn read_backup(path: &Path) -> Result<Vec<u8>, StoreError> {
    let backup_err = |source| StoreError::Backup {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(backup_err)?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes).map_err(backup_err)?;
    Ok(bytes)
}
