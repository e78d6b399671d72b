//! Error types
//!
//! Nothing here is fatal: a failed load leaves an empty canvas, a failed
//! write leaves the previous state and is reported to the host.

use std::path::PathBuf;
use thiserror::Error;

/// Session bytes could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed session data: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid session data: {0}")]
    Invalid(String),
    #[error("failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Storage I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read session from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write session to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete session at {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup {path} failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Export rendering or encoding failure.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export area {width}x{height} is empty or too large")]
    InvalidSize { width: f64, height: f64 },
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to write vector page: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("vector page is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Controller-level failure.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("background save did not complete: {0}")]
    Background(#[from] tokio::task::JoinError),
}
