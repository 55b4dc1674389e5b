//! Live preview for markup documents.
//!
//! Serves a project directory as static files over HTTP from a background
//! task. Files are read from disk on every request and responses carry
//! `Cache-Control: no-store`, so a save is visible to the next request.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod server;

pub use server::PreviewServer;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },
    #[error("failed to bind preview server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("preview root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("preview server is not running")]
    NotRunning,
    #[error("{} is outside the served folder {}", .document.display(), .root.display())]
    OutsideRoot { document: PathBuf, root: PathBuf },
}

pub type Result<T> = std::result::Result<T, PreviewError>;
