use live_preview::PreviewError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::document::DocumentId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document {0} is not open")]
    NotFound(DocumentId),
    #[error("no document is open")]
    NoActiveDocument,
    #[error("document {0} has no path yet")]
    NoPath(DocumentId),
    #[error("{} is already open in another document", .0.display())]
    AlreadyOpen(PathBuf),
    #[error("unsaved changes in {0} were kept")]
    DiscardDeclined(String),
    #[error("unknown language: {0}")]
    UnknownLanguage(String),
    #[error("{0} has no runner configured")]
    NotExecutable(String),
    #[error("{0} is not a markup language")]
    NotMarkup(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to encode session state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Preview(#[from] PreviewError),
}

impl EngineError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
