// LiteCode engine exports

pub mod config;
pub mod document;
pub mod error;
pub mod execution;
pub mod output;
pub mod session;
pub mod session_state;
pub mod workspace;

pub use config::Config;
pub use document::{DiscardPrompt, Document, DocumentId, DocumentStore, LineMarker};
pub use error::{EngineError, Result};
pub use execution::{EngineEvent, ExecutionEngine, RunId, RunOutcome, RunRequest};
pub use output::OutputSink;
pub use session::{RunDispatch, Session};
pub use session_state::SessionState;
