//! The last folder and file, carried across restarts as a small JSON record.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{EngineError, Result};

/// Empty paths mean "none".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub last_folder: PathBuf,
    #[serde(default)]
    pub last_file: PathBuf,
}

impl SessionState {
    pub fn new(folder: &Path, file: Option<&Path>) -> Self {
        Self {
            last_folder: folder.to_path_buf(),
            last_file: file.map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    pub fn folder(&self) -> Option<&Path> {
        (!self.last_folder.as_os_str().is_empty()).then_some(self.last_folder.as_path())
    }

    pub fn file(&self) -> Option<&Path> {
        (!self.last_file.as_os_str().is_empty()).then_some(self.last_file.as_path())
    }

    /// `LITECODE_DATA_DIR/state.json`, else the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("LITECODE_DATA_DIR") {
            return Some(PathBuf::from(dir).join("state.json"));
        }
        directories::ProjectDirs::from("com", "litecode", "litecode")
            .map(|dirs| dirs.data_dir().join("state.json"))
    }

    /// Missing or unreadable state means no prior session.
    pub async fn load(path: &Path) -> Self {
        let json = match fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No session state at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("Failed to read session state {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&json) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Ignoring malformed session state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::io("create directory", parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .await
            .map_err(|e| EngineError::io("write", path, e))?;
        log::debug!("Saved session state to {}", path.display());
        Ok(())
    }
}
