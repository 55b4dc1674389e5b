use anyhow::Result;
use directories::ProjectDirs;
use langcore::LanguageRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::try_exists;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    /// JSON language table replacing the built-in one.
    #[serde(default)]
    pub languages_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub default_language: String,
    pub autosave: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub port: u16,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_language: String::from("python"),
            autosave: true,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            editor: EditorConfig::default(),
            execution: ExecutionConfig::default(),
            preview: PreviewConfig::default(),
            languages_file: None,
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        match Self::config_path() {
            Some(config_path) => Self::load_from(&config_path).await,
            None => {
                log::warn!("No config location available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub async fn load_from(config_path: &Path) -> Result<Self> {
        if try_exists(config_path).await? {
            match tokio::fs::read_to_string(config_path).await {
                Ok(content) => {
                    if content.trim().is_empty() {
                        log::warn!("Config file is empty, creating new one");
                        return Ok(Self::write_default(config_path).await);
                    }

                    match serde_json::from_str::<Self>(&content) {
                        Ok(mut config) => {
                            config.validate()?;
                            log::info!("Loaded config from: {}", config_path.display());
                            return Ok(config);
                        }
                        Err(json_err) => {
                            log::error!("Failed to parse config file: {}", json_err);

                            let backup_path = config_path.with_extension("bak");
                            if let Err(e) = tokio::fs::copy(config_path, &backup_path).await {
                                log::warn!("Failed to backup broken config: {}", e);
                            } else {
                                log::info!(
                                    "Backed up broken config to: {}",
                                    backup_path.display()
                                );
                            }
                            return Ok(Self::write_default(config_path).await);
                        }
                    }
                }
                Err(io_err) => {
                    log::error!("Failed to read config file: {}", io_err);
                    return Ok(Self::default());
                }
            }
        }

        log::info!("Config file does not exist, creating default");
        Ok(Self::write_default(config_path).await)
    }

    async fn write_default(config_path: &Path) -> Self {
        let config = Self::default();
        if let Err(e) = config.save_to(config_path).await {
            log::warn!("Failed to write default config: {}", e);
        }
        config
    }

    pub async fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(config_path) => self.save_to(&config_path).await,
            None => Ok(()),
        }
    }

    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        let mut config_to_save = self.clone();
        config_to_save.validate()?;

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }

        let content = serde_json::to_string_pretty(&config_to_save)?;
        tokio::fs::write(config_path, content).await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to write config file {}: {}",
                config_path.display(),
                e
            )
        })?;
        log::info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    /// Correct out-of-range values in place.
    pub fn validate(&mut self) -> Result<()> {
        let mut has_issues = false;

        if !(1..=600).contains(&self.execution.timeout_secs) {
            log::warn!(
                "Invalid execution timeout: {}s, using default",
                self.execution.timeout_secs
            );
            self.execution.timeout_secs = ExecutionConfig::default().timeout_secs;
            has_issues = true;
        }

        if self.preview.port == 0 {
            log::warn!("Invalid preview port 0, using default");
            self.preview.port = PreviewConfig::default().port;
            has_issues = true;
        }

        if self.editor.default_language.trim().is_empty() {
            log::warn!("Empty default language, using default");
            self.editor.default_language = EditorConfig::default().default_language;
            has_issues = true;
        }

        if has_issues {
            log::info!("Configuration validation completed with corrections");
        }

        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    /// The configured language table, or the built-in one when none is set
    /// or it cannot be used.
    pub async fn load_registry(&self) -> LanguageRegistry {
        let Some(path) = &self.languages_file else {
            return LanguageRegistry::builtin();
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                log::error!("Failed to read language table {}: {}", path.display(), e);
                return LanguageRegistry::builtin();
            }
        };
        match LanguageRegistry::from_json(&content) {
            Ok(registry) => {
                log::info!(
                    "Loaded {} languages from {}",
                    registry.len(),
                    path.display()
                );
                registry
            }
            Err(e) => {
                log::error!("Invalid language table {}: {}", path.display(), e);
                LanguageRegistry::builtin()
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LITECODE_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("LITECODE_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.json"));
        }

        ProjectDirs::from("com", "litecode", "litecode")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }
}
