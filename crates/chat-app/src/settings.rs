use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use livechat_client::ClientConfig;
use livechat_core::DEFAULT_TYPING_QUIET_INTERVAL;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000/chat";
pub const SETTINGS_DIRECTORY_NAME: &str = "livechat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "session.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_typing_quiet_interval_ms")]
    pub typing_quiet_interval_ms: u64,
    /// Where the session record lives; empty keeps it in memory only.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            typing_quiet_interval_ms: default_typing_quiet_interval_ms(),
            database_path: default_database_path(),
        }
    }
}

impl ChatSettings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            typing_quiet_interval: Duration::from_millis(self.typing_quiet_interval_ms),
        }
    }

    pub fn database_location(&self) -> Option<&str> {
        Some(self.database_path.as_str()).filter(|path| !path.is_empty())
    }

    pub fn normalized(mut self) -> Self {
        self.server_url = if self.server_url.trim().is_empty() {
            default_server_url()
        } else {
            self.server_url.trim().to_string()
        };
        if self.typing_quiet_interval_ms == 0 {
            self.typing_quiet_interval_ms = default_typing_quiet_interval_ms();
        }
        self.database_path = self.database_path.trim().to_string();

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ChatSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".livechat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ChatSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ChatSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return ChatSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(ChatSettings::default())).merge(Json::file(path));

        match figment.extract::<ChatSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ChatSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_typing_quiet_interval_ms() -> u64 {
    DEFAULT_TYPING_QUIET_INTERVAL.as_millis() as u64
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|path| {
            path.join(SETTINGS_DIRECTORY_NAME)
                .join(DATABASE_FILE_NAME)
                .display()
                .to_string()
        })
        .unwrap_or_default()
}
