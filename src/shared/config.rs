//! Application configuration. Storage, timeouts, announcement target, paths.

use serde::Deserialize;
use std::path::PathBuf;

/// Default data directory when neither `VOTUM_DATA_DIR` nor a config file sets one.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default wait for a contended per-motion lock before reporting `Busy`.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;

/// Default SQLite busy timeout for concurrent writers.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default limit for one webhook request.
pub const DEFAULT_ANNOUNCE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub data_dir: Option<String>,

    /// SQLite file. Defaults to `<data_dir>/votum.db`. Read from VOTUM_DATABASE_PATH.
    #[serde(default)]
    pub database_path: Option<String>,

    /// `sqlite` (default) or `memory`. Read from VOTUM_STORAGE.
    #[serde(default)]
    pub storage: Option<StorageKind>,

    /// SQLite busy timeout in ms. Read from VOTUM_BUSY_TIMEOUT_MS.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Per-motion lock acquisition timeout in ms; 0 waits forever. Read from VOTUM_LOCK_TIMEOUT_MS.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// Discord-compatible webhook for proposals and results. Read from VOTUM_ANNOUNCE_WEBHOOK_URL.
    #[serde(default)]
    pub announce_webhook_url: Option<String>,

    /// Per-request webhook timeout in ms. Read from VOTUM_ANNOUNCE_TIMEOUT_MS.
    #[serde(default)]
    pub announce_timeout_ms: Option<u64>,

    /// Where archive exports are written. Defaults to `<data_dir>/archives`.
    #[serde(default)]
    pub archive_dir: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("VOTUM"));
        if let Ok(path) = std::env::var("VOTUM_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR))
    }

    pub fn database_path_or_default(&self) -> PathBuf {
        self.database_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("votum.db"))
    }

    pub fn archive_dir_or_default(&self) -> PathBuf {
        self.archive_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("archives"))
    }

    pub fn storage_or_default(&self) -> StorageKind {
        self.storage.unwrap_or(StorageKind::Sqlite)
    }

    pub fn busy_timeout_ms_or_default(&self) -> u64 {
        self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// `None` means wait without limit.
    pub fn lock_timeout(&self) -> Option<std::time::Duration> {
        match self.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS) {
            0 => None,
            ms => Some(std::time::Duration::from_millis(ms)),
        }
    }

    /// Always bounded; 0 falls back to the default.
    pub fn announce_timeout(&self) -> std::time::Duration {
        let ms = match self.announce_timeout_ms {
            Some(0) | None => DEFAULT_ANNOUNCE_TIMEOUT_MS,
            Some(ms) => ms,
        };
        std::time::Duration::from_millis(ms)
    }

    /// Webhook URL when set and non-empty.
    pub fn announce_webhook_url(&self) -> Option<String> {
        self.announce_webhook_url
            .clone()
            .filter(|url| !url.trim().is_empty())
    }
}
