use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use folio_core::idgen::DEFAULT_BASE_TIME_MS;
use folio_core::{FolioError, FolioResult};

const DEFAULT_CONFIG_NAME: &str = "folio.json";
const DEFAULT_SQLITE_NAME: &str = "folio.sqlite";

pub const DEFAULT_FEED_ROWS: u32 = 100;
pub const MAX_FEED_ROWS: u32 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdsConfig {
    /// Epoch millis the id generator counts from.
    pub base_time_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    pub default_rows: Option<u32>,
    pub max_rows: Option<u32>,
    pub poll_interval_ms: Option<u64>,
}

impl FeedConfig {
    pub fn with_defaults() -> Self {
        Self {
            default_rows: Some(DEFAULT_FEED_ROWS),
            max_rows: Some(MAX_FEED_ROWS),
            poll_interval_ms: Some(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Feed limits with every default applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FeedSettings {
    pub default_rows: u32,
    pub max_rows: u32,
    pub poll_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            default_rows: DEFAULT_FEED_ROWS,
            max_rows: MAX_FEED_ROWS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl FeedSettings {
    /// Applies the default when `requested` is absent and clamps to `1..=max_rows`.
    pub fn clamp_rows(&self, requested: Option<u32>) -> u32 {
        let max = self.max_rows.max(1);
        requested.unwrap_or(self.default_rows).clamp(1, max)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolioConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub ids: Option<IdsConfig>,
    pub feed: Option<FeedConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl FolioConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            ids: Some(IdsConfig {
                base_time_ms: Some(DEFAULT_BASE_TIME_MS),
            }),
            feed: Some(FeedConfig::with_defaults()),
            failpoints: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> FolioResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| FolioError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| FolioError::storage(format!("read config: {err}")))?;
            let config: FolioConfig = serde_json::from_str(&raw)
                .map_err(|err| FolioError::configuration(err.to_string()))?;
            return Ok(config);
        }
        let default = FolioConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| FolioError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| FolioError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> FolioResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SQLITE_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(FolioError::configuration("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn base_time_ms(&self) -> i64 {
        self.ids
            .as_ref()
            .and_then(|ids| ids.base_time_ms)
            .unwrap_or(DEFAULT_BASE_TIME_MS)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        let defaults = FeedSettings::default();
        let Some(feed) = &self.feed else {
            return defaults;
        };
        FeedSettings {
            default_rows: feed.default_rows.unwrap_or(defaults.default_rows),
            max_rows: feed.max_rows.unwrap_or(defaults.max_rows),
            poll_interval: feed
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }

    pub fn with_failpoints<I, S>(mut self, failpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failpoints = Some(failpoints.into_iter().map(Into::into).collect());
        self
    }
}
