//! Configuration layer: typed settings with layered precedence (file → env).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[cfg(test)]
mod tests;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "parlato";
const DEFAULT_STORAGE_ROOT: &str = "artifact-cache";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_GATEWAY_URL_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
    #[error("missing required setting `{field}`")]
    Missing { field: &'static str },
}

impl LoadError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    fn missing(field: &'static str) -> Self {
        Self::Missing { field }
    }
}

/// Fully validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// Which blob store backend to run, with its connection parameters.
#[derive(Debug, Clone)]
pub enum StorageSettings {
    Fs {
        root: PathBuf,
    },
    Gateway {
        endpoint: String,
        container: String,
        account_key: Vec<u8>,
        url_ttl: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Postgres connection string; absent when the embedding application
    /// runs the in-memory metadata store instead.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSettings {
    #[serde(default)]
    pub(crate) storage: RawStorageSettings,
    #[serde(default)]
    pub(crate) database: RawDatabaseSettings,
    #[serde(default)]
    pub(crate) logging: RawLoggingSettings,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawStorageSettings {
    pub(crate) backend: Option<String>,
    pub(crate) root: Option<PathBuf>,
    pub(crate) endpoint: Option<String>,
    pub(crate) container: Option<String>,
    /// Base64-encoded gateway account key.
    pub(crate) account_key: Option<String>,
    pub(crate) url_ttl_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawDatabaseSettings {
    pub(crate) url: Option<String>,
    pub(crate) max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawLoggingSettings {
    pub(crate) level: Option<String>,
    pub(crate) json: Option<bool>,
}

/// Load settings from the layered sources: bundled defaults file, local
/// file, an optional explicit file, then `PARLATO__`-prefixed environment
/// variables.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PARLATO").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    pub(crate) fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            storage: build_storage_settings(raw.storage)?,
            database: build_database_settings(raw.database),
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    match storage.backend.as_deref().unwrap_or("fs") {
        "fs" => Ok(StorageSettings::Fs {
            root: storage
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
        }),
        "gateway" => {
            let endpoint = storage
                .endpoint
                .ok_or_else(|| LoadError::missing("storage.endpoint"))?;
            let container = storage
                .container
                .ok_or_else(|| LoadError::missing("storage.container"))?;
            let encoded = storage
                .account_key
                .ok_or_else(|| LoadError::missing("storage.account_key"))?;
            let account_key = BASE64_STANDARD.decode(encoded.as_bytes()).map_err(|err| {
                LoadError::invalid("storage.account_key", format!("not valid base64: {err}"))
            })?;
            let url_ttl = Duration::from_secs(
                storage
                    .url_ttl_seconds
                    .unwrap_or(DEFAULT_GATEWAY_URL_TTL_SECS),
            );

            Ok(StorageSettings::Gateway {
                endpoint,
                container,
                account_key,
                url_ttl,
            })
        }
        other => Err(LoadError::invalid(
            "storage.backend",
            format!("unknown backend `{other}`, expected `fs` or `gateway`"),
        )),
    }
}

fn build_database_settings(database: RawDatabaseSettings) -> DatabaseSettings {
    DatabaseSettings {
        url: database.url,
        max_connections: database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}
