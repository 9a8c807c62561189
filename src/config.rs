use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub const DEFAULT_CONFIG_FILE: &str = "acqcat.json";
pub const ENV_PREFIX: &str = "ACQCAT_";

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub database_file: Option<String>,
    #[serde(default)]
    pub repository_path: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_format: Option<LogFormat>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source: Option<PathBuf>,
    pub database_file: Utf8PathBuf,
    pub repository_path: Utf8PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
    pub request_timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        let (config, source) = if path.is_none() && !config_path.exists() {
            (Config::default(), None)
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
            (config, Some(config_path))
        };

        let config = Self::apply_overrides(config, |key| std::env::var(key).ok())?;
        let mut resolved = Self::resolve_config(config)?;
        resolved.source = source;
        Ok(resolved)
    }

    pub fn apply_overrides(
        mut config: Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, CatalogError> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(value) = var("DATABASE_FILE") {
            config.database_file = Some(value);
        }
        if let Some(value) = var("REPOSITORY_PATH") {
            config.repository_path = Some(value);
        }
        if let Some(value) = var("LOG_LEVEL") {
            config.log_level = Some(value);
        }
        if let Some(value) = var("REQUEST_TIMEOUT_SECS") {
            let secs = value.trim().parse().map_err(|_| {
                CatalogError::ConfigParse(format!("{ENV_PREFIX}REQUEST_TIMEOUT_SECS: {value:?}"))
            })?;
            config.request_timeout_secs = Some(secs);
        }
        Ok(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let request_timeout_secs = config.request_timeout_secs.unwrap_or(60);
        if request_timeout_secs == 0 {
            return Err(CatalogError::ConfigParse(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            source: None,
            database_file: config
                .database_file
                .map(Utf8PathBuf::from)
                .unwrap_or_else(default_database_file),
            repository_path: Utf8PathBuf::from(config.repository_path.unwrap_or_else(|| ".".into())),
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            log_format: config.log_format.unwrap_or_default(),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

pub fn default_database_file() -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_dir().join("acq-catalog").join("catalog.sqlite3"))
                .ok()
        })
        .unwrap_or_else(|| Utf8PathBuf::from("catalog.sqlite3"))
}
