use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub runner: RunnerConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for connector scratch directories (fetched files, rewritten
    /// files). Each connector type owns one subdirectory.
    pub scratch_path: PathBuf,
    /// Root the local directory target resolves its relative paths against.
    pub data_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Calendar used for recurrence arithmetic unless a call overrides it.
    pub timezone: chrono_tz::Tz,
    /// Seconds between passes in daemon mode.
    pub tick_interval_secs: u64,
    /// Substituted for %%USERID%% in database source queries.
    pub query_user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./etl-runner.db".to_string(),
                max_connections: Some(10),
            },
            storage: StorageConfig {
                scratch_path: PathBuf::from("./data/scratch"),
                data_root: PathBuf::from("./data/out"),
            },
            runner: RunnerConfig {
                timezone: chrono_tz::UTC,
                tick_interval_secs: 60,
                query_user_id: 0,
            },
            notifications: NotificationConfig {
                enabled: false,
                smtp_host: "localhost".to_string(),
                smtp_port: 25,
                from_address: "etl-runner@localhost".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.scratch_path)?;
            std::fs::create_dir_all(&default_config.storage.data_root)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}
