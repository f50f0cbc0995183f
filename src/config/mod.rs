use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ingestor::m3u_parser::ParserOptions;

pub mod defaults;
pub mod duration_serde;

pub use defaults::*;
pub use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub epg: EpgConfig,
    #[serde(default)]
    pub parser: ParserOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    /// Directory for in-flight downloads, next to the cache file when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistConfig {
    /// Fixed playlist URL; takes precedence over the device backend
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_playlist_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_playlist_read_timeout", with = "duration")]
    pub read_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpgConfig {
    #[serde(default = "default_epg_enabled")]
    pub enabled: bool,
    /// Guide URL; when unset it comes from the playlist header or is derived
    /// from the playlist URL
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_epg_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_epg_read_timeout", with = "duration")]
    pub read_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_json")]
    pub json: bool,
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_FILE)
}

fn default_playlist_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PLAYLIST_CONNECT_TIMEOUT_SECS)
}

fn default_playlist_read_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PLAYLIST_READ_TIMEOUT_SECS)
}

fn default_epg_enabled() -> bool {
    DEFAULT_EPG_ENABLED
}

fn default_epg_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_EPG_CONNECT_TIMEOUT_SECS)
}

fn default_epg_read_timeout() -> Duration {
    Duration::from_secs(DEFAULT_EPG_READ_TIMEOUT_SECS)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_json() -> bool {
    DEFAULT_LOG_JSON
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            temp_dir: None,
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            url: None,
            backend_url: None,
            device_id: None,
            connect_timeout: default_playlist_connect_timeout(),
            read_timeout: default_playlist_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            enabled: default_epg_enabled(),
            url: None,
            connect_timeout: default_epg_connect_timeout(),
            read_timeout: default_epg_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_log_json(),
        }
    }
}

impl Config {
    /// Load from the file named by `CONFIG_FILE`, or the default file name
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Merge defaults, the TOML file and `PLAYLIST_INGEST_` environment
    /// variables (`__` separates nested keys). A missing file is created with
    /// the defaults.
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        if !config_file.exists() {
            Self::write_default(config_file)?;
            info!("Created default config file: {}", config_file.display());
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", config_file.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the default configuration as TOML into `path`
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(&Config::default())?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.parser.partial_snapshot_interval == 0 {
            bail!("parser.partial_snapshot_interval must be greater than zero");
        }
        if self.parser.read_buffer_bytes == 0 {
            bail!("parser.read_buffer_bytes must be greater than zero");
        }
        if self.parser.max_line_bytes == 0 {
            bail!("parser.max_line_bytes must be greater than zero");
        }

        let timeouts = [
            ("playlist.connect_timeout", self.playlist.connect_timeout),
            ("playlist.read_timeout", self.playlist.read_timeout),
            ("epg.connect_timeout", self.epg.connect_timeout),
            ("epg.read_timeout", self.epg.read_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }

        Ok(())
    }
}
