/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Config file
pub const DEFAULT_CONFIG_FILE: &str = "playlist-ingest.toml";
pub const ENV_PREFIX: &str = "PLAYLIST_INGEST_";

// Storage defaults
pub const DEFAULT_CACHE_FILE: &str = "./data/playlist_cache.m3u";

// Playlist download defaults
pub const DEFAULT_PLAYLIST_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PLAYLIST_READ_TIMEOUT_SECS: u64 = 120;

// Guide download defaults
pub const DEFAULT_EPG_ENABLED: bool = true;
pub const DEFAULT_EPG_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EPG_READ_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_USER_AGENT: &str = concat!("playlist-ingest/", env!("CARGO_PKG_VERSION"));

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_JSON: bool = false;
