//! Tracing subscriber setup for applications embedding the crate

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the filter is
/// `playlist_ingest=<level>`. If a global subscriber is already installed
/// this does nothing.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("playlist_ingest={}", config.level))
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let json_layer = config.json.then(|| fmt::layer().json());
    let plain_layer = (!config.json).then(fmt::layer);

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .try_init()
    {
        debug!("Tracing subscriber already installed: {}", e);
    }

    Ok(())
}
