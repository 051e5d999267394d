//! Tracing subscriber setup

use arsync_core::{ArError, ArResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::LogConfig;

/// Build the filter: `RUST_LOG` when set, the configured directives otherwise
pub fn env_filter(config: &LogConfig) -> ArResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ArError::Config(format!("log filter {:?}: {}", config.filter, e))),
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> ArResult<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|e| ArError::Config(e.to_string()))
}
