//! Logging initialization for the webhook binary.
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// If no environment variable is provided, the maximum log level is set to
/// INFO.
pub fn initialize_logging(env: &str) {
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        _ => EnvFilter::new(tracing::Level::INFO.to_string()),
    };

    let fmt = tracing_subscriber::fmt::layer();
    Registry::default().with(filter).with(fmt).init();
}
