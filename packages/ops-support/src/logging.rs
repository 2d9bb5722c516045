//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(crate_name: &str) -> String {
    format!("{crate_name}=info,ops_support=info,tower_http=info")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `fallback_filter`. Calling this twice is harmless; the
/// second subscriber is dropped.
pub fn init(format: LogFormat, fallback_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter));

    let result = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .try_init(),
    };

    if let Err(err) = result {
        tracing::warn!("tracing already initialised, skipping duplicate subscriber: {err}");
    }
}
