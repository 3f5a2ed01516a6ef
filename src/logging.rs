//! Process-wide log output.
//!
//! The domain crates log through the `log` facade; the subscriber
//! installed here bridges those records and formats everything, as text
//! or (with the `logs-json` feature) as JSON lines.

use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the filter: `RUST_LOG` when set and valid, otherwise
/// `default_directive`.
pub fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber.  Fails if one is already installed.
pub fn init(default_directive: &str) -> Result<(), InitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_directive))
        .with_target(true);

    #[cfg(feature = "logs-json")]
    let result = builder.json().try_init();
    #[cfg(not(feature = "logs-json"))]
    let result = builder.try_init();

    result
}
