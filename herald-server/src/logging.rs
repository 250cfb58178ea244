//! Structured logging initialisation.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use herald_core::config::LoggingSettings;

/// Initialises the global tracing subscriber.
///
/// The filter honours `RUST_LOG` when set and falls back to the configured
/// level. Call once at startup; a second call is a no-op.
pub fn init_logging(settings: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json {
        registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    // Already initialised (tests, embedding); keep the existing subscriber.
    drop(result);
}
