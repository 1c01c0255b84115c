//! Tracing initialization.
//!
//! Sets up tracing-subscriber with console output and an `RUST_LOG`-style
//! environment filter. All failure reporting in the crate goes through
//! structured tracing events rather than ad-hoc printing, so rejection
//! traffic and infrastructure errors can be filtered apart.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Defaults to `info` when `RUST_LOG` is unset.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
