//! Tracing/logging initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with an env-filter, defaulting to debug output for
/// this crate. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
