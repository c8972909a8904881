#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "tubegrab=info,server=info";

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the default
/// filter. Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
