//! Opt-in tracing subscriber.
//!
//! The library only emits `tracing` events; applications that already install
//! a subscriber should not call [`init`].

use tracing_subscriber::EnvFilter;

use crate::config::FeedConfig;

/// Installs a `fmt` subscriber when `config.logging_enabled` is set.
///
/// The filter comes from `RUST_LOG` when present, else `config.log_filter`.
/// Returns `true` only if this call installed the global subscriber; a second
/// call, or one made after another subscriber was set, is a no-op.
pub fn init(config: &FeedConfig) -> bool {
    if !config.logging_enabled {
        return false;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
