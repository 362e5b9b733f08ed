//! Tracing setup for the `deckgate` binary.
//!
//! The library only emits events; installing a subscriber is left to the
//! binary (or to whatever web layer embeds the core).

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "deckgate=info";

/// Filter used with `--verbose`.
pub const VERBOSE_LOG_FILTER: &str = "deckgate=debug";

/// Filter directive to start from. `RUST_LOG` wins when it is set.
pub fn filter_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for command output.
pub fn init(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow!("failed to set global default subscriber: {e}"))
}
