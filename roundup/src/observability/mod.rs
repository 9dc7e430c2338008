//! Log subscriber setup.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary or test that drives a run.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::{RoundupError, RoundupResult};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the level filter from `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global fmt subscriber, human-readable or JSON.
///
/// # Errors
///
/// Returns [`RoundupError::Tracing`] if a global subscriber is already set.
pub fn init_tracing(json: bool) -> RoundupResult<()> {
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(env_filter()))
        .try_init()
        .map_err(|e| RoundupError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let first = init_tracing(false);
        let second = init_tracing(true);
        assert!(first.is_ok() || second.is_err());
        assert!(matches!(second, Err(RoundupError::Tracing(_))));
    }
}
