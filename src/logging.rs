//! Structured logging setup for hosts embedding the gateway.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's decision. `init_logging` is what the bundled binary uses.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global `tracing` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG` (e.g. `RUST_LOG=exec_gateway=debug`),
/// falling back to [`DEFAULT_FILTER`]. `json` selects one JSON object per
/// event instead of the compact human format.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .try_init()?;
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()?;
    }

    Ok(())
}
