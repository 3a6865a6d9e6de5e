//! Tracing subscriber bootstrap.

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a JSON subscriber filtered by `RUST_LOG`.
///
/// A subscriber that is already installed is left in place and the failure
/// is logged as a warning.
pub fn init() {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(std::io::stderr)
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }
}
