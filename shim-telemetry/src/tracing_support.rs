//! Structured tracing setup.

use anyhow::{Context, anyhow};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputGate, StreamTarget};

/// Filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the global fmt subscriber writing to gated standard error.
///
/// # Errors
///
/// Returns an error when `filter` is not a valid directive list or a global
/// subscriber is already installed.
pub fn init(filter: &str, gate: &OutputGate) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter).with_context(|| format!("invalid log filter `{filter}`"))?;
    let gate = gate.clone();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(move || gate.writer(StreamTarget::Stderr))
        .try_init()
        .map_err(|err| anyhow!(err))
}
