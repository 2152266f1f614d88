//! Observability utilities for the tool shim.
//!
//! Logs and tool diagnostics share the process's standard streams with the
//! single JSON response, so everything written here passes through an
//! [`OutputGate`] that the harness closes while a tool runs.

#![warn(missing_docs, clippy::pedantic)]

pub mod output;
pub mod tracing_support;

pub use output::{Console, GatedWriter, OutputGate, StreamTarget, SuppressionGuard};
pub use tracing_support::{DEFAULT_LOG_FILTER, init};
