//! Capability-enforcing tool execution shim.
//!
//! The `toolshim` binary is a one-shot worker: it reads a single JSON request
//! from standard input, runs the named tool under the request's capability
//! guarantees, and writes a single JSON response. This crate bundles the
//! runtime crates behind feature flags and ships the built-in tool modules.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use shim_primitives as primitives;

/// Invocation harness (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use shim_kernel as kernel;

/// Module registry and guarded host I/O (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use shim_tools as tools;

/// Guarantee resolution and guards (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use shim_policy as policy;

/// Output gate and logging (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use shim_telemetry as telemetry;

/// Harness configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use shim_config as config;

#[cfg(feature = "tools")]
pub mod builtin;
