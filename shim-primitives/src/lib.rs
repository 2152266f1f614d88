//! Core shared types for the capability-enforcing tool shim.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod error;
mod ids;
mod secrets;

/// Capability families, guarantee keys, and check reason codes.
pub use capability::{AccessMode, Capability, GuaranteeKey, ReasonCode};
/// Error type and result alias shared across the shim.
pub use error::{Error, Result};
/// Unique identifier for a single tool invocation.
pub use ids::InvocationId;
/// Secret alias table used to classify environment keys.
pub use secrets::{SECRET_ALIASES, canonical_secret_name};
