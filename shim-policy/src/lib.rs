//! Capability policy evaluation for tool invocations.
//!
//! The resolver turns an untyped capability context into typed guarantees, the
//! enforcement session records every capability decision, and the guard
//! functions decide whether an attempted host operation may proceed.

#![warn(missing_docs, clippy::pedantic)]

pub mod contracts;
pub mod decision;
pub mod engine;
pub mod message;

pub use contracts::{CapabilityContext, GuaranteeOrigins, Guarantees, resolve_context};
pub use decision::{CapabilityCheck, CapabilityViolation, PolicyResult};
pub use engine::EnforcementSession;
pub use message::build_block_message;
