//! Execution harness for the tool shim.
//!
//! A [`Harness`] reads one JSON request, resets the enforcement session from
//! the request's capability context, installs guarded accessors when a
//! context is present, resolves and invokes the entry point with standard
//! output silenced, and writes one JSON response.

#![warn(missing_docs, clippy::pedantic)]

pub mod harness;
pub mod lifecycle;
pub mod protocol;

pub use harness::{EXIT_OK, EXIT_PROTOCOL_FAILURE, Harness, Outcome};
pub use lifecycle::{Invocation, InvocationPhase, LifecycleError, LifecycleResult, PhaseEvent};
pub use protocol::{
    DEFAULT_PROTOCOL_VERSION, ErrorBody, InvocationRequest, InvocationResponse, PROTOCOL_ERROR_TYPE,
    ProtocolError, ProtocolResult,
};
