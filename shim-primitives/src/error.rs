//! Shared error definitions for shim primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the shim.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided invocation identifier could not be parsed.
    #[error("invalid invocation id: {source}")]
    InvalidInvocationId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A capability name did not match any known family.
    #[error("unknown capability `{name}`")]
    UnknownCapability {
        /// The offending name.
        name: String,
    },
}
