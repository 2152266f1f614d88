//! Errors raised while locating, loading, and running tools.

use std::path::PathBuf;

use shim_policy::CapabilityViolation;
use shim_primitives::ReasonCode;
use thiserror::Error;

use crate::sandbox::AccessError;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced by tool resolution and execution.
///
/// Every variant maps to the `type` string reported in an error response via
/// [`ToolError::type_name`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// A guard denied a capability.
    #[error(transparent)]
    Violation(#[from] CapabilityViolation),

    /// A host operation failed after passing its guard.
    #[error(transparent)]
    Access(AccessError),

    /// The entry string was not `<locator>:<function>`.
    #[error("Invalid entry")]
    InvalidEntry {
        /// Raw entry as received.
        entry: String,
    },

    /// No module matched the locator.
    #[error("Cannot find module '{locator}'")]
    ModuleNotFound {
        /// Locator or module id that failed to resolve.
        locator: String,
    },

    /// The module loaded but no callable export matched the function name.
    #[error("Entry target is not callable")]
    NotCallable {
        /// Entry being invoked.
        entry: String,
    },

    /// A translated source was found but no translator is configured.
    #[error("no source translator is available for {}", path.display())]
    TranslatorUnavailable {
        /// Resolved source path.
        path: PathBuf,
    },

    /// The translator rejected a source file.
    #[error("failed to translate {}: {reason}", path.display())]
    Translation {
        /// Resolved source path.
        path: PathBuf,
        /// Translator diagnostic.
        reason: String,
    },

    /// An export slot was registered twice for the same module.
    #[error("export `{export}` is already registered for module `{module}`")]
    DuplicateExport {
        /// Module id.
        module: String,
        /// Slot description.
        export: String,
    },

    /// Tool code failed with its own error kind.
    #[error("{message}")]
    Failed {
        /// Reported error type.
        kind: String,
        /// Human-readable message.
        message: String,
    },

    /// Tool code panicked.
    #[error("{message}")]
    Panic {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ToolError {
    /// Creates a tool failure reported with the generic `Error` type.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::failed("Error", message)
    }

    /// Creates a tool failure reported with a custom error type.
    #[must_use]
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Error type string reported to the caller.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Violation(_) => "CapabilityViolation",
            Self::Access(err) => err.type_name(),
            Self::InvalidEntry { .. } => "Error",
            Self::ModuleNotFound { .. } => "ModuleNotFound",
            Self::NotCallable { .. } => "TypeError",
            Self::TranslatorUnavailable { .. } => "TranslatorUnavailable",
            Self::Translation { .. } => "TranslationError",
            Self::DuplicateExport { .. } => "RegistryError",
            Self::Failed { kind, .. } => kind,
            Self::Panic { .. } => "Panic",
        }
    }

    /// Reason code of a capability violation, if this is one.
    #[must_use]
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Self::Violation(violation) => Some(violation.reason_code()),
            _ => None,
        }
    }
}

impl From<AccessError> for ToolError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Violation(violation) => Self::Violation(violation),
            other => Self::Access(other),
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::Access(AccessError::Io(err))
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::failed("SyntaxError", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shim_policy::CapabilityCheck;
    use shim_primitives::Capability;

    #[test]
    fn violations_keep_their_type_through_access_errors() {
        let check = CapabilityCheck::deny(Capability::Network, "pack", ReasonCode::GuaranteeBlocked);
        let violation = CapabilityViolation::new("blocked", check);
        let err = ToolError::from(AccessError::Violation(violation));

        assert_eq!(err.type_name(), "CapabilityViolation");
        assert_eq!(err.reason_code(), Some(ReasonCode::GuaranteeBlocked));
        assert_eq!(err.to_string(), "blocked");
    }

    #[test]
    fn resolution_errors_use_stable_type_names() {
        let invalid = ToolError::InvalidEntry { entry: "x".into() };
        assert_eq!(invalid.type_name(), "Error");
        assert_eq!(invalid.to_string(), "Invalid entry");

        let missing = ToolError::NotCallable { entry: "tools/a:b".into() };
        assert_eq!(missing.type_name(), "TypeError");
        assert_eq!(missing.to_string(), "Entry target is not callable");
        assert_eq!(missing.reason_code(), None);
    }

    #[test]
    fn custom_failures_report_their_kind() {
        let err = ToolError::failed("RangeError", "too big");
        assert_eq!(err.type_name(), "RangeError");
        assert_eq!(err.to_string(), "too big");
    }
}
