//! Capability checks recorded by guards and the violation raised on denial.

use serde::{Deserialize, Serialize};
use shim_primitives::{Capability, ReasonCode};
use thiserror::Error;

/// Result alias for guard evaluations.
pub type PolicyResult<T> = Result<T, CapabilityViolation>;

/// One recorded allow/deny decision for an attempted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCheck {
    capability: Capability,
    allowed: bool,
    guarantee_source: String,
    reason: ReasonCode,
}

impl CapabilityCheck {
    /// Returns an allowing check.
    #[must_use]
    pub fn allow(capability: Capability, source: impl Into<String>, reason: ReasonCode) -> Self {
        Self {
            capability,
            allowed: true,
            guarantee_source: source.into(),
            reason,
        }
    }

    /// Returns a denying check.
    #[must_use]
    pub fn deny(capability: Capability, source: impl Into<String>, reason: ReasonCode) -> Self {
        Self {
            capability,
            allowed: false,
            guarantee_source: source.into(),
            reason,
        }
    }

    /// Capability family the check concerns.
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Whether the operation was permitted.
    #[must_use]
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Override layer that produced the deciding guarantee.
    #[must_use]
    pub fn guarantee_source(&self) -> &str {
        &self.guarantee_source
    }

    /// Reason code for the decision.
    #[must_use]
    pub fn reason(&self) -> ReasonCode {
        self.reason
    }
}

/// Raised by a guard when a guarantee forbids the attempted operation.
///
/// The wrapped operation never runs once this has been returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CapabilityViolation {
    message: String,
    check: CapabilityCheck,
}

impl CapabilityViolation {
    /// Creates a violation from its remediation message and denying check.
    #[must_use]
    pub fn new(message: impl Into<String>, check: CapabilityCheck) -> Self {
        Self {
            message: message.into(),
            check,
        }
    }

    /// Remediation message shown to the caller.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The denying check.
    #[must_use]
    pub fn check(&self) -> &CapabilityCheck {
        &self.check
    }

    /// Reason code to report as `error.reason_code`.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        self.check.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_serializes_wire_shape() {
        let check = CapabilityCheck::deny(Capability::Subprocess, "pack", ReasonCode::GuaranteeBlocked);
        assert_eq!(
            serde_json::to_value(&check).unwrap(),
            json!({
                "capability": "subprocess",
                "allowed": false,
                "guarantee_source": "pack",
                "reason": "guarantee_blocked"
            })
        );
    }

    #[test]
    fn violation_exposes_reason_code() {
        let check = CapabilityCheck::deny(Capability::Secrets, "user", ReasonCode::SecretsBlocked);
        let violation = CapabilityViolation::new("blocked", check);
        assert_eq!(violation.reason_code(), ReasonCode::SecretsBlocked);
        assert_eq!(violation.to_string(), "blocked");
        assert!(!violation.check().allowed());
    }
}
