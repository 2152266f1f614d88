//! Request and response documents exchanged over standard I/O.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use shim_policy::CapabilityCheck;
use shim_primitives::ReasonCode;
use shim_tools::ToolError;
use thiserror::Error;

/// Protocol version reported when the request carries none.
pub const DEFAULT_PROTOCOL_VERSION: i64 = 1;

/// Error type reported for transport failures.
pub const PROTOCOL_ERROR_TYPE: &str = "ProtocolError";

/// Failures reading or interpreting the request document.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Standard input could not be read as UTF-8.
    #[error("failed to read request: {0}")]
    Read(#[from] std::io::Error),
    /// The input is not a JSON document.
    #[error("invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The document is valid JSON but not an object.
    #[error("request must be a JSON object")]
    NotAnObject,
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Parsed invocation request.
///
/// Only the shape of the top level is checked; unknown fields are ignored and
/// the raw document is kept for capability context resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    raw: Value,
}

impl InvocationRequest {
    /// Parses a request document.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] for malformed JSON and
    /// [`ProtocolError::NotAnObject`] when the top level is not an object.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        Self::from_value(serde_json::from_str(input)?)
    }

    /// Wraps an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotAnObject`] when `raw` is not an object.
    pub fn from_value(raw: Value) -> ProtocolResult<Self> {
        if raw.is_object() {
            Ok(Self { raw })
        } else {
            Err(ProtocolError::NotAnObject)
        }
    }

    fn fields(&self) -> Option<&Map<String, Value>> {
        self.raw.as_object()
    }

    /// Entry string; empty when absent or not a string.
    #[must_use]
    pub fn entry(&self) -> &str {
        self.fields()
            .and_then(|fields| fields.get("entry"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Payload passed to the tool; `null` when absent.
    #[must_use]
    pub fn payload(&self) -> Value {
        self.fields()
            .and_then(|fields| fields.get("payload"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Module roots named by the request, skipping non-string items.
    #[must_use]
    pub fn module_paths(&self) -> Option<Vec<PathBuf>> {
        let paths = self.fields()?.get("module_paths")?.as_array()?;
        Some(
            paths
                .iter()
                .filter_map(Value::as_str)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
                .collect(),
        )
    }

    /// Protocol version named by the request, if it is an integer.
    #[must_use]
    pub fn protocol_version(&self) -> Option<i64> {
        self.fields()?.get("protocol_version")?.as_i64()
    }

    /// The raw request document.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Structured error in a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason_code: Option<ReasonCode>,
}

impl ErrorBody {
    /// Creates an error body.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            reason_code: None,
        }
    }

    /// Error body for a transport failure.
    #[must_use]
    pub fn protocol(err: &ProtocolError) -> Self {
        Self::new(PROTOCOL_ERROR_TYPE, err.to_string())
    }

    /// Error type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Reason code carried by capability violations.
    #[must_use]
    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.reason_code
    }
}

impl From<&ToolError> for ErrorBody {
    fn from(err: &ToolError) -> Self {
        Self {
            kind: err.type_name().to_owned(),
            message: err.to_string(),
            reason_code: err.reason_code(),
        }
    }
}

/// The single document written for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    protocol_version: i64,
    capability_checks: Vec<CapabilityCheck>,
}

impl InvocationResponse {
    /// Successful response carrying the tool's result.
    #[must_use]
    pub fn success(result: Value, protocol_version: i64, checks: Vec<CapabilityCheck>) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
            protocol_version,
            capability_checks: checks,
        }
    }

    /// Failure response.
    #[must_use]
    pub fn failure(error: ErrorBody, protocol_version: i64, checks: Vec<CapabilityCheck>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
            protocol_version,
            capability_checks: checks,
        }
    }

    /// Whether the tool call succeeded.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Tool result on success.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Error on failure.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorBody> {
        self.error.as_ref()
    }

    /// Reported protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> i64 {
        self.protocol_version
    }

    /// Checks recorded during the invocation.
    #[must_use]
    pub fn capability_checks(&self) -> &[CapabilityCheck] {
        &self.capability_checks
    }

    /// Serialises the response as one JSON document.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shim_primitives::Capability;

    #[test]
    fn request_fields_are_read_leniently() {
        let request = InvocationRequest::parse(
            r#"{"entry":"tools/echo:run","payload":{"a":1},"module_paths":["/srv",3,""],"protocol_version":2}"#,
        )
        .unwrap();

        assert_eq!(request.entry(), "tools/echo:run");
        assert_eq!(request.payload(), json!({ "a": 1 }));
        assert_eq!(request.module_paths(), Some(vec![PathBuf::from("/srv")]));
        assert_eq!(request.protocol_version(), Some(2));

        let sparse = InvocationRequest::parse(r#"{"entry":7}"#).unwrap();
        assert_eq!(sparse.entry(), "");
        assert_eq!(sparse.payload(), Value::Null);
        assert_eq!(sparse.module_paths(), None);
        assert_eq!(sparse.protocol_version(), None);
    }

    #[test]
    fn non_object_requests_are_rejected() {
        assert!(matches!(InvocationRequest::parse("[1]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(InvocationRequest::parse("{"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn success_keeps_null_results() {
        let response = InvocationResponse::success(Value::Null, 1, Vec::new());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "ok": true, "result": null, "protocol_version": 1, "capability_checks": [] })
        );
    }

    #[test]
    fn failure_includes_reason_code_only_when_present() {
        let check = CapabilityCheck::deny(Capability::Subprocess, "pack", ReasonCode::GuaranteeBlocked);
        let mut body = ErrorBody::new("CapabilityViolation", "blocked");
        body.reason_code = Some(ReasonCode::GuaranteeBlocked);
        let response = InvocationResponse::failure(body, 3, vec![check]);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "ok": false,
                "error": { "type": "CapabilityViolation", "message": "blocked", "reason_code": "guarantee_blocked" },
                "protocol_version": 3,
                "capability_checks": [{
                    "capability": "subprocess",
                    "allowed": false,
                    "guarantee_source": "pack",
                    "reason": "guarantee_blocked"
                }]
            })
        );

        let plain = InvocationResponse::failure(ErrorBody::new("Error", "Invalid entry"), 1, Vec::new());
        assert_eq!(
            serde_json::to_value(&plain).unwrap()["error"],
            json!({ "type": "Error", "message": "Invalid entry" })
        );
    }
}
