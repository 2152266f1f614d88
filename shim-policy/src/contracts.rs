//! Capability context contracts and the guarantee resolver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shim_primitives::{Capability, GuaranteeKey};
use tracing::debug;

const DEFAULT_TOOL_NAME: &str = "tool";
const DEFAULT_RESOLVED_SOURCE: &str = "binding";
const DEFAULT_RUNNER: &str = "native";
const DEFAULT_SOURCE: &str = "pack";

/// Normalised guarantee set for one invocation.
///
/// Every restriction defaults to "not denied"; `secrets_allowed` of `None`
/// means every secret is reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantees {
    /// Forbids filesystem reads.
    pub no_filesystem_read: bool,
    /// Forbids filesystem writes.
    pub no_filesystem_write: bool,
    /// Forbids network access.
    pub no_network: bool,
    /// Forbids subprocess creation.
    pub no_subprocess: bool,
    /// Forbids environment reads.
    pub no_env_read: bool,
    /// Forbids environment writes.
    pub no_env_write: bool,
    /// Canonical secret names that may be accessed, or `None` for no restriction.
    pub secrets_allowed: Option<Vec<String>>,
}

impl Guarantees {
    /// Coerces an untyped guarantees object.
    ///
    /// Booleans are set only for a literal JSON `true`. `secrets_allowed` is kept
    /// only when it is an array, with every element converted to a string.
    #[must_use]
    pub fn from_value(raw: Option<&Value>) -> Self {
        let Some(Value::Object(raw)) = raw else {
            return Self::default();
        };
        let flag = |key: GuaranteeKey| matches!(raw.get(key.as_str()), Some(Value::Bool(true)));
        let secrets_allowed = match raw.get(GuaranteeKey::SecretsAllowed.as_str()) {
            Some(Value::Array(items)) => Some(items.iter().map(stringify).collect()),
            _ => None,
        };

        Self {
            no_filesystem_read: flag(GuaranteeKey::NoFilesystemRead),
            no_filesystem_write: flag(GuaranteeKey::NoFilesystemWrite),
            no_network: flag(GuaranteeKey::NoNetwork),
            no_subprocess: flag(GuaranteeKey::NoSubprocess),
            no_env_read: flag(GuaranteeKey::NoEnvRead),
            no_env_write: flag(GuaranteeKey::NoEnvWrite),
            secrets_allowed,
        }
    }

    /// Returns `true` when the boolean guarantee for `capability` is set.
    ///
    /// Secrets are governed by the allow-list rather than a boolean, so this
    /// always returns `false` for [`Capability::Secrets`].
    #[must_use]
    pub fn denies(&self, capability: Capability) -> bool {
        match capability {
            Capability::FilesystemRead => self.no_filesystem_read,
            Capability::FilesystemWrite => self.no_filesystem_write,
            Capability::Network => self.no_network,
            Capability::Subprocess => self.no_subprocess,
            Capability::EnvRead => self.no_env_read,
            Capability::EnvWrite => self.no_env_write,
            Capability::Secrets => false,
        }
    }

    /// Returns the secret allow-list, if restricted.
    #[must_use]
    pub fn secrets_allowed(&self) -> Option<&[String]> {
        self.secrets_allowed.as_deref()
    }

    /// Sets the boolean guarantee restricting `capability`.
    #[must_use]
    pub fn deny(mut self, capability: Capability) -> Self {
        match capability {
            Capability::FilesystemRead => self.no_filesystem_read = true,
            Capability::FilesystemWrite => self.no_filesystem_write = true,
            Capability::Network => self.no_network = true,
            Capability::Subprocess => self.no_subprocess = true,
            Capability::EnvRead => self.no_env_read = true,
            Capability::EnvWrite => self.no_env_write = true,
            Capability::Secrets => self.secrets_allowed = Some(Vec::new()),
        }
        self
    }

    /// Restricts secret access to the supplied canonical names.
    #[must_use]
    pub fn with_secrets_allowed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets_allowed = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Which override layer produced each guarantee. Diagnostic only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuaranteeOrigins(BTreeMap<String, String>);

impl GuaranteeOrigins {
    /// Keeps every non-empty string entry of an untyped `sources` object.
    #[must_use]
    pub fn from_value(raw: Option<&Value>) -> Self {
        let Some(Value::Object(raw)) = raw else {
            return Self::default();
        };
        let origins = raw
            .iter()
            .filter_map(|(key, value)| match value {
                Value::String(source) if !source.is_empty() => Some((key.clone(), source.clone())),
                _ => None,
            })
            .collect();
        Self(origins)
    }

    /// Records the layer that set `key`.
    #[must_use]
    pub fn with_source(mut self, key: GuaranteeKey, source: impl Into<String>) -> Self {
        self.0.insert(key.as_str().to_owned(), source.into());
        self
    }

    /// Returns the layer responsible for the guarantee behind `capability`.
    #[must_use]
    pub fn source_for(&self, capability: Capability) -> &str {
        self.0
            .get(capability.guarantee_key().as_str())
            .map_or(DEFAULT_SOURCE, String::as_str)
    }
}

/// Typed capability context supplied by the orchestrator for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityContext {
    tool_name: String,
    resolved_source: String,
    runner: String,
    protocol_version: i64,
    guarantees: Guarantees,
    sources: GuaranteeOrigins,
}

impl CapabilityContext {
    /// Creates a context for `tool_name` with the supplied guarantees.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, guarantees: Guarantees) -> Self {
        Self {
            tool_name: tool_name.into(),
            resolved_source: DEFAULT_RESOLVED_SOURCE.into(),
            runner: DEFAULT_RUNNER.into(),
            protocol_version: 1,
            guarantees,
            sources: GuaranteeOrigins::default(),
        }
    }

    /// Attaches the origin map.
    #[must_use]
    pub fn with_sources(mut self, sources: GuaranteeOrigins) -> Self {
        self.sources = sources;
        self
    }

    /// Name of the tool the guarantees apply to.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// How the orchestrator located the tool.
    #[must_use]
    pub fn resolved_source(&self) -> &str {
        &self.resolved_source
    }

    /// Runner identifier.
    #[must_use]
    pub fn runner(&self) -> &str {
        &self.runner
    }

    /// Protocol version the context was produced for.
    #[must_use]
    pub fn protocol_version(&self) -> i64 {
        self.protocol_version
    }

    /// Effective guarantees.
    #[must_use]
    pub fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    /// Origin map for diagnostics.
    #[must_use]
    pub fn sources(&self) -> &GuaranteeOrigins {
        &self.sources
    }
}

/// Resolves the `capability_context` of a raw request.
///
/// Returns `None` when the request carries no context object, which disables
/// enforcement for the invocation.
#[must_use]
pub fn resolve_context(request: &Value) -> Option<CapabilityContext> {
    let Value::Object(context) = request.get("capability_context")? else {
        debug!("no capability context supplied; enforcement disabled");
        return None;
    };

    let tool_name = non_empty_string(context.get("tool_name"))
        .or_else(|| non_empty_string(request.get("tool")))
        .or_else(|| non_empty_string(request.get("tool_name")))
        .unwrap_or_else(|| DEFAULT_TOOL_NAME.into());
    let resolved = CapabilityContext {
        tool_name,
        resolved_source: non_empty_string(context.get("resolved_source"))
            .unwrap_or_else(|| DEFAULT_RESOLVED_SOURCE.into()),
        runner: non_empty_string(context.get("runner")).unwrap_or_else(|| DEFAULT_RUNNER.into()),
        protocol_version: protocol_version(context),
        guarantees: Guarantees::from_value(context.get("guarantees")),
        sources: GuaranteeOrigins::from_value(context.get("sources")),
    };

    debug!(
        tool = resolved.tool_name(),
        runner = resolved.runner(),
        guarantees = ?resolved.guarantees(),
        "capability context resolved"
    );
    Some(resolved)
}

fn protocol_version(context: &Map<String, Value>) -> i64 {
    context
        .get("protocol_version")
        .and_then(Value::as_i64)
        .filter(|version| *version != 0)
        .unwrap_or(1)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        other => Some(stringify(other)),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_context_disables_enforcement() {
        assert!(resolve_context(&json!({ "entry": "tools/echo:run" })).is_none());
        assert!(resolve_context(&json!({ "capability_context": null })).is_none());
        assert!(resolve_context(&json!({ "capability_context": [1, 2] })).is_none());
    }

    #[test]
    fn booleans_only_true_for_literal_true() {
        let context = resolve_context(&json!({
            "capability_context": {
                "tool_name": "fetcher",
                "guarantees": {
                    "no_network": true,
                    "no_filesystem_read": "yes",
                    "no_filesystem_write": 1,
                    "no_subprocess": false
                }
            }
        }))
        .expect("context");

        let guarantees = context.guarantees();
        assert!(guarantees.no_network);
        assert!(!guarantees.no_filesystem_read);
        assert!(!guarantees.no_filesystem_write);
        assert!(!guarantees.no_subprocess);
        assert!(!guarantees.no_env_read);
        assert_eq!(guarantees.secrets_allowed(), None);
    }

    #[test]
    fn secrets_allowed_requires_array_and_stringifies() {
        let guarantees = Guarantees::from_value(Some(&json!({
            "secrets_allowed": ["OPENAI_API_KEY", 7, true]
        })));
        assert_eq!(
            guarantees.secrets_allowed(),
            Some(&["OPENAI_API_KEY".to_owned(), "7".to_owned(), "true".to_owned()][..])
        );

        let guarantees = Guarantees::from_value(Some(&json!({ "secrets_allowed": "OPENAI_API_KEY" })));
        assert_eq!(guarantees.secrets_allowed(), None);
    }

    #[test]
    fn context_defaults_fill_missing_fields() {
        let context = resolve_context(&json!({
            "tool": "weather",
            "capability_context": {}
        }))
        .expect("context");

        assert_eq!(context.tool_name(), "weather");
        assert_eq!(context.resolved_source(), "binding");
        assert_eq!(context.runner(), "native");
        assert_eq!(context.protocol_version(), 1);
        assert_eq!(context.guarantees(), &Guarantees::default());
    }

    #[test]
    fn origins_default_to_pack() {
        let context = resolve_context(&json!({
            "capability_context": {
                "sources": { "no_network": "user", "no_subprocess": "", "no_env_read": 3 }
            }
        }))
        .expect("context");

        assert_eq!(context.tool_name(), "tool");
        let sources = context.sources();
        assert_eq!(sources.source_for(Capability::Network), "user");
        assert_eq!(sources.source_for(Capability::Subprocess), "pack");
        assert_eq!(sources.source_for(Capability::EnvRead), "pack");
        assert_eq!(sources.source_for(Capability::Secrets), "pack");
    }
}
