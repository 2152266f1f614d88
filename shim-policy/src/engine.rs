//! Enforcement session and guard functions.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use shim_primitives::{AccessMode, Capability, ReasonCode, canonical_secret_name};
use tracing::{debug, warn};

use crate::contracts::CapabilityContext;
use crate::decision::{CapabilityCheck, CapabilityViolation, PolicyResult};
use crate::message::{build_block_message, override_example, secrets_example};

#[derive(Debug, Default)]
struct SessionState {
    context: Option<CapabilityContext>,
    checks: Vec<CapabilityCheck>,
    allowed_emitted: HashSet<Capability>,
    violation: Option<CapabilityViolation>,
}

impl SessionState {
    /// Fails every guard once the invocation has been denied, so a tool that
    /// discards a violation cannot carry on and succeed.
    fn tripped(&self) -> PolicyResult<()> {
        match &self.violation {
            Some(violation) => Err(violation.clone()),
            None => Ok(()),
        }
    }

    fn deny(&mut self, violation: &CapabilityViolation) {
        record_check(self, violation.check().clone());
        self.violation.get_or_insert_with(|| violation.clone());
    }
}

/// Per-invocation enforcement state shared by every guard.
///
/// Holds the active capability context and the append-only list of recorded
/// checks. The first violation of an invocation is kept: every later guard
/// re-raises it without recording anything new. [`EnforcementSession::begin`]
/// resets all of it.
#[derive(Debug, Default)]
pub struct EnforcementSession {
    state: Mutex<SessionState>,
}

impl EnforcementSession {
    /// Creates a session with enforcement disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session already enforcing `context`.
    #[must_use]
    pub fn with_context(context: CapabilityContext) -> Self {
        let session = Self::new();
        session.begin(Some(context));
        session
    }

    /// Starts a new invocation, discarding checks from any previous one.
    pub fn begin(&self, context: Option<CapabilityContext>) {
        let mut state = self.lock();
        state.checks.clear();
        state.allowed_emitted.clear();
        state.violation = None;
        state.context = context;
    }

    /// Returns `true` when a capability context is active.
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        self.lock().context.is_some()
    }

    /// Returns a copy of the active context.
    #[must_use]
    pub fn context(&self) -> Option<CapabilityContext> {
        self.lock().context.clone()
    }

    /// Returns the checks recorded so far, in order.
    #[must_use]
    pub fn checks(&self) -> Vec<CapabilityCheck> {
        self.lock().checks.clone()
    }

    /// Returns the first violation raised during the current invocation.
    #[must_use]
    pub fn violation(&self) -> Option<CapabilityViolation> {
        self.lock().violation.clone()
    }

    /// Guards a filesystem access to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when the matching filesystem guarantee is set.
    pub fn guard_filesystem(&self, path: &Path, mode: AccessMode) -> PolicyResult<()> {
        let capability = mode.capability();
        let action = if mode.is_write() {
            "cannot write to the filesystem"
        } else {
            "cannot read from the filesystem"
        };
        self.guard_boolean(capability, || {
            (
                action.to_owned(),
                format!(
                    "Effective guarantees forbid filesystem access ({}).",
                    path.display()
                ),
            )
        })
    }

    /// Guards an outbound network operation.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when `no_network` is set.
    pub fn guard_network(&self, url: &str, method: &str) -> PolicyResult<()> {
        self.guard_boolean(Capability::Network, || {
            (
                "cannot access the network".to_owned(),
                format!("Effective guarantees forbid network access ({method} {url})."),
            )
        })
    }

    /// Guards creation of a child process described by `argv`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when `no_subprocess` is set.
    pub fn guard_subprocess<S: AsRef<str>>(&self, argv: &[S]) -> PolicyResult<()> {
        self.guard_boolean(Capability::Subprocess, || {
            let display = argv.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
            (
                "cannot run subprocesses".to_owned(),
                format!("Effective guarantees forbid subprocess access ({display})."),
            )
        })
    }

    /// Guards a read of environment variable `key`.
    ///
    /// The `no_env_read` guarantee is checked first; when the key names a known
    /// secret the secrets guard runs as a second gate.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when either gate denies the access.
    pub fn guard_env_read(&self, key: &str) -> PolicyResult<()> {
        self.guard_boolean(Capability::EnvRead, || {
            (
                "cannot read environment variables".to_owned(),
                format!("Effective guarantees forbid env reads ({key})."),
            )
        })?;
        self.guard_secret_alias(key)
    }

    /// Guards a write or deletion of environment variable `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when `no_env_write` is set or the key
    /// names a secret outside the allow-list.
    pub fn guard_env_write(&self, key: &str) -> PolicyResult<()> {
        self.guard_boolean(Capability::EnvWrite, || {
            (
                "cannot write environment variables".to_owned(),
                format!("Effective guarantees forbid env writes ({key})."),
            )
        })?;
        self.guard_secret_alias(key)
    }

    /// Guards access to the canonical secret `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityViolation`] when the allow-list is restricted and does
    /// not contain `secret`.
    pub fn guard_secret(&self, secret: &str) -> PolicyResult<()> {
        let mut state = self.lock();
        let Some(context) = state.context.as_ref() else {
            return Ok(());
        };
        state.tripped()?;
        let source = context.sources().source_for(Capability::Secrets).to_owned();

        let Some(allowed) = context.guarantees().secrets_allowed() else {
            let check = CapabilityCheck::allow(Capability::Secrets, source, ReasonCode::GuaranteeAllowed);
            record_check(&mut state, check);
            return Ok(());
        };
        if allowed.iter().any(|name| name == secret) {
            let check = CapabilityCheck::allow(Capability::Secrets, source, ReasonCode::SecretsAllowed);
            record_check(&mut state, check);
            return Ok(());
        }

        let mut sorted = allowed.to_vec();
        sorted.sort();
        let tool_name = context.tool_name().to_owned();
        let listed = Value::from(sorted).to_string();
        let message = build_block_message(
            &tool_name,
            "cannot access secrets",
            &format!("Effective guarantees only allow secrets {listed} (requested: {secret})."),
            &secrets_example(&tool_name, secret),
        );
        let check = CapabilityCheck::deny(Capability::Secrets, source, ReasonCode::SecretsBlocked);
        let violation = CapabilityViolation::new(message, check);
        state.deny(&violation);
        warn!(tool = %tool_name, secret, "secret access blocked");
        Err(violation)
    }

    fn guard_secret_alias(&self, key: &str) -> PolicyResult<()> {
        match canonical_secret_name(key) {
            Some(secret) => self.guard_secret(secret),
            None => Ok(()),
        }
    }

    fn guard_boolean<F>(&self, capability: Capability, describe: F) -> PolicyResult<()>
    where
        F: FnOnce() -> (String, String),
    {
        let mut state = self.lock();
        let Some(context) = state.context.as_ref() else {
            return Ok(());
        };
        state.tripped()?;
        let source = context.sources().source_for(capability).to_owned();

        if !context.guarantees().denies(capability) {
            let check = CapabilityCheck::allow(capability, source, ReasonCode::GuaranteeAllowed);
            record_check(&mut state, check);
            return Ok(());
        }

        let tool_name = context.tool_name().to_owned();
        let (action, why) = describe();
        let guarantee = capability.guarantee_key();
        let message = build_block_message(
            &tool_name,
            &action,
            &why,
            &override_example(&tool_name, guarantee.as_str()),
        );
        let check = CapabilityCheck::deny(capability, source, ReasonCode::GuaranteeBlocked);
        let violation = CapabilityViolation::new(message, check);
        state.deny(&violation);
        warn!(tool = %tool_name, %capability, %guarantee, "capability blocked");
        Err(violation)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_check(state: &mut SessionState, check: CapabilityCheck) {
    if check.allowed() && !state.allowed_emitted.insert(check.capability()) {
        return;
    }
    debug!(
        capability = %check.capability(),
        allowed = check.allowed(),
        reason = %check.reason(),
        "capability check recorded"
    );
    state.checks.push(check);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{GuaranteeOrigins, Guarantees};
    use shim_primitives::GuaranteeKey;

    fn session(guarantees: Guarantees) -> EnforcementSession {
        EnforcementSession::with_context(CapabilityContext::new("demo", guarantees))
    }

    #[test]
    fn disabled_session_allows_without_recording() {
        let session = EnforcementSession::new();
        session.guard_network("https://example.com", "GET").unwrap();
        session.guard_subprocess(&["ls"]).unwrap();
        session.guard_env_read("OPENAI_API_KEY").unwrap();
        assert!(session.checks().is_empty());
        assert!(!session.is_enforcing());
    }

    #[test]
    fn allowed_checks_are_deduplicated_per_capability() {
        let session = session(Guarantees::default());
        for _ in 0..5 {
            session.guard_filesystem(Path::new("/tmp/a"), AccessMode::Read).unwrap();
            session.guard_network("https://example.com", "GET").unwrap();
        }
        session.guard_filesystem(Path::new("/tmp/a"), AccessMode::Write).unwrap();

        let checks = session.checks();
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(CapabilityCheck::allowed));
        assert_eq!(checks[0].capability(), Capability::FilesystemRead);
        assert_eq!(checks[1].capability(), Capability::Network);
        assert_eq!(checks[2].capability(), Capability::FilesystemWrite);
        assert_eq!(checks[0].reason(), ReasonCode::GuaranteeAllowed);
        assert_eq!(checks[0].guarantee_source(), "pack");
    }

    #[test]
    fn subprocess_denial_names_argv() {
        let session = session(Guarantees::default().deny(Capability::Subprocess));
        let err = session.guard_subprocess(&["ls", "-la"]).unwrap_err();

        assert!(err.message().contains("ls -la"));
        assert!(err.message().contains("no_subprocess = false"));
        assert_eq!(err.reason_code(), ReasonCode::GuaranteeBlocked);
        let checks = session.checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].capability(), Capability::Subprocess);
        assert!(!checks[0].allowed());
    }

    #[test]
    fn filesystem_denial_names_path_and_direction() {
        let session = session(Guarantees::default().deny(Capability::FilesystemWrite));
        session.guard_filesystem(Path::new("/etc/hosts"), AccessMode::Read).unwrap();
        let err = session
            .guard_filesystem(Path::new("/tmp/out.txt"), AccessMode::Write)
            .unwrap_err();

        assert!(err.message().contains("cannot write to the filesystem"));
        assert!(err.message().contains("/tmp/out.txt"));
        assert!(err.message().contains("no_filesystem_write = false"));
        assert_eq!(err.check().capability(), Capability::FilesystemWrite);
    }

    #[test]
    fn network_denial_includes_method_and_url() {
        let session = session(Guarantees::default().deny(Capability::Network));
        let err = session.guard_network("https://api.example.com/v1", "POST").unwrap_err();
        assert!(err.message().contains("POST https://api.example.com/v1"));
    }

    #[test]
    fn secret_env_read_follows_allow_list() {
        let unrestricted = session(Guarantees::default());
        unrestricted.guard_env_read("TOOLSHIM_OPENAI_API_KEY").unwrap();
        let checks = unrestricted.checks();
        assert_eq!(checks[1].capability(), Capability::Secrets);
        assert_eq!(checks[1].reason(), ReasonCode::GuaranteeAllowed);

        let listed = session(Guarantees::default().with_secrets_allowed(["OPENAI_API_KEY"]));
        listed.guard_env_read("OPENAI_API_KEY").unwrap();
        assert_eq!(listed.checks()[1].reason(), ReasonCode::SecretsAllowed);

        let restricted = session(Guarantees::default().with_secrets_allowed(["GEMINI_API_KEY", "DATABASE_URL"]));
        let err = restricted.guard_env_read("openai_api_key").unwrap_err();
        assert_eq!(err.reason_code(), ReasonCode::SecretsBlocked);
        assert!(err.message().contains("[\"DATABASE_URL\",\"GEMINI_API_KEY\"]"));
        assert!(err.message().contains("requested: OPENAI_API_KEY"));
        let checks = restricted.checks();
        assert_eq!(checks.len(), 2);
        assert!(checks[0].allowed());
        assert_eq!(checks[0].capability(), Capability::EnvRead);
        assert!(!checks[1].allowed());
    }

    #[test]
    fn env_read_gate_runs_before_secrets() {
        let session = session(Guarantees::default().deny(Capability::EnvRead));
        let err = session.guard_env_read("OPENAI_API_KEY").unwrap_err();
        assert_eq!(err.check().capability(), Capability::EnvRead);
        assert_eq!(session.checks().len(), 1);
    }

    #[test]
    fn ordinary_env_keys_skip_secrets_gate() {
        let session = session(Guarantees::default().with_secrets_allowed(Vec::<String>::new()));
        session.guard_env_write("PATH").unwrap();
        session.guard_env_read("*").unwrap();
        let capabilities: Vec<_> = session.checks().iter().map(CapabilityCheck::capability).collect();
        assert_eq!(capabilities, [Capability::EnvWrite, Capability::EnvRead]);
    }

    #[test]
    fn guarantee_source_comes_from_origins() {
        let context = CapabilityContext::new("demo", Guarantees::default().deny(Capability::Network))
            .with_sources(GuaranteeOrigins::default().with_source(GuaranteeKey::NoNetwork, "user_override"));
        let session = EnforcementSession::with_context(context);
        let err = session.guard_network("socket://db:5432", "CONNECT").unwrap_err();
        assert_eq!(err.check().guarantee_source(), "user_override");
    }

    #[test]
    fn later_guards_reraise_the_first_violation() {
        let session = session(Guarantees::default().deny(Capability::FilesystemWrite));
        let first = session
            .guard_filesystem(Path::new("/tmp/a"), AccessMode::Write)
            .unwrap_err();

        let again = session
            .guard_filesystem(Path::new("/tmp/b"), AccessMode::Write)
            .unwrap_err();
        let unrelated = session.guard_network("https://example.com", "GET").unwrap_err();

        assert_eq!(again, first);
        assert_eq!(unrelated, first);
        assert_eq!(session.checks().len(), 1);
        assert_eq!(session.violation(), Some(first));

        session.begin(Some(CapabilityContext::new("next", Guarantees::default())));
        assert_eq!(session.violation(), None);
        session.guard_network("https://example.com", "GET").unwrap();
    }

    #[test]
    fn begin_resets_recorded_state() {
        let session = session(Guarantees::default());
        session.guard_network("https://example.com", "GET").unwrap();
        assert_eq!(session.checks().len(), 1);

        session.begin(Some(CapabilityContext::new("next", Guarantees::default())));
        assert!(session.checks().is_empty());
        session.guard_network("https://example.com", "GET").unwrap();
        assert_eq!(session.checks().len(), 1);

        session.begin(None);
        assert!(session.checks().is_empty());
        assert!(!session.is_enforcing());
    }
}
