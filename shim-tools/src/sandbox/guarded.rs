//! Guarded accessor wrappers.
//!
//! Every wrapper runs the matching guard of its [`EnforcementSession`] first
//! and only delegates when the guard passes, so a denied operation never
//! reaches the host.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use shim_policy::EnforcementSession;
use shim_primitives::AccessMode;
use tokio::fs::File;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio_rustls::client::TlsStream;

use super::AccessResult;
use super::env::EnvAccessor;
use super::fs::{FileAccessor, OpenFlags};
use super::net::{HttpRequest, HttpResponse, NetworkDialer, socket_descriptor};
use super::process::{ProcessOutput, ProcessSpawner};

const ENV_WILDCARD: &str = "*";

/// Filesystem accessor checked against the session.
pub struct GuardedFs {
    inner: Arc<dyn FileAccessor>,
    session: Arc<EnforcementSession>,
}

impl GuardedFs {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn FileAccessor>, session: Arc<EnforcementSession>) -> Self {
        Self { inner, session }
    }

    fn check_read(&self, path: &Path) -> AccessResult<()> {
        Ok(self.session.guard_filesystem(path, AccessMode::Read)?)
    }

    fn check_write(&self, path: &Path) -> AccessResult<()> {
        Ok(self.session.guard_filesystem(path, AccessMode::Write)?)
    }
}

#[async_trait]
impl FileAccessor for GuardedFs {
    async fn read(&self, path: &Path) -> AccessResult<Vec<u8>> {
        self.check_read(path)?;
        self.inner.read(path).await
    }

    async fn read_to_string(&self, path: &Path) -> AccessResult<String> {
        self.check_read(path)?;
        self.inner.read_to_string(path).await
    }

    async fn read_dir(&self, path: &Path) -> AccessResult<Vec<PathBuf>> {
        self.check_read(path)?;
        self.inner.read_dir(path).await
    }

    async fn read_link(&self, path: &Path) -> AccessResult<PathBuf> {
        self.check_read(path)?;
        self.inner.read_link(path).await
    }

    async fn metadata(&self, path: &Path) -> AccessResult<Metadata> {
        self.check_read(path)?;
        self.inner.metadata(path).await
    }

    async fn symlink_metadata(&self, path: &Path) -> AccessResult<Metadata> {
        self.check_read(path)?;
        self.inner.symlink_metadata(path).await
    }

    async fn exists(&self, path: &Path) -> AccessResult<bool> {
        self.check_read(path)?;
        self.inner.exists(path).await
    }

    async fn canonicalize(&self, path: &Path) -> AccessResult<PathBuf> {
        self.check_read(path)?;
        self.inner.canonicalize(path).await
    }

    async fn open_read(&self, path: &Path) -> AccessResult<File> {
        self.check_read(path)?;
        self.inner.open_read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.write(path, contents).await
    }

    async fn append(&self, path: &Path, contents: &[u8]) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.append(path, contents).await
    }

    async fn create_dir(&self, path: &Path) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.create_dir(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.create_dir_all(path).await
    }

    async fn remove_dir(&self, path: &Path) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.remove_dir(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.remove_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> AccessResult<()> {
        self.check_write(path)?;
        self.inner.remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> AccessResult<()> {
        self.check_write(from)?;
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> AccessResult<u64> {
        self.check_write(from)?;
        self.inner.copy(from, to).await
    }

    async fn open_write(&self, path: &Path) -> AccessResult<File> {
        self.check_write(path)?;
        self.inner.open_write(path).await
    }

    async fn open(&self, path: &Path, flags: &OpenFlags) -> AccessResult<File> {
        self.session.guard_filesystem(path, flags.access_mode())?;
        self.inner.open(path, flags).await
    }
}

/// Network accessor checked against the session.
pub struct GuardedNet {
    inner: Arc<dyn NetworkDialer>,
    session: Arc<EnforcementSession>,
}

impl GuardedNet {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn NetworkDialer>, session: Arc<EnforcementSession>) -> Self {
        Self { inner, session }
    }

    fn socket(&self, host: &str, port: u16) -> AccessResult<()> {
        Ok(self
            .session
            .guard_network(&socket_descriptor(host, port), "CONNECT")?)
    }
}

#[async_trait]
impl NetworkDialer for GuardedNet {
    async fn request(&self, request: HttpRequest) -> AccessResult<HttpResponse> {
        self.session.guard_network(request.url(), &request.method())?;
        self.inner.request(request).await
    }

    async fn connect(&self, host: &str, port: u16) -> AccessResult<TcpStream> {
        self.socket(host, port)?;
        self.inner.connect(host, port).await
    }

    async fn connect_tls(&self, host: &str, port: u16) -> AccessResult<TlsStream<TcpStream>> {
        self.socket(host, port)?;
        self.inner.connect_tls(host, port).await
    }
}

/// Process spawner checked against the session.
pub struct GuardedProcess {
    inner: Arc<dyn ProcessSpawner>,
    session: Arc<EnforcementSession>,
}

impl GuardedProcess {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn ProcessSpawner>, session: Arc<EnforcementSession>) -> Self {
        Self { inner, session }
    }

    fn argv(&self, program: &str, args: &[String]) -> AccessResult<()> {
        let argv: Vec<&str> = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect();
        Ok(self.session.guard_subprocess(&argv)?)
    }
}

#[async_trait]
impl ProcessSpawner for GuardedProcess {
    async fn exec(&self, command: &str) -> AccessResult<ProcessOutput> {
        self.session.guard_subprocess(&[command])?;
        self.inner.exec(command).await
    }

    async fn output(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput> {
        self.argv(program, args)?;
        self.inner.output(program, args).await
    }

    fn spawn(&self, program: &str, args: &[String]) -> AccessResult<Child> {
        self.argv(program, args)?;
        self.inner.spawn(program, args)
    }

    fn exec_blocking(&self, command: &str) -> AccessResult<ProcessOutput> {
        self.session.guard_subprocess(&[command])?;
        self.inner.exec_blocking(command)
    }

    fn output_blocking(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput> {
        self.argv(program, args)?;
        self.inner.output_blocking(program, args)
    }

    fn fork(&self, module: &str, args: &[String]) -> AccessResult<Child> {
        self.argv(module, args)?;
        self.inner.fork(module, args)
    }
}

/// Environment accessor checked against the session.
pub struct GuardedEnv {
    inner: Arc<dyn EnvAccessor>,
    session: Arc<EnforcementSession>,
}

impl GuardedEnv {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn EnvAccessor>, session: Arc<EnforcementSession>) -> Self {
        Self { inner, session }
    }
}

impl EnvAccessor for GuardedEnv {
    fn get(&self, key: &str) -> AccessResult<Option<String>> {
        self.session.guard_env_read(key)?;
        self.inner.get(key)
    }

    fn contains(&self, key: &str) -> AccessResult<bool> {
        self.session.guard_env_read(key)?;
        self.inner.contains(key)
    }

    fn set(&self, key: &str, value: &str) -> AccessResult<()> {
        self.session.guard_env_write(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> AccessResult<Option<String>> {
        self.session.guard_env_write(key)?;
        self.inner.remove(key)
    }

    fn vars(&self) -> AccessResult<Vec<(String, String)>> {
        self.session.guard_env_read(ENV_WILDCARD)?;
        self.inner.vars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{AccessError, NativeFs, ProcessEnv};
    use shim_policy::{CapabilityContext, Guarantees};
    use shim_primitives::{Capability, ReasonCode};

    fn session(guarantees: Guarantees) -> Arc<EnforcementSession> {
        Arc::new(EnforcementSession::with_context(CapabilityContext::new(
            "guarded-test",
            guarantees,
        )))
    }

    #[tokio::test]
    async fn denied_write_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("keep.txt");
        std::fs::write(&file, "original").unwrap();

        let session = session(Guarantees::default().deny(Capability::FilesystemWrite));
        let fs = GuardedFs::new(Arc::new(NativeFs), Arc::clone(&session));

        let err = fs.write(&file, b"changed").await.unwrap_err();
        assert!(matches!(err, AccessError::Violation(_)));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");

        let read = fs.read_to_string(&file).await.unwrap();
        assert_eq!(read, "original");

        let checks = session.checks();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].capability(), Capability::FilesystemWrite);
        assert!(!checks[0].allowed());
        assert_eq!(checks[1].capability(), Capability::FilesystemRead);
        assert!(checks[1].allowed());
    }

    #[tokio::test]
    async fn open_uses_flag_direction() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flags.txt");
        std::fs::write(&file, "x").unwrap();

        let session = session(Guarantees::default().deny(Capability::FilesystemWrite));
        let fs = GuardedFs::new(Arc::new(NativeFs), session);

        assert!(fs.open(&file, &OpenFlags::Default).await.is_ok());
        let err = fs
            .open(&file, &OpenFlags::Symbolic("a".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Violation(_)));
    }

    #[tokio::test]
    async fn shell_strings_are_guarded_as_single_argv() {
        let session = session(Guarantees::default().deny(Capability::Subprocess));
        let process = GuardedProcess::new(
            Arc::new(crate::sandbox::NativeProcess::new(Arc::new(ProcessEnv::default()))),
            session,
        );

        let err = process.exec("ls -la").await.unwrap_err();
        let AccessError::Violation(violation) = err else {
            panic!("expected violation");
        };
        assert!(violation.message().contains("ls -la"));
        assert_eq!(violation.reason_code(), ReasonCode::GuaranteeBlocked);
    }

    #[tokio::test]
    async fn raw_sockets_use_connect_descriptor() {
        let session = session(Guarantees::default().deny(Capability::Network));
        let net = GuardedNet::new(Arc::new(crate::sandbox::NativeNet::new()), session);

        let err = net.connect("example.invalid", 443).await.unwrap_err();
        let AccessError::Violation(violation) = err else {
            panic!("expected violation");
        };
        assert!(violation.message().contains("CONNECT socket://example.invalid:443"));
    }

    #[test]
    fn env_secret_gate_applies_after_boolean_gate() {
        let session = session(Guarantees::default().with_secrets_allowed(["DATABASE_URL"]));
        let env = GuardedEnv::new(
            Arc::new(ProcessEnv::from_vars([
                ("OPENAI_API_KEY", "sk-test"),
                ("DATABASE_URL", "postgres://db"),
            ])),
            Arc::clone(&session),
        );

        assert_eq!(env.get("DATABASE_URL").unwrap().as_deref(), Some("postgres://db"));
        let err = env.get("OPENAI_API_KEY").unwrap_err();
        let AccessError::Violation(violation) = err else {
            panic!("expected violation");
        };
        assert_eq!(violation.reason_code(), ReasonCode::SecretsBlocked);
        assert!(env.vars().is_ok());
    }
}
