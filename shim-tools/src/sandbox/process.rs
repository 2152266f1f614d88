//! Subprocess creation.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::AccessResult;
use super::env::ProcessEnv;

/// Captured result of a finished child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, absent when the child was killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Returns `true` for a zero exit code.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Standard output decoded lossily.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl From<std::process::Output> for ProcessOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Process operations available to tool code.
///
/// Shell strings are guarded as the single-element argv `[command]`;
/// [`ProcessSpawner::fork`] is guarded as `[module, args...]`.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Runs `command` through the platform shell and captures its output.
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    async fn exec(&self, command: &str) -> AccessResult<ProcessOutput>;

    /// Runs `program` with `args` and captures its output.
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    async fn output(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput>;

    /// Starts `program` and returns the child handle.
    ///
    /// The child's standard streams are pipes owned by the handle; they never
    /// reach the worker's own output.
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    fn spawn(&self, program: &str, args: &[String]) -> AccessResult<Child>;

    /// Blocking form of [`ProcessSpawner::exec`].
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    fn exec_blocking(&self, command: &str) -> AccessResult<ProcessOutput>;

    /// Blocking form of [`ProcessSpawner::output`].
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    fn output_blocking(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput>;

    /// Starts a second worker process running `module`.
    ///
    /// Standard output and error are piped, so the child's response document
    /// is read from the handle. Standard input is closed.
    ///
    /// # Errors
    ///
    /// Returns a violation when subprocesses are denied, or the spawn error.
    fn fork(&self, module: &str, args: &[String]) -> AccessResult<Child>;
}

#[cfg(windows)]
fn shell(command: &str) -> (&'static str, [&str; 2]) {
    ("cmd", ["/C", command])
}

#[cfg(not(windows))]
fn shell(command: &str) -> (&'static str, [&str; 2]) {
    ("sh", ["-c", command])
}

/// Unguarded process spawner.
///
/// Children see the contents of the shared [`ProcessEnv`] instead of the
/// parent's real environment.
#[derive(Debug, Clone)]
pub struct NativeProcess {
    env: Arc<ProcessEnv>,
}

impl NativeProcess {
    /// Creates a spawner whose children inherit `env`.
    #[must_use]
    pub fn new(env: Arc<ProcessEnv>) -> Self {
        Self { env }
    }

    fn vars(&self) -> BTreeMap<String, String> {
        self.env.snapshot()
    }

    fn command(&self, program: &str, args: &[impl AsRef<std::ffi::OsStr>]) -> Command {
        let mut command = Command::new(program);
        command.args(args).env_clear().envs(self.vars());
        command
    }

    fn blocking_command(
        &self,
        program: &str,
        args: &[impl AsRef<std::ffi::OsStr>],
    ) -> std::process::Command {
        let mut command = std::process::Command::new(program);
        command.args(args).env_clear().envs(self.vars());
        command
    }
}

#[async_trait]
impl ProcessSpawner for NativeProcess {
    async fn exec(&self, command: &str) -> AccessResult<ProcessOutput> {
        let (program, args) = shell(command);
        debug!(program, "running shell command");
        Ok(self.command(program, &args).output().await?.into())
    }

    async fn output(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput> {
        Ok(self.command(program, args).output().await?.into())
    }

    fn spawn(&self, program: &str, args: &[String]) -> AccessResult<Child> {
        let mut command = self.command(program, args);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(command.spawn()?)
    }

    fn exec_blocking(&self, command: &str) -> AccessResult<ProcessOutput> {
        let (program, args) = shell(command);
        Ok(self.blocking_command(program, &args).output()?.into())
    }

    fn output_blocking(&self, program: &str, args: &[String]) -> AccessResult<ProcessOutput> {
        Ok(self.blocking_command(program, args).output()?.into())
    }

    fn fork(&self, module: &str, args: &[String]) -> AccessResult<Child> {
        let worker = std::env::current_exe()?;
        let mut command = Command::new(worker);
        command
            .arg(module)
            .args(args)
            .env_clear()
            .envs(self.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(module, "forking worker");
        Ok(command.spawn()?)
    }
}
