//! Invocation context passed to tool functions.

use shim_telemetry::{Console, OutputGate};

use crate::sandbox::{EnvAccessor, FileAccessor, HostIo, NetworkDialer, ProcessSpawner};

/// Everything a tool function may touch besides its input.
#[derive(Debug, Clone)]
pub struct ToolContext {
    io: HostIo,
    console: Console,
}

impl ToolContext {
    /// Creates a context over `io` writing diagnostics to `console`.
    #[must_use]
    pub fn new(io: HostIo, console: Console) -> Self {
        Self { io, console }
    }

    /// Unguarded context on the native host with an open output gate.
    #[must_use]
    pub fn native() -> Self {
        Self::new(HostIo::native(), Console::new(OutputGate::new()))
    }

    /// The full accessor bundle.
    #[must_use]
    pub fn io(&self) -> &HostIo {
        &self.io
    }

    /// Filesystem accessor.
    #[must_use]
    pub fn fs(&self) -> &dyn FileAccessor {
        self.io.fs()
    }

    /// Network accessor.
    #[must_use]
    pub fn net(&self) -> &dyn NetworkDialer {
        self.io.net()
    }

    /// Process accessor.
    #[must_use]
    pub fn process(&self) -> &dyn ProcessSpawner {
        self.io.process()
    }

    /// Environment accessor.
    #[must_use]
    pub fn env(&self) -> &dyn EnvAccessor {
        self.io.env()
    }

    /// Diagnostic console; silenced while the tool runs under the harness.
    #[must_use]
    pub fn console(&self) -> &Console {
        &self.console
    }
}
