//! Output gate used to silence standard streams during tool execution.

use std::fmt::{self, Display};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use gag::Gag;
use tracing::{debug, trace};

/// Shared switch deciding whether gated writers reach the real streams.
///
/// Clones observe the same state. Suppression nests: the gate reopens once
/// every [`SuppressionGuard`] has been dropped. A gate built with
/// [`OutputGate::redirecting`] additionally points file descriptors 1 and 2 at
/// the null device while closed, so raw writes from tool code and its
/// dependencies are dropped as well.
#[derive(Debug, Clone, Default)]
pub struct OutputGate {
    depth: Arc<AtomicUsize>,
    discarded: Arc<AtomicU64>,
    redirect: bool,
}

impl OutputGate {
    /// Creates an open gate that only filters gated writers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an open gate that also redirects the process's standard
    /// streams while closed.
    #[must_use]
    pub fn redirecting() -> Self {
        Self {
            redirect: true,
            ..Self::default()
        }
    }

    /// Returns `true` when closing the gate redirects the real streams.
    #[must_use]
    pub fn redirects(&self) -> bool {
        self.redirect
    }

    /// Closes the gate until the returned guard is dropped.
    #[must_use = "output is restored as soon as the guard is dropped"]
    pub fn suppress(&self) -> SuppressionGuard {
        let outermost = self.depth.fetch_add(1, Ordering::SeqCst) == 0;
        let gags = if self.redirect && outermost {
            redirect_streams()
        } else {
            Vec::new()
        };
        trace!(redirected = !gags.is_empty(), "standard streams suppressed");
        SuppressionGuard {
            gate: self.clone(),
            gags,
        }
    }

    /// Returns `true` while at least one suppression guard is alive.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Total bytes dropped by gated writers while the gate was closed.
    #[must_use]
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Returns a writer for `target` that honours this gate.
    #[must_use]
    pub fn writer(&self, target: StreamTarget) -> GatedWriter {
        GatedWriter {
            gate: self.clone(),
            target,
        }
    }

    fn record_discard(&self, len: usize) {
        self.discarded
            .fetch_add(u64::try_from(len).unwrap_or(u64::MAX), Ordering::Relaxed);
    }
}

fn redirect_streams() -> Vec<Gag> {
    flush_std_streams();
    [Gag::stdout(), Gag::stderr()]
        .into_iter()
        .filter_map(|gag| {
            gag.map_err(|err| debug!(error = %err, "standard stream redirect unavailable"))
                .ok()
        })
        .collect()
}

fn flush_std_streams() {
    // Buffered bytes belong to whoever wrote them before the switch.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Reopens the gate when dropped, including during unwinding.
///
/// Redirected descriptors are restored after anything the tool left in the
/// standard library's buffers has been flushed to the null device.
pub struct SuppressionGuard {
    gate: OutputGate,
    gags: Vec<Gag>,
}

impl fmt::Debug for SuppressionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressionGuard")
            .field("gate", &self.gate)
            .field("redirected", &self.gags.len())
            .finish()
    }
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        if !self.gags.is_empty() {
            flush_std_streams();
            self.gags.clear();
        }
        self.gate.depth.fetch_sub(1, Ordering::SeqCst);
        trace!("standard streams restored");
    }
}

/// Standard stream a gated writer forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    /// Process standard output.
    Stdout,
    /// Process standard error.
    Stderr,
}

/// Writer that drops its input while the gate is closed.
#[derive(Debug, Clone)]
pub struct GatedWriter {
    gate: OutputGate,
    target: StreamTarget,
}

impl Write for GatedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.gate.is_suppressed() {
            self.gate.record_discard(buf.len());
            return Ok(buf.len());
        }
        match self.target {
            StreamTarget::Stdout => io::stdout().write(buf),
            StreamTarget::Stderr => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.gate.is_suppressed() {
            return Ok(());
        }
        match self.target {
            StreamTarget::Stdout => io::stdout().flush(),
            StreamTarget::Stderr => io::stderr().flush(),
        }
    }
}

/// Diagnostic output handle given to tool code.
#[derive(Debug, Clone)]
pub struct Console {
    gate: OutputGate,
}

impl Console {
    /// Creates a console bound to `gate`.
    #[must_use]
    pub fn new(gate: OutputGate) -> Self {
        Self { gate }
    }

    /// Writes one line to standard output.
    pub fn log(&self, line: impl Display) {
        // Diagnostic output is best effort.
        let _ = writeln!(self.stdout(), "{line}");
    }

    /// Writes one line to standard error.
    pub fn error(&self, line: impl Display) {
        let _ = writeln!(self.stderr(), "{line}");
    }

    /// Returns `true` while output from this console is being dropped.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.gate.is_suppressed()
    }

    /// Gated standard output writer.
    #[must_use]
    pub fn stdout(&self) -> GatedWriter {
        self.gate.writer(StreamTarget::Stdout)
    }

    /// Gated standard error writer.
    #[must_use]
    pub fn stderr(&self) -> GatedWriter {
        self.gate.writer(StreamTarget::Stderr)
    }
}
