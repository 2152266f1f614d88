//! Host I/O surface handed to tool code.
//!
//! Each capability area is a trait ([`FileAccessor`], [`NetworkDialer`],
//! [`ProcessSpawner`], [`EnvAccessor`]) with a native implementation and a
//! guarded wrapper that consults an [`EnforcementSession`] before delegating.
//! [`HostIo`] bundles one accessor per area; [`Interceptors`] swaps the
//! native bundle for the guarded one exactly once per process.

pub mod env;
pub mod fs;
pub mod install;
pub mod net;
pub mod process;

mod guarded;

use std::fmt;
use std::sync::Arc;

use shim_policy::{CapabilityViolation, EnforcementSession};
use thiserror::Error;

pub use env::{EnvAccessor, ProcessEnv};
pub use fs::{FileAccessor, NativeFs, OpenFlags};
pub use guarded::{GuardedEnv, GuardedFs, GuardedNet, GuardedProcess};
pub use install::Interceptors;
pub use net::{HttpRequest, HttpResponse, NativeNet, NetworkDialer};
pub use process::{NativeProcess, ProcessOutput, ProcessSpawner};

/// Result alias for host operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors returned by host accessors.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The active context denies the operation.
    #[error(transparent)]
    Violation(#[from] CapabilityViolation),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] hyper::Error),

    /// The request could not be built.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },
}

impl AccessError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Error type string reported to the caller.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Violation(_) => "CapabilityViolation",
            Self::Io(_) => "IoError",
            Self::Http(_) => "HttpError",
            Self::InvalidRequest { .. } => "InvalidRequest",
        }
    }
}

/// One accessor per capability area.
#[derive(Clone)]
pub struct HostIo {
    fs: Arc<dyn FileAccessor>,
    net: Arc<dyn NetworkDialer>,
    process: Arc<dyn ProcessSpawner>,
    env: Arc<dyn EnvAccessor>,
}

impl fmt::Debug for HostIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostIo").finish_non_exhaustive()
    }
}

impl HostIo {
    /// Bundles the supplied accessors.
    #[must_use]
    pub fn new(
        fs: Arc<dyn FileAccessor>,
        net: Arc<dyn NetworkDialer>,
        process: Arc<dyn ProcessSpawner>,
        env: Arc<dyn EnvAccessor>,
    ) -> Self {
        Self {
            fs,
            net,
            process,
            env,
        }
    }

    /// Unguarded accessors backed by the real host.
    ///
    /// The environment is captured once; child processes inherit the captured
    /// variables plus any later writes.
    #[must_use]
    pub fn native() -> Self {
        let env = Arc::new(ProcessEnv::capture());
        Self {
            fs: Arc::new(NativeFs),
            net: Arc::new(NativeNet::new()),
            process: Arc::new(NativeProcess::new(Arc::clone(&env))),
            env,
        }
    }

    /// Wraps every accessor with the guards of `session`.
    #[must_use]
    pub fn guarded(&self, session: &Arc<EnforcementSession>) -> Self {
        Self {
            fs: Arc::new(GuardedFs::new(Arc::clone(&self.fs), Arc::clone(session))),
            net: Arc::new(GuardedNet::new(Arc::clone(&self.net), Arc::clone(session))),
            process: Arc::new(GuardedProcess::new(
                Arc::clone(&self.process),
                Arc::clone(session),
            )),
            env: Arc::new(GuardedEnv::new(Arc::clone(&self.env), Arc::clone(session))),
        }
    }

    /// Filesystem accessor.
    #[must_use]
    pub fn fs(&self) -> &dyn FileAccessor {
        self.fs.as_ref()
    }

    /// Network accessor.
    #[must_use]
    pub fn net(&self) -> &dyn NetworkDialer {
        self.net.as_ref()
    }

    /// Process accessor.
    #[must_use]
    pub fn process(&self) -> &dyn ProcessSpawner {
        self.process.as_ref()
    }

    /// Environment accessor.
    #[must_use]
    pub fn env(&self) -> &dyn EnvAccessor {
        self.env.as_ref()
    }
}
