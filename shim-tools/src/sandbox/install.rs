//! One-shot interceptor installation.

use std::sync::{Arc, OnceLock};

use shim_policy::EnforcementSession;
use tracing::{debug, info};

use super::HostIo;

/// Installs guarded accessors at most once per process.
///
/// The first [`Interceptors::install`] wraps the base accessors with the
/// session's guards; later calls return the same bundle untouched, so guards
/// never stack.
#[derive(Debug, Default)]
pub struct Interceptors {
    installed: OnceLock<HostIo>,
}

impl Interceptors {
    /// Creates an installer with nothing installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the guarded accessors, installing them on first use.
    pub fn install(&self, base: &HostIo, session: &Arc<EnforcementSession>) -> HostIo {
        if let Some(io) = self.installed.get() {
            debug!("interceptors already installed");
            return io.clone();
        }
        self.installed
            .get_or_init(|| {
                info!("installing capability interceptors");
                base.guarded(session)
            })
            .clone()
    }

    /// Returns `true` once [`Interceptors::install`] has run.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }

    /// Guarded accessors, if installed.
    #[must_use]
    pub fn installed(&self) -> Option<HostIo> {
        self.installed.get().cloned()
    }
}
