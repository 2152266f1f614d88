//! Per-invocation state machine.

use shim_primitives::InvocationId;
use thiserror::Error;
use tracing::debug;

/// Phases a single invocation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPhase {
    /// Waiting for the request document.
    AwaitingInput,
    /// Request parsed into JSON.
    Parsed,
    /// Enforcement session reset and interceptors installed when needed.
    GuardsInstalled,
    /// Entry resolved to a callable export.
    Resolved,
    /// Tool function running with output suppressed.
    Invoking,
    /// Response produced.
    Completed {
        /// Whether the response reports success.
        ok: bool,
    },
}

impl InvocationPhase {
    /// Returns `true` once a response exists.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Events that advance an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The request parsed.
    InputParsed,
    /// Guards are in place.
    GuardsReady,
    /// The entry resolved.
    EntryResolved,
    /// The tool call started.
    CallStarted,
    /// A response was built.
    Finished {
        /// Whether the response reports success.
        ok: bool,
    },
}

/// Phase tracker for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    id: InvocationId,
    phase: InvocationPhase,
}

impl Invocation {
    /// Starts tracking a new invocation.
    #[must_use]
    pub const fn new(id: InvocationId) -> Self {
        Self {
            id,
            phase: InvocationPhase::AwaitingInput,
        }
    }

    /// Invocation identifier.
    #[must_use]
    pub const fn id(&self) -> InvocationId {
        self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> InvocationPhase {
        self.phase
    }

    /// Applies `event`, returning the new phase.
    ///
    /// Steps run strictly in order; `Finished` is accepted from any
    /// non-terminal phase, so a failure at any step completes the invocation.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] for out-of-order events
    /// and for any event after completion.
    pub fn transition(&mut self, event: PhaseEvent) -> LifecycleResult<InvocationPhase> {
        let next = match (self.phase, event) {
            (InvocationPhase::AwaitingInput, PhaseEvent::InputParsed) => Some(InvocationPhase::Parsed),
            (InvocationPhase::Parsed, PhaseEvent::GuardsReady) => Some(InvocationPhase::GuardsInstalled),
            (InvocationPhase::GuardsInstalled, PhaseEvent::EntryResolved) => {
                Some(InvocationPhase::Resolved)
            }
            (InvocationPhase::Resolved, PhaseEvent::CallStarted) => Some(InvocationPhase::Invoking),
            (phase, PhaseEvent::Finished { ok }) if !phase.is_terminal() => {
                Some(InvocationPhase::Completed { ok })
            }
            _ => None,
        };

        let Some(next_phase) = next else {
            return Err(LifecycleError::InvalidTransition {
                invocation_id: self.id,
                from: self.phase,
                event,
            });
        };

        debug!(
            invocation_id = %self.id,
            from = ?self.phase,
            to = ?next_phase,
            "invocation phase transition"
        );
        self.phase = next_phase;
        Ok(next_phase)
    }
}

/// Errors emitted by the phase tracker.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Event not permitted from the current phase.
    #[error("invalid phase transition from {from:?} via {event:?} for invocation {invocation_id}")]
    InvalidTransition {
        /// Invocation whose transition failed.
        invocation_id: InvocationId,
        /// Phase prior to the attempted transition.
        from: InvocationPhase,
        /// Rejected event.
        event: PhaseEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_runs_every_phase() {
        let mut invocation = Invocation::new(InvocationId::random());
        for event in [
            PhaseEvent::InputParsed,
            PhaseEvent::GuardsReady,
            PhaseEvent::EntryResolved,
            PhaseEvent::CallStarted,
        ] {
            invocation.transition(event).unwrap();
        }
        assert_eq!(invocation.phase(), InvocationPhase::Invoking);
        invocation.transition(PhaseEvent::Finished { ok: true }).unwrap();
        assert_eq!(invocation.phase(), InvocationPhase::Completed { ok: true });
    }

    #[test]
    fn parse_failure_completes_directly() {
        let mut invocation = Invocation::new(InvocationId::random());
        invocation.transition(PhaseEvent::Finished { ok: false }).unwrap();
        assert!(invocation.phase().is_terminal());
    }

    #[test]
    fn steps_cannot_be_skipped_or_repeated_after_completion() {
        let mut invocation = Invocation::new(InvocationId::random());
        let err = invocation
            .transition(PhaseEvent::CallStarted)
            .expect_err("call cannot start before parsing");
        assert!(matches!(err, LifecycleError::InvalidTransition { from: InvocationPhase::AwaitingInput, .. }));

        invocation.transition(PhaseEvent::Finished { ok: false }).unwrap();
        assert!(invocation.transition(PhaseEvent::Finished { ok: true }).is_err());
    }
}
