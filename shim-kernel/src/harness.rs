//! Invocation harness.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use shim_config::HarnessConfig;
use shim_policy::{EnforcementSession, resolve_context};
use shim_primitives::InvocationId;
use shim_telemetry::{Console, OutputGate};
use shim_tools::{
    Entry, HostIo, Interceptors, ModuleLoader, ModuleRegistry, Resolver, SourceTranslator, Tool,
    ToolContext, ToolError, ToolResult,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::lifecycle::{Invocation, PhaseEvent};
use crate::protocol::{
    DEFAULT_PROTOCOL_VERSION, ErrorBody, InvocationRequest, InvocationResponse, ProtocolError,
};

/// Exit code when a response was written.
pub const EXIT_OK: i32 = 0;
/// Exit code when the request could not be read or the response not written.
pub const EXIT_PROTOCOL_FAILURE: i32 = 1;

/// Response for one invocation and the exit code it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Document to write.
    pub response: InvocationResponse,
    /// Process exit code if the document is written successfully.
    pub exit_code: i32,
}

/// Runs tool invocations.
///
/// Owns the enforcement session shared by every guarded accessor, the
/// one-shot interceptor installer, and the output gate silenced while tool
/// code runs.
pub struct Harness {
    config: HarnessConfig,
    loader: ModuleLoader,
    session: Arc<EnforcementSession>,
    interceptors: Interceptors,
    base_io: HostIo,
    gate: OutputGate,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .field("interceptors_installed", &self.interceptors.is_installed())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Creates a harness over `registry` using the native host.
    #[must_use]
    pub fn new(config: HarnessConfig, registry: Arc<ModuleRegistry>) -> Self {
        let loader = ModuleLoader::new(registry, config.layout.clone());
        Self {
            config,
            loader,
            session: Arc::new(EnforcementSession::new()),
            interceptors: Interceptors::new(),
            base_io: HostIo::native(),
            gate: OutputGate::new(),
        }
    }

    /// Uses `gate` for suppression, typically the one the log writer honours.
    #[must_use]
    pub fn with_gate(mut self, gate: OutputGate) -> Self {
        self.gate = gate;
        self
    }

    /// Replaces the unguarded host accessors.
    #[must_use]
    pub fn with_host_io(mut self, io: HostIo) -> Self {
        self.base_io = io;
        self
    }

    /// Enables translated module sources.
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn SourceTranslator>) -> Self {
        self.loader = self.loader.with_translator(translator);
        self
    }

    /// Enforcement session shared with the guarded accessors.
    #[must_use]
    pub fn session(&self) -> &Arc<EnforcementSession> {
        &self.session
    }

    /// Output gate silenced during tool calls.
    #[must_use]
    pub fn gate(&self) -> &OutputGate {
        &self.gate
    }

    /// Interceptor installer.
    #[must_use]
    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Reads one request from `reader`, writes one response to `writer`, and
    /// returns the process exit code.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> i32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut input = String::new();
        let outcome = match reader.read_to_string(&mut input).await {
            Ok(_) => self.handle(&input).await,
            Err(err) => protocol_failure(&ProtocolError::Read(err)),
        };

        let bytes = match outcome.response.to_json() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, "failed to serialise response");
                return EXIT_PROTOCOL_FAILURE;
            }
        };
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            error!(error = %err, "failed to write response");
            return EXIT_PROTOCOL_FAILURE;
        }
        outcome.exit_code
    }

    /// Runs the full pipeline for one request document.
    pub async fn handle(&self, input: &str) -> Outcome {
        let invocation_id = InvocationId::random();
        let span = info_span!("invocation", %invocation_id, entry = tracing::field::Empty);
        self.handle_in_span(invocation_id, input).instrument(span).await
    }

    async fn handle_in_span(&self, invocation_id: InvocationId, input: &str) -> Outcome {
        let mut invocation = Invocation::new(invocation_id);

        let request = match InvocationRequest::parse(input) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejecting unreadable request");
                advance(&mut invocation, PhaseEvent::Finished { ok: false });
                return protocol_failure(&err);
            }
        };
        advance(&mut invocation, PhaseEvent::InputParsed);
        tracing::Span::current().record("entry", request.entry());

        let protocol_version = request
            .protocol_version()
            .unwrap_or(self.config.default_protocol_version);

        let io = self.install_guards(&request);
        advance(&mut invocation, PhaseEvent::GuardsReady);

        let result = match self.resolve(&request).await {
            Ok(tool) => {
                advance(&mut invocation, PhaseEvent::EntryResolved);
                advance(&mut invocation, PhaseEvent::CallStarted);
                self.invoke(tool.as_ref(), io, request.payload()).await
            }
            Err(err) => Err(err),
        };
        let result = match self.session.violation() {
            Some(violation) => Err(ToolError::Violation(violation)),
            None => result,
        };

        let checks = self.session.checks();
        let response = match result {
            Ok(value) => {
                info!(checks = checks.len(), "tool completed");
                InvocationResponse::success(value, protocol_version, checks)
            }
            Err(err) => {
                if let ToolError::Violation(violation) = &err {
                    warn!(reason = %violation.reason_code(), "tool stopped by capability violation");
                } else {
                    info!(error_type = err.type_name(), error = %err, "tool failed");
                }
                InvocationResponse::failure(ErrorBody::from(&err), protocol_version, checks)
            }
        };
        advance(&mut invocation, PhaseEvent::Finished { ok: response.ok() });

        Outcome {
            response,
            exit_code: EXIT_OK,
        }
    }

    fn install_guards(&self, request: &InvocationRequest) -> HostIo {
        let context = resolve_context(request.raw());
        self.session.begin(context);
        if self.session.is_enforcing() {
            return self.interceptors.install(&self.base_io, &self.session);
        }
        debug!("no capability context; enforcement disabled");
        self.interceptors
            .installed()
            .unwrap_or_else(|| self.base_io.clone())
    }

    async fn resolve(&self, request: &InvocationRequest) -> ToolResult<Arc<dyn Tool>> {
        let entry = Entry::parse(request.entry())?;
        let requested: Option<Vec<PathBuf>> = request.module_paths();
        let roots = self.config.effective_roots(requested.as_deref());
        let target = Resolver::new(&roots, &self.config.layout).resolve(entry.locator())?;
        let module = self.loader.load(&target).await?;
        let tool = module.function(entry.function()).map_err(|_| ToolError::NotCallable {
            entry: entry.to_string(),
        })?;
        debug!(module_id = target.module_id(), function = entry.function(), "entry resolved");
        Ok(tool)
    }

    async fn invoke(&self, tool: &dyn Tool, io: HostIo, payload: Value) -> ToolResult<Value> {
        let ctx = ToolContext::new(io, Console::new(self.gate.clone()));
        let _quiet = self.gate.suppress();
        AssertUnwindSafe(tool.invoke(ctx, payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ToolError::Panic {
                    message: panic_message(panic.as_ref()),
                })
            })
    }
}

fn advance(invocation: &mut Invocation, event: PhaseEvent) {
    if let Err(err) = invocation.transition(event) {
        error!(error = %err, "invocation phase out of order");
    }
}

fn protocol_failure(err: &ProtocolError) -> Outcome {
    Outcome {
        response: InvocationResponse::failure(
            ErrorBody::protocol(err),
            DEFAULT_PROTOCOL_VERSION,
            Vec::new(),
        ),
        exit_code: EXIT_PROTOCOL_FAILURE,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "tool panicked".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shim_tools::ExportSlot;

    fn harness() -> Harness {
        let registry = Arc::new(ModuleRegistry::new());
        registry
            .register_export("echo-pkg", ExportSlot::named("run"), |_ctx: ToolContext, input: Value| async move {
                Ok::<_, ToolError>(input)
            })
            .unwrap();
        registry
            .register_export("noisy-pkg", ExportSlot::named("run"), |ctx: ToolContext, _input: Value| async move {
                ctx.console().log("chatter");
                Ok::<_, ToolError>(json!(ctx.console().is_suppressed()))
            })
            .unwrap();
        registry
            .register_export("panic-pkg", ExportSlot::named("run"), |_ctx: ToolContext, _input: Value| async move {
                if true {
                    panic!("boom");
                }
                Ok::<_, ToolError>(Value::Null)
            })
            .unwrap();
        Harness::new(HarnessConfig::default(), registry)
    }

    #[tokio::test]
    async fn package_round_trip_without_context() {
        let outcome = harness()
            .handle(r#"{"entry":"echo-pkg:run","payload":{"n":[1,2]}}"#)
            .await;

        assert_eq!(outcome.exit_code, EXIT_OK);
        assert_eq!(
            serde_json::to_value(&outcome.response).unwrap(),
            json!({ "ok": true, "result": { "n": [1, 2] }, "protocol_version": 1, "capability_checks": [] })
        );
    }

    #[tokio::test]
    async fn protocol_version_is_echoed() {
        let outcome = harness()
            .handle(r#"{"entry":"echo-pkg:run","protocol_version":4}"#)
            .await;
        assert_eq!(outcome.response.protocol_version(), 4);
    }

    #[tokio::test]
    async fn unparsable_input_exits_with_failure() {
        let outcome = harness().handle("not json").await;
        assert_eq!(outcome.exit_code, EXIT_PROTOCOL_FAILURE);
        assert_eq!(outcome.response.protocol_version(), 1);
        assert_eq!(outcome.response.error().unwrap().kind(), "ProtocolError");
    }

    #[tokio::test]
    async fn missing_function_is_a_type_error() {
        let outcome = harness().handle(r#"{"entry":"echo-pkg:nope"}"#).await;
        let error = outcome.response.error().unwrap();
        assert_eq!(outcome.exit_code, EXIT_OK);
        assert_eq!(error.kind(), "TypeError");
        assert_eq!(error.message(), "Entry target is not callable");
    }

    #[tokio::test]
    async fn output_is_suppressed_only_during_the_call() {
        let harness = harness();
        let outcome = harness.handle(r#"{"entry":"noisy-pkg:run"}"#).await;

        assert_eq!(outcome.response.result(), Some(&json!(true)));
        assert!(!harness.gate().is_suppressed());
        assert_eq!(harness.gate().discarded_bytes(), "chatter\n".len() as u64);
    }

    #[tokio::test]
    async fn panics_become_error_responses_and_restore_output() {
        let harness = harness();
        let outcome = harness.handle(r#"{"entry":"panic-pkg:run"}"#).await;

        let error = outcome.response.error().unwrap();
        assert_eq!(error.kind(), "Panic");
        assert_eq!(error.message(), "boom");
        assert!(!harness.gate().is_suppressed());
    }

    #[tokio::test]
    async fn run_writes_exactly_one_document() {
        let mut output = Vec::new();
        let code = harness()
            .run(&br#"{"entry":"echo-pkg:run","payload":"hi"}"#[..], &mut output)
            .await;

        assert_eq!(code, EXIT_OK);
        let written: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(written["result"], json!("hi"));
    }
}
