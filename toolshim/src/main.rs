//! One-shot tool worker.
//!
//! Reads one request from standard input and writes one response to standard
//! output. When started with arguments (as a forked child) the first argument
//! is the module to run and the rest become the payload of its `run` export.
//!
//! While a tool runs, file descriptors 1 and 2 point at the null device, so the
//! response is the only thing this process ever writes to standard output.

use std::process::ExitCode;
use std::sync::Arc;

use serde_json::{Value, json};
use toolshim::config::HarnessConfig;
use toolshim::kernel::{EXIT_PROTOCOL_FAILURE, Harness};
use toolshim::telemetry::{self, DEFAULT_LOG_FILTER, OutputGate};
use tracing::{error, warn};

fn main() -> ExitCode {
    let (config, config_error) = match HarnessConfig::load() {
        Ok(config) => (config, None),
        Err(err) => (HarnessConfig::from_env(), Some(err)),
    };
    let gate = OutputGate::redirecting();
    if let Err(err) = telemetry::init(&config.log_filter, &gate) {
        let _ = telemetry::init(DEFAULT_LOG_FILTER, &gate);
        warn!(error = %err, "falling back to default log filter");
    }
    if let Some(err) = config_error {
        warn!(error = %err, "ignoring unreadable configuration file");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start runtime");
            return exit_code(EXIT_PROTOCOL_FAILURE);
        }
    };

    let registry = match toolshim::builtin::registry() {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            error!(error = %err, "failed to build module registry");
            return exit_code(EXIT_PROTOCOL_FAILURE);
        }
    };
    let harness = Harness::new(config, registry).with_gate(gate);

    let code = runtime.block_on(async {
        match forked_request(std::env::args().skip(1)) {
            Some(request) => harness.run(request.as_bytes(), tokio::io::stdout()).await,
            None => harness.run(tokio::io::stdin(), tokio::io::stdout()).await,
        }
    });
    exit_code(code)
}

/// Request for a worker started as `toolshim <module> [args...]`.
fn forked_request<I>(mut args: I) -> Option<String>
where
    I: Iterator<Item = String>,
{
    let module = args.next()?;
    let payload: Vec<Value> = args.map(Value::String).collect();
    Some(json!({ "entry": format!("{module}:run"), "payload": payload }).to_string())
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forked_arguments_become_a_run_request() {
        let args = ["tools/echo", "a", "b"].map(String::from).into_iter();
        let request: Value = serde_json::from_str(&forked_request(args).unwrap()).unwrap();
        assert_eq!(request, json!({ "entry": "tools/echo:run", "payload": ["a", "b"] }));
    }

    #[test]
    fn no_arguments_read_stdin() {
        assert!(forked_request(std::iter::empty()).is_none());
    }
}
