//! Tool modules linked into the worker.
//!
//! | module       | exports | behaviour                                                  |
//! |--------------|---------|----------------------------------------------------------|
//! | `tools/echo` | `run`   | returns its payload unchanged                            |
//! | `tools/diag` | `print` | writes the payload to both standard streams, returns it  |
//! | `tools/diag` | `spawn` | runs `[program, args...]`, returns its status and stdout |
//! | `tools/diag` | `fork`  | runs `tools/echo` in a child worker, returns its reply   |

use serde_json::{Value, json};
use shim_tools::macros::tool;
use shim_tools::sandbox::ProcessOutput;
use shim_tools::{ModuleRegistry, ToolContext, ToolError, ToolResult};

#[tool(module = "tools/echo", name = "run")]
async fn echo(_ctx: ToolContext, input: Value) -> ToolResult<Value> {
    Ok(input)
}

#[tool(module = "tools/diag", name = "print")]
async fn diag_print(ctx: ToolContext, input: Value) -> ToolResult<Value> {
    println!("{input}");
    eprintln!("{input}");
    ctx.console().log(&input);
    Ok(input)
}

#[tool(module = "tools/diag", name = "spawn")]
async fn diag_spawn(ctx: ToolContext, input: Value) -> ToolResult<Value> {
    let mut argv = string_list(&input).into_iter();
    let program = argv.next().ok_or_else(|| ToolError::message("spawn needs a program"))?;
    let args: Vec<String> = argv.collect();
    let child = ctx.process().spawn(&program, &args)?;
    let output = ProcessOutput::from(child.wait_with_output().await?);
    Ok(json!({ "success": output.success(), "stdout": output.stdout_text() }))
}

#[tool(module = "tools/diag", name = "fork")]
async fn diag_fork(ctx: ToolContext, input: Value) -> ToolResult<Value> {
    let child = ctx.process().fork("tools/echo", &string_list(&input))?;
    let output = child.wait_with_output().await?;
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn string_list(input: &Value) -> Vec<String> {
    input
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Builds a registry holding every linked module.
///
/// # Errors
///
/// Returns [`shim_tools::ToolError::DuplicateExport`] when two linked exports
/// claim the same slot.
pub fn registry() -> ToolResult<ModuleRegistry> {
    ModuleRegistry::from_inventory()
}
