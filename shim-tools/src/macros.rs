//! Attribute macros for declaring tool exports.
//!
//! ```ignore
//! use shim_tools::macros::tool;
//!
//! #[tool(module = "tools/echo")]
//! async fn run(_ctx: ToolContext, input: Value) -> ToolResult<Value> {
//!     Ok(input)
//! }
//! ```
//!
//! The attribute keeps the function as written and submits an
//! [`ExportRegistration`](crate::registry::ExportRegistration) so that
//! [`ModuleRegistry::from_inventory`](crate::registry::ModuleRegistry::from_inventory)
//! can find it. `name = "..."` renames the export, `default` places it on the
//! module's default export, and `callable` makes it the module itself.

pub use shim_tools_macros::tool;
