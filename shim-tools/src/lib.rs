//! Tool discovery, loading, and capability-enforced host I/O.
//!
//! Tool functions are exported from modules held in a [`ModuleRegistry`],
//! located through an [`Entry`] and the module roots of a request, and invoked
//! with a [`ToolContext`] whose I/O surface is the only one tool code ever
//! sees. Once interceptors are installed that surface is guarded by the active
//! enforcement session.

#![warn(missing_docs, clippy::pedantic)]

pub mod context;
pub mod entry;
pub mod error;
pub mod loader;
pub mod macros;
pub mod registry;
pub mod resolve;
pub mod sandbox;

pub use context::ToolContext;
pub use entry::Entry;
pub use error::{ToolError, ToolResult};
pub use loader::{ModuleLoader, SourceTranslator};
pub use registry::{
    ExportSlot, ExportValue, LoadedModule, ModuleRegistry, Tool, ToolFuture,
};
pub use resolve::{ModuleTarget, Resolver};
pub use sandbox::{AccessError, AccessResult, HostIo, Interceptors};

#[doc(hidden)]
pub use inventory;
#[doc(hidden)]
pub use serde_json;
