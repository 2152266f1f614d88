//! Configuration management for the harness.
//!
//! The schema module defines the typed configuration and module layout; the
//! loader module overlays values from the process environment.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{ENV_CONFIG_FILE, ENV_LOG_FILTER, ENV_MODULE_PATHS};
pub use schema::{HarnessConfig, ModuleLayout};
