//! Configuration loader implementations.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::schema::HarnessConfig;

/// Environment variable holding `tracing` filter directives.
pub const ENV_LOG_FILTER: &str = "TOOLSHIM_LOG";
/// Environment variable holding a platform path list of module roots.
pub const ENV_MODULE_PATHS: &str = "TOOLSHIM_MODULE_PATHS";
/// Environment variable naming a JSON configuration file.
pub const ENV_CONFIG_FILE: &str = "TOOLSHIM_CONFIG";

impl HarnessConfig {
    /// Builds the configuration from defaults and the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var_os(key).and_then(|v| v.into_string().ok()))
    }

    /// Loads the file named by `TOOLSHIM_CONFIG` when set, otherwise the
    /// defaults; the environment is overlaid in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error when the named file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(ENV_CONFIG_FILE).filter(|path| !path.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::from_env()),
        }
    }

    /// Parses a JSON configuration document, then overlays the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `raw` is not a valid configuration document.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid harness configuration")?;
        Ok(config.overlay_env(|key| std::env::var_os(key).and_then(|v| v.into_string().ok())))
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|f| !f.trim().is_empty()) {
            debug!(filter = %filter, "log filter taken from environment");
            self.log_filter = filter;
        }
        if let Some(paths) = lookup(ENV_MODULE_PATHS).filter(|p| !p.trim().is_empty()) {
            self.module_paths = std::env::split_paths(&paths).collect();
            debug!(roots = ?self.module_paths, "module roots taken from environment");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn overlay_applies_log_filter_and_roots() {
        let joined = std::env::join_paths(["/one", "/two"]).unwrap().into_string().unwrap();
        let config = HarnessConfig::default().overlay_env(|key| match key {
            ENV_LOG_FILTER => Some("debug".into()),
            ENV_MODULE_PATHS => Some(joined.clone()),
            _ => None,
        });

        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.module_paths, [PathBuf::from("/one"), PathBuf::from("/two")]);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = HarnessConfig::default().overlay_env(|_| Some("  ".into()));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolshim.json");
        std::fs::write(&path, r#"{ "module_paths": ["/opt/tools"], "default_protocol_version": 2 }"#).unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.default_protocol_version, 2);
        assert!(HarnessConfig::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(HarnessConfig::from_json_str("{not json").is_err());
    }
}
