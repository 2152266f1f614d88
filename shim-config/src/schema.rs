//! Strongly typed configuration schemas.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk module conventions used when resolving entry locators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleLayout {
    /// Locator prefix treated as a path under the module roots.
    pub namespace: String,
    /// Extensions of modules linked into the worker, tried in order.
    pub native_extensions: Vec<String>,
    /// Extensions of higher-level sources that need a translator.
    pub translated_extensions: Vec<String>,
    /// File stem used for directory modules.
    pub index_stem: String,
}

impl Default for ModuleLayout {
    fn default() -> Self {
        Self {
            namespace: "tools".into(),
            native_extensions: vec!["rs".into()],
            translated_extensions: vec!["script".into()],
            index_stem: "index".into(),
        }
    }
}

impl ModuleLayout {
    /// Every extension to probe, native ones first.
    #[must_use]
    pub fn candidate_extensions(&self) -> Vec<&str> {
        self.native_extensions
            .iter()
            .chain(&self.translated_extensions)
            .map(String::as_str)
            .collect()
    }

    /// Returns `true` when files with `extension` need a translation step.
    #[must_use]
    pub fn is_translated(&self, extension: &str) -> bool {
        self.translated_extensions.iter().any(|ext| ext == extension)
    }

    /// Returns `true` when files with `extension` are linked into the worker.
    #[must_use]
    pub fn is_native(&self, extension: &str) -> bool {
        self.native_extensions.iter().any(|ext| ext == extension)
    }
}

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Module roots searched when a request does not name its own.
    pub module_paths: Vec<PathBuf>,
    /// Module resolution conventions.
    pub layout: ModuleLayout,
    /// Protocol version reported when the request omits one.
    pub default_protocol_version: i64,
    /// `tracing` filter directives.
    pub log_filter: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            module_paths: Vec::new(),
            layout: ModuleLayout::default(),
            default_protocol_version: 1,
            log_filter: "warn".into(),
        }
    }
}

impl HarnessConfig {
    /// Replaces the configured module roots.
    #[must_use]
    pub fn with_module_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.module_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Module roots for one invocation.
    ///
    /// Request-supplied roots win over configured ones; when neither is present
    /// the current working directory is used. Order is preserved and the first
    /// root containing a match wins.
    #[must_use]
    pub fn effective_roots(&self, requested: Option<&[PathBuf]>) -> Vec<PathBuf> {
        if let Some(requested) = requested.filter(|paths| !paths.is_empty()) {
            return requested.to_vec();
        }
        if !self.module_paths.is_empty() {
            return self.module_paths.clone();
        }
        vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_orders_native_before_translated() {
        let layout = ModuleLayout::default();
        assert_eq!(layout.candidate_extensions(), ["rs", "script"]);
        assert!(layout.is_translated("script"));
        assert!(layout.is_native("rs"));
        assert!(!layout.is_native("script"));
    }

    #[test]
    fn requested_roots_override_configured_roots() {
        let config = HarnessConfig::default().with_module_paths(["/srv/app"]);
        let requested = [PathBuf::from("/a"), PathBuf::from("/b")];

        assert_eq!(config.effective_roots(Some(&requested[..])), requested);
        assert_eq!(config.effective_roots(None), [PathBuf::from("/srv/app")]);
        assert_eq!(config.effective_roots(Some(&[][..])), [PathBuf::from("/srv/app")]);
    }

    #[test]
    fn roots_fall_back_to_working_directory() {
        let roots = HarnessConfig::default().effective_roots(None);
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{ "layout": { "namespace": "plugins" } }"#).unwrap();
        assert_eq!(config.layout.namespace, "plugins");
        assert_eq!(config.layout.index_stem, "index");
        assert_eq!(config.default_protocol_version, 1);
    }
}
