//! Loading resolved targets.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use shim_config::ModuleLayout;
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::registry::{LoadedModule, ModuleRegistry};
use crate::resolve::ModuleTarget;

/// Turns a higher-level source file into a loadable module.
#[async_trait]
pub trait SourceTranslator: Send + Sync {
    /// Translates `source`, read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Translation`] when the source is rejected.
    async fn translate(&self, path: &Path, source: &str) -> ToolResult<LoadedModule>;
}

/// Loads resolved targets from the registry or through a translator.
#[derive(Clone)]
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
    layout: ModuleLayout,
    translator: Option<Arc<dyn SourceTranslator>>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("registry", &self.registry)
            .field("translator", &self.translator.is_some())
            .finish_non_exhaustive()
    }
}

impl ModuleLoader {
    /// Creates a loader without translation support.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>, layout: ModuleLayout) -> Self {
        Self {
            registry,
            layout,
            translator: None,
        }
    }

    /// Enables loading translated sources.
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn SourceTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// The registry backing native modules.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Loads `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::TranslatorUnavailable`] for translated sources
    /// without a translator, [`ToolError::ModuleNotFound`] when nothing is
    /// registered under the module id, or the initialiser or translator error.
    pub async fn load(&self, target: &ModuleTarget) -> ToolResult<LoadedModule> {
        if let ModuleTarget::File { path, module_id } = target {
            let translated = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.layout.is_translated(ext));
            if translated {
                let translator = self
                    .translator
                    .as_ref()
                    .ok_or_else(|| ToolError::TranslatorUnavailable { path: path.clone() })?;
                let source = tokio::fs::read_to_string(path).await?;
                debug!(module_id, path = %path.display(), "translating module source");
                return translator.translate(path, &source).await;
            }
        }
        self.registry.load(target.module_id()).await
    }
}
