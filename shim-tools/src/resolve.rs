//! Module locator resolution.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use shim_config::ModuleLayout;
use tracing::{debug, trace};

use crate::error::{ToolError, ToolResult};

/// Loadable target a locator resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTarget {
    /// Source file found under a module root.
    File {
        /// Resolved file path.
        path: PathBuf,
        /// Registry id derived from the path.
        module_id: String,
    },
    /// Namespaced module with no file on disk, served by a module linked
    /// into the worker.
    Linked {
        /// Registry id derived from the locator.
        module_id: String,
    },
    /// Opaque package name looked up directly in the registry.
    Package {
        /// Package name as written in the entry.
        name: String,
    },
}

impl ModuleTarget {
    /// Registry id of the target.
    #[must_use]
    pub fn module_id(&self) -> &str {
        match self {
            Self::File { module_id, .. } | Self::Linked { module_id } => module_id,
            Self::Package { name } => name,
        }
    }
}

/// Resolves locators against ordered module roots.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    roots: &'a [PathBuf],
    layout: &'a ModuleLayout,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver; the first root containing a match wins.
    #[must_use]
    pub fn new(roots: &'a [PathBuf], layout: &'a ModuleLayout) -> Self {
        Self { roots, layout }
    }

    /// Resolves `locator`.
    ///
    /// Locators in the tools namespace (`tools/x`, `tools.x.y`) and explicit
    /// paths (`./x`, `../x`, `/abs/x`) are probed on disk; anything else is a
    /// package name. A namespaced locator with no file falls back to a linked
    /// module of the same id.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ModuleNotFound`] when a path-like locator matches
    /// no file.
    pub fn resolve(&self, locator: &str) -> ToolResult<ModuleTarget> {
        if let Some(relative) = self.namespaced(locator) {
            return self
                .probe_roots(locator, Path::new(&relative))
                .or_else(|_| {
                    debug!(locator, module_id = %relative, "no module file; using linked module");
                    Ok(ModuleTarget::Linked {
                        module_id: relative,
                    })
                });
        }
        if is_path_like(locator) {
            let path = Path::new(locator);
            if path.is_absolute() {
                return self.probe_absolute(locator, path);
            }
            return self.probe_roots(locator, path);
        }
        debug!(locator, "treating locator as package");
        Ok(ModuleTarget::Package {
            name: locator.to_owned(),
        })
    }

    fn namespaced(&self, locator: &str) -> Option<String> {
        let namespace = self.layout.namespace.as_str();
        let rest = locator.strip_prefix(namespace)?;
        if rest.is_empty() || rest.starts_with('/') {
            return Some(locator.to_owned());
        }
        if rest.starts_with('.') && !locator.contains('/') {
            return Some(locator.replace('.', "/"));
        }
        None
    }

    fn probe_roots(&self, locator: &str, relative: &Path) -> ToolResult<ModuleTarget> {
        for root in self.roots {
            if let Some(path) = self.probe(&root.join(relative)) {
                let module_id = self.module_id(root, &path);
                debug!(locator, path = %path.display(), module_id, "locator resolved");
                return Ok(ModuleTarget::File { path, module_id });
            }
        }
        Err(not_found(locator))
    }

    fn probe_absolute(&self, locator: &str, path: &Path) -> ToolResult<ModuleTarget> {
        let path = self.probe(path).ok_or_else(|| not_found(locator))?;
        let module_id = self
            .roots
            .iter()
            .find(|root| normalize(&path).starts_with(normalize(root)))
            .map_or_else(|| self.strip_module_suffix(&normalize(&path)), |root| self.module_id(root, &path));
        debug!(locator, path = %path.display(), module_id, "locator resolved");
        Ok(ModuleTarget::File { path, module_id })
    }

    /// Tries `base` as-is, then `<base>.<ext>`, then `<base>/<index>.<ext>`.
    fn probe(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }
        let extensions = self.layout.candidate_extensions();
        let with_extension = extensions.iter().map(|ext| {
            let mut candidate = OsString::from(base.as_os_str());
            candidate.push(".");
            candidate.push(ext);
            PathBuf::from(candidate)
        });
        let index = extensions
            .iter()
            .map(|ext| base.join(format!("{}.{ext}", self.layout.index_stem)));

        with_extension.chain(index).find(|candidate| {
            trace!(candidate = %candidate.display(), "probing module file");
            candidate.is_file()
        })
    }

    fn module_id(&self, root: &Path, path: &Path) -> String {
        let normalized = normalize(path);
        let relative = normalized
            .strip_prefix(normalize(root))
            .unwrap_or(&normalized)
            .to_path_buf();
        self.strip_module_suffix(&relative)
    }

    fn strip_module_suffix(&self, path: &Path) -> String {
        let mut parts: Vec<String> = path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if let Some(last) = parts.last_mut() {
            let stripped = Path::new(last.as_str())
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| self.layout.candidate_extensions().contains(ext))
                .map(|ext| last[..last.len() - ext.len() - 1].to_owned());
            if let Some(stripped) = stripped {
                *last = stripped;
            }
        }
        if parts.len() > 1 && parts.last().is_some_and(|last| *last == self.layout.index_stem) {
            parts.pop();
        }
        parts.join("/")
    }
}

fn is_path_like(locator: &str) -> bool {
    locator.starts_with("./")
        || locator.starts_with("../")
        || locator.starts_with(".\\")
        || locator.starts_with("..\\")
        || Path::new(locator).is_absolute()
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn not_found(locator: &str) -> ToolError {
    ToolError::ModuleNotFound {
        locator: locator.to_owned(),
    }
}
