//! Module registry holding tool exports.
//!
//! Modules are identified by the id their locator resolves to (for example
//! `tools/echo`). Each module carries named exports, an optional callable
//! form of the module itself, and an optional `default` export with its own
//! callable form and named properties. Exports are registered at link time
//! through [`ExportRegistration`] (usually via `#[tool]`) or at runtime with
//! [`ModuleRegistry::register_export`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::context::ToolContext;
use crate::error::{ToolError, ToolResult};

/// Future alias produced by generated tool bindings.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;

/// Function pointer form of a tool, as produced by `#[tool]`.
pub type ExportFn = fn(ToolContext, Value) -> ToolFuture;

/// Future returned by module initialisers.
pub type InitFuture = Pin<Box<dyn Future<Output = ToolResult<()>> + Send>>;

type InitFn = Arc<dyn Fn() -> InitFuture + Send + Sync>;

/// Names under which a directly callable module may be invoked.
pub const CALLABLE_ALIASES: [&str; 2] = ["default", "run"];

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON input, returning JSON output.
    async fn invoke(&self, ctx: ToolContext, input: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(ToolContext, Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, ctx: ToolContext, input: Value) -> ToolResult<Value> {
        (self)(ctx, input).await
    }
}

/// Where an export lives within its module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportSlot {
    /// Property on the module.
    Named(Cow<'static, str>),
    /// The module itself.
    Module,
    /// The `default` export itself.
    Default,
    /// Property on the `default` export.
    DefaultNamed(Cow<'static, str>),
}

impl ExportSlot {
    /// Property slot on the module.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    /// Property slot on the `default` export.
    #[must_use]
    pub fn default_named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::DefaultNamed(name.into())
    }
}

impl fmt::Display for ExportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Module => f.write_str("<module>"),
            Self::Default => f.write_str("default"),
            Self::DefaultNamed(name) => write!(f, "default.{name}"),
        }
    }
}

/// Value held by an export slot.
#[derive(Clone)]
pub enum ExportValue {
    /// Callable export.
    Function(Arc<dyn Tool>),
    /// Plain data export; never callable.
    Constant(Value),
}

impl ExportValue {
    /// Wraps a tool implementation.
    pub fn function<T: Tool + 'static>(tool: T) -> Self {
        Self::Function(Arc::new(tool))
    }

    /// Callable form, if any.
    #[must_use]
    pub fn callable(&self) -> Option<Arc<dyn Tool>> {
        match self {
            Self::Function(tool) => Some(Arc::clone(tool)),
            Self::Constant(_) => None,
        }
    }
}

impl fmt::Debug for ExportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
        }
    }
}

/// Export submitted through `inventory`, usually by `#[tool]`.
#[derive(Debug)]
pub struct ExportRegistration {
    module: &'static str,
    slot: ExportSlot,
    function: ExportFn,
}

impl ExportRegistration {
    /// Registers a tool function.
    #[must_use]
    pub const fn function(module: &'static str, slot: ExportSlot, function: ExportFn) -> Self {
        Self {
            module,
            slot,
            function,
        }
    }
}

inventory::collect!(ExportRegistration);

#[derive(Default)]
struct ModuleRecord {
    exports: HashMap<ExportSlot, ExportValue>,
    init: Option<InitFn>,
    ready: Arc<OnceCell<()>>,
}

/// Registry of loadable modules.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleRecord>>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.module_ids())
            .finish()
    }
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from every link-time registration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateExport`] when two registrations claim the
    /// same slot.
    pub fn from_inventory() -> ToolResult<Self> {
        let registry = Self::new();
        for registration in inventory::iter::<ExportRegistration> {
            let value = ExportValue::Function(Arc::new(registration.function));
            registry.insert(registration.module, registration.slot.clone(), value)?;
        }
        debug!(modules = registry.module_ids().len(), "module registry built from inventory");
        Ok(registry)
    }

    /// Registers a callable export.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateExport`] if the slot is taken.
    pub fn register_export<T>(&self, module: &str, slot: ExportSlot, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        self.insert(module, slot, ExportValue::function(tool))
    }

    /// Registers a non-callable export.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateExport`] if the slot is taken.
    pub fn register_constant(&self, module: &str, slot: ExportSlot, value: Value) -> ToolResult<()> {
        self.insert(module, slot, ExportValue::Constant(value))
    }

    /// Registers an initialiser that runs once before the module is loaded.
    pub fn register_init<F>(&self, module: &str, init: F)
    where
        F: Fn() -> InitFuture + Send + Sync + 'static,
    {
        let mut modules = self.write();
        modules.entry(module.to_owned()).or_default().init = Some(Arc::new(init));
    }

    /// Returns `true` when `module` has at least one registration.
    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.read().contains_key(module)
    }

    /// Registered module ids, sorted.
    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Loads `module`, running its initialiser on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ModuleNotFound`] for unknown modules, or the
    /// initialiser's error. A failed initialiser runs again on the next load.
    pub async fn load(&self, module: &str) -> ToolResult<LoadedModule> {
        let (init, ready) = {
            let modules = self.read();
            let record = modules.get(module).ok_or_else(|| ToolError::ModuleNotFound {
                locator: module.to_owned(),
            })?;
            (record.init.clone(), Arc::clone(&record.ready))
        };

        ready
            .get_or_try_init(|| async {
                if let Some(init) = init {
                    debug!(module, "running module initialiser");
                    init().await?;
                }
                Ok::<_, ToolError>(())
            })
            .await?;

        let modules = self.read();
        let record = modules.get(module).ok_or_else(|| ToolError::ModuleNotFound {
            locator: module.to_owned(),
        })?;
        let mut loaded = LoadedModule::new(module);
        for (slot, value) in &record.exports {
            loaded = loaded.with_slot(slot.clone(), value.clone());
        }
        Ok(loaded)
    }

    fn insert(&self, module: &str, slot: ExportSlot, value: ExportValue) -> ToolResult<()> {
        let mut modules = self.write();
        let record = modules.entry(module.to_owned()).or_default();
        if record.exports.contains_key(&slot) {
            return Err(ToolError::DuplicateExport {
                module: module.to_owned(),
                export: slot.to_string(),
            });
        }
        debug!(module, export = %slot, "export registered");
        record.exports.insert(slot, value);
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ModuleRecord>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ModuleRecord>> {
        self.modules.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `default` export of a loaded module.
#[derive(Debug, Clone, Default)]
pub struct DefaultExport {
    callable: Option<ExportValue>,
    properties: BTreeMap<String, ExportValue>,
}

/// Snapshot of a module ready for function lookup.
#[derive(Debug, Clone, Default)]
pub struct LoadedModule {
    id: String,
    callable: Option<ExportValue>,
    properties: BTreeMap<String, ExportValue>,
    default: Option<DefaultExport>,
}

impl LoadedModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Places `value` in `slot`.
    #[must_use]
    pub fn with_slot(mut self, slot: ExportSlot, value: ExportValue) -> Self {
        match slot {
            ExportSlot::Named(name) => {
                self.properties.insert(name.into_owned(), value);
            }
            ExportSlot::Module => self.callable = Some(value),
            ExportSlot::Default => {
                self.default.get_or_insert_with(DefaultExport::default).callable = Some(value);
            }
            ExportSlot::DefaultNamed(name) => {
                self.default
                    .get_or_insert_with(DefaultExport::default)
                    .properties
                    .insert(name.into_owned(), value);
            }
        }
        self
    }

    /// Module id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Locates the function to invoke for `name`.
    ///
    /// Tried in order: a callable property `name`; the module itself when it
    /// is callable and `name` is one of [`CALLABLE_ALIASES`]; the callable
    /// `default` export; a callable property `name` on the `default` export.
    /// Non-callable matches are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotCallable`] when nothing matches.
    pub fn function(&self, name: &str) -> ToolResult<Arc<dyn Tool>> {
        let default = self.default.as_ref();
        self.properties
            .get(name)
            .and_then(ExportValue::callable)
            .or_else(|| {
                CALLABLE_ALIASES
                    .contains(&name)
                    .then(|| self.callable.as_ref().and_then(ExportValue::callable))
                    .flatten()
            })
            .or_else(|| default.and_then(|d| d.callable.as_ref()).and_then(ExportValue::callable))
            .or_else(|| {
                default
                    .and_then(|d| d.properties.get(name))
                    .and_then(ExportValue::callable)
            })
            .ok_or_else(|| ToolError::NotCallable {
                entry: format!("{}:{name}", self.id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> impl Tool {
        |_ctx: ToolContext, input: Value| async move { Ok::<_, ToolError>(input) }
    }

    fn tagged(tag: &'static str) -> impl Tool {
        move |_ctx: ToolContext, _input: Value| async move { Ok::<_, ToolError>(json!(tag)) }
    }

    async fn call(module: &LoadedModule, name: &str) -> Value {
        module
            .function(name)
            .unwrap()
            .invoke(ToolContext::native(), json!({ "x": 1 }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn register_and_invoke_named_export() {
        let registry = ModuleRegistry::new();
        registry
            .register_export("tools/echo", ExportSlot::named("run"), echo())
            .unwrap();

        let module = registry.load("tools/echo").await.unwrap();
        assert_eq!(call(&module, "run").await, json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn lookup_order_prefers_named_then_module_then_default() {
        let module = LoadedModule::new("tools/multi")
            .with_slot(ExportSlot::named("run"), ExportValue::function(tagged("named")))
            .with_slot(ExportSlot::Module, ExportValue::function(tagged("module")))
            .with_slot(ExportSlot::Default, ExportValue::function(tagged("default")))
            .with_slot(ExportSlot::default_named("extra"), ExportValue::function(tagged("default.extra")));

        assert_eq!(call(&module, "run").await, json!("named"));
        assert_eq!(call(&module, "default").await, json!("module"));
        assert_eq!(call(&module, "anything").await, json!("default"));
    }

    #[tokio::test]
    async fn callable_module_needs_an_alias() {
        let module = LoadedModule::new("tools/fn")
            .with_slot(ExportSlot::Module, ExportValue::function(tagged("module")));

        assert_eq!(call(&module, "run").await, json!("module"));
        let err = module.function("other").err().unwrap();
        assert!(matches!(err, ToolError::NotCallable { entry } if entry == "tools/fn:other"));
    }

    #[tokio::test]
    async fn named_property_on_default_export() {
        let module = LoadedModule::new("tools/obj")
            .with_slot(ExportSlot::default_named("go"), ExportValue::function(tagged("go")));

        assert_eq!(call(&module, "go").await, json!("go"));
        assert!(module.function("stop").is_err());
    }

    #[tokio::test]
    async fn constants_are_never_callable() {
        let registry = ModuleRegistry::new();
        registry
            .register_constant("tools/config", ExportSlot::named("run"), json!(42))
            .unwrap();

        let module = registry.load("tools/config").await.unwrap();
        let err = module.function("run").err().unwrap();
        assert_eq!(err.type_name(), "TypeError");
    }

    #[tokio::test]
    async fn duplicate_slots_error() {
        let registry = ModuleRegistry::new();
        registry
            .register_export("tools/echo", ExportSlot::named("run"), echo())
            .unwrap();
        let err = registry
            .register_export("tools/echo", ExportSlot::named("run"), echo())
            .expect_err("duplicate registration should fail");

        assert!(matches!(err, ToolError::DuplicateExport { module, export } if module == "tools/echo" && export == "run"));
    }

    #[tokio::test]
    async fn unknown_module_errors() {
        let err = ModuleRegistry::new().load("missing").await.unwrap_err();
        assert!(matches!(err, ToolError::ModuleNotFound { locator } if locator == "missing"));
    }

    #[tokio::test]
    async fn initialiser_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static RUNS: AtomicUsize = AtomicUsize::new(0);
        let registry = ModuleRegistry::new();
        registry
            .register_export("tools/lazy", ExportSlot::named("run"), echo())
            .unwrap();
        registry.register_init("tools/lazy", || -> InitFuture {
            Box::pin(async {
                RUNS.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ToolError>(())
            })
        });

        registry.load("tools/lazy").await.unwrap();
        registry.load("tools/lazy").await.unwrap();
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }
}
