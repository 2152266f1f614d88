//! Environment variable access.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::AccessResult;

/// Reads and writes environment variables on behalf of tool code.
pub trait EnvAccessor: Send + Sync {
    /// Returns the value of `key`, if set.
    ///
    /// # Errors
    ///
    /// Guarded accessors return a violation when the read is denied.
    fn get(&self, key: &str) -> AccessResult<Option<String>>;

    /// Returns `true` when `key` is set.
    ///
    /// # Errors
    ///
    /// Guarded accessors return a violation when the read is denied.
    fn contains(&self, key: &str) -> AccessResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Sets `key` to `value`.
    ///
    /// # Errors
    ///
    /// Guarded accessors return a violation when the write is denied.
    fn set(&self, key: &str, value: &str) -> AccessResult<()>;

    /// Removes `key`, returning its previous value.
    ///
    /// # Errors
    ///
    /// Guarded accessors return a violation when the write is denied.
    fn remove(&self, key: &str) -> AccessResult<Option<String>>;

    /// Every variable currently set, sorted by name.
    ///
    /// # Errors
    ///
    /// Guarded accessors return a violation when enumeration is denied.
    fn vars(&self) -> AccessResult<Vec<(String, String)>>;
}

/// In-process environment store.
///
/// Seeded from the real environment and mutated in place, so writes never
/// touch process-global state. Spawned children receive [`ProcessEnv::snapshot`].
#[derive(Debug, Default)]
pub struct ProcessEnv {
    vars: RwLock<BTreeMap<String, String>>,
}

impl ProcessEnv {
    /// Captures the current process environment, skipping non-UTF-8 entries.
    #[must_use]
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    /// Builds a store from explicit pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: RwLock::new(
                vars.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    /// Copy of every variable, for handing to child processes.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EnvAccessor for ProcessEnv {
    fn get(&self, key: &str) -> AccessResult<Option<String>> {
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        Ok(vars.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AccessResult<()> {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        vars.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> AccessResult<Option<String>> {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        Ok(vars.remove(key))
    }

    fn vars(&self) -> AccessResult<Vec<(String, String)>> {
        Ok(self.snapshot().into_iter().collect())
    }
}
