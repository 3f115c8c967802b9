//! NamespaceRegistry - process-wide table of opened namespaces
//!
//! Opening a namespace twice must hand out the same engine handle, so
//! engines keep one registry each and route every open through it.
//! Entries are created lazily and never torn down implicitly: only
//! `release` (called from `Database::delete_database`) removes them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mapping from namespace name to a shared engine handle
pub struct NamespaceRegistry<D> {
    entries: Mutex<HashMap<String, Arc<D>>>,
}

impl<D> NamespaceRegistry<D> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the handle registered for `namespace`, if any
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<Arc<D>> {
        self.entries.lock().get(namespace).cloned()
    }

    /// Get the handle for `namespace`, opening it with `open` on first use.
    ///
    /// The registry lock is held while `open` runs, so concurrent callers
    /// never open the same namespace twice.
    ///
    /// # Errors
    /// Returns the error of `open`; nothing is registered in that case.
    pub fn get_or_open<E>(
        &self,
        namespace: &str,
        open: impl FnOnce() -> Result<D, E>,
    ) -> Result<Arc<D>, E> {
        let mut entries = self.entries.lock();
        if let Some(db) = entries.get(namespace) {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(open()?);
        entries.insert(namespace.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Remove the entry for `namespace` if it still points at `db`.
    ///
    /// A newer handle registered under the same name is left alone.
    /// Returns true if an entry was removed.
    pub fn release(&self, namespace: &str, db: &D) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(namespace) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), db) => {
                entries.remove(namespace);
                true
            }
            _ => false,
        }
    }

    /// Registered namespace names, sorted
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<D> Default for NamespaceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}
