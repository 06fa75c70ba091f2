//! Name-keyed service registry.
//!
//! One [`Services`] lives on the [`App`](crate::App) and is shared by every
//! in-flight request. Registration normally happens once at startup, reads
//! happen on every request, so a single `RwLock` around the map is enough.
//!
//! Values are stored type-erased as [`ServiceRef`]. The `*_as` accessors
//! perform a checked downcast and report [`Error::TypeMismatch`] instead of
//! handing back the wrong type.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Error;

/// A shared, type-erased service instance.
pub type ServiceRef = Arc<dyn Any + Send + Sync>;

/// Wraps a value as a [`ServiceRef`].
pub fn service<T: Any + Send + Sync>(value: T) -> ServiceRef {
    Arc::new(value)
}

/// Concurrency-safe registry of named services.
///
/// Cloning is cheap and yields a handle to the *same* registry.
#[derive(Clone, Default)]
pub struct Services {
    entries: Arc<RwLock<HashMap<String, ServiceRef>>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry holding every entry of `base`, with `overrides`
    /// replacing entries of the same name.
    pub fn layered<I>(base: &Services, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, ServiceRef)>,
    {
        let mut entries = base.all();
        entries.extend(overrides);
        Self { entries: Arc::new(RwLock::new(entries)) }
    }

    /// Stores `value` under `name`, silently replacing any previous entry.
    pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.register_ref(name, Arc::new(value));
    }

    /// Stores an already shared instance under `name`.
    pub fn register_ref(&self, name: impl Into<String>, value: ServiceRef) {
        self.write().insert(name.into(), value);
    }

    /// Stores `value` keyed by its type name. Pair with [`get_by_type`](Self::get_by_type).
    pub fn register_type<T: Any + Send + Sync>(&self, value: T) {
        self.register(type_name::<T>(), value);
    }

    pub fn get(&self, name: &str) -> Result<ServiceRef, Error> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_owned()))
    }

    /// Looks up `name` and downcasts it to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        downcast(name, self.get(name)?)
    }

    pub fn get_by_type<T: Any + Send + Sync>(&self) -> Result<Arc<T>, Error> {
        self.get_as(type_name::<T>())
    }

    /// Like [`get`](Self::get), for call sites where a missing service is a bug.
    ///
    /// # Panics
    ///
    /// Panics if nothing is registered under `name`.
    pub fn must_get(&self, name: &str) -> ServiceRef {
        self.get(name).unwrap_or_else(|e| panic!("{e}"))
    }

    /// # Panics
    ///
    /// Panics if `name` is missing or holds a type other than `T`.
    pub fn must_get_as<T: Any + Send + Sync>(&self, name: &str) -> Arc<T> {
        self.get_as(name).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// A point-in-time copy of every entry.
    pub fn all(&self) -> HashMap<String, ServiceRef> {
        self.read().clone()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written entry:
    // values are inserted or removed whole, so a poisoned map is still valid.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceRef>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceRef>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("Services").field("names", &names).finish()
    }
}

pub(crate) fn downcast<T: Any + Send + Sync>(name: &str, value: ServiceRef) -> Result<Arc<T>, Error> {
    value.downcast::<T>().map_err(|_| Error::TypeMismatch {
        name: name.to_owned(),
        expected: type_name::<T>(),
    })
}
