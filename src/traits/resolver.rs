//! Typed resolution helpers on top of the object-safe scope trait.

use std::any::Any;
use std::sync::Arc;

use crate::container::LifetimeScope;
use crate::error::{DispatchError, DispatchResult};
use crate::key::ContractKey;

/// Generic resolution methods for any [`LifetimeScope`].
///
/// [`LifetimeScope`] stays object-safe and deals in type-erased instances;
/// this extension trait adds the downcasting layer. It is implemented for
/// every scope, including `dyn LifetimeScope`.
///
/// # Examples
///
/// ```
/// use ferrous_dispatch::{ComponentRegistry, Container, ContractKey, Lifetime, ScopeResolveExt, DispatchError};
///
/// let mut registry = ComponentRegistry::new();
/// registry.register_instance(ContractKey::named("greeting"), String::from("hello"));
/// let container = registry.build();
/// let scope = container.create_child_scope().unwrap();
///
/// let greeting = scope.resolve_as::<String>(&ContractKey::named("greeting")).unwrap();
/// assert_eq!(greeting.as_str(), "hello");
///
/// // Asking for the wrong type is reported, not panicked on
/// let wrong = scope.resolve_as::<u32>(&ContractKey::named("greeting"));
/// assert!(matches!(wrong, Err(DispatchError::TypeMismatch(_))));
///
/// // Optional resolution distinguishes "missing" from "failed"
/// assert!(scope.resolve_optional::<String>(&ContractKey::named("absent")).unwrap().is_none());
/// ```
pub trait ScopeResolveExt: LifetimeScope {
    /// Resolves `key` and downcasts the instance to `T`.
    fn resolve_as<T>(&self, key: &ContractKey) -> DispatchResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| DispatchError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves the component keyed by the type `T` itself.
    fn resolve_type<T>(&self) -> DispatchResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve_as::<T>(&ContractKey::of::<T>())
    }

    /// Like [`resolve_as`](Self::resolve_as), but returns `Ok(None)` when
    /// nothing is registered for `key`.
    fn resolve_optional<T>(&self, key: &ContractKey) -> DispatchResult<Option<Arc<T>>>
    where
        T: Any + Send + Sync,
    {
        if !self.is_registered(key) {
            return Ok(None);
        }
        self.resolve_as::<T>(key).map(Some)
    }
}

impl<S: LifetimeScope + ?Sized> ScopeResolveExt for S {}
