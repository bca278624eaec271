//! Container capability consumed by the dispatch bridge.
//!
//! The bridge never builds object graphs itself. It asks a [`Container`] for
//! a fresh child scope per call, asks that [`LifetimeScope`] for the service
//! instance, and disposes the scope when the call ends. Any container that
//! can provide those three operations can back a host.
//!
//! [`components`] holds a small reference implementation used by hosts that
//! have no container of their own and by the test-suite.

use std::any::Any;
use std::sync::Arc;

use crate::error::DispatchResult;
use crate::key::ContractKey;

pub mod components;

pub use components::{ChildScope, ComponentBuilder, ComponentRegistry, RootContainer};

/// Type-erased service instance handed to the dispatch runtime.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// The root of a dependency container.
///
/// Top-level registration data is read-only once a host is open, so the
/// container is shared between concurrent calls without locking.
pub trait Container: Send + Sync {
    /// Creates a child scope owning everything resolved through it.
    fn create_child_scope(&self) -> DispatchResult<Box<dyn LifetimeScope>>;

    /// Returns `true` if a component is registered under `key`.
    fn is_registered(&self, key: &ContractKey) -> bool;
}

/// A nested container whose resolved objects live and die together.
///
/// Object-safe core of scope resolution; typed helpers live in
/// [`ScopeResolveExt`](crate::ScopeResolveExt).
pub trait LifetimeScope: Send + Sync {
    /// Resolves the component registered under `key` within this scope.
    fn resolve(&self, key: &ContractKey) -> DispatchResult<Instance>;

    /// Returns `true` if a component is registered under `key`.
    fn is_registered(&self, key: &ContractKey) -> bool;

    /// Disposes the scope and everything it owns.
    ///
    /// Must be idempotent: a second call is a no-op returning `Ok(())`.
    fn dispose(&self) -> DispatchResult<()>;
}

impl<C: Container + ?Sized> Container for Arc<C> {
    fn create_child_scope(&self) -> DispatchResult<Box<dyn LifetimeScope>> {
        (**self).create_child_scope()
    }

    fn is_registered(&self, key: &ContractKey) -> bool {
        (**self).is_registered(key)
    }
}
