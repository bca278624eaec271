//! Instance providers installed on endpoint dispatchers.
//!
//! The dispatch runtime asks an endpoint's provider for an instance before
//! each call and hands it back once the call is over. Three providers exist:
//!
//! - [`PerCallInstanceProvider`]: a fresh child scope per call, disposed at
//!   release. The common case.
//! - [`SingletonInstanceProvider`]: one instance resolved once inside a
//!   host-lifetime scope; release is a no-op.
//! - [`FixedInstanceProvider`]: an instance the host was constructed with.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::call::CallContext;
use crate::container::{Container, Instance, LifetimeScope};
use crate::descriptor::ServiceDescriptor;
use crate::error::{DispatchError, DispatchResult};
use crate::observer::Observers;
use crate::scope_registry::CallScope;

/// The per-endpoint instance slot of the dispatch runtime.
///
/// `get_instance` and `release_instance` for one call may run on different
/// threads; implementations key all per-call state off the [`CallContext`].
pub trait InstanceProvider: Send + Sync {
    /// Produces the instance that will serve `call`.
    fn get_instance(&self, call: &CallContext) -> DispatchResult<Instance>;

    /// Gives the instance back once `call` has completed or been abandoned.
    ///
    /// Must tolerate being called for a call whose `get_instance` failed, and
    /// being called more than once.
    fn release_instance(&self, call: &CallContext, instance: Instance) -> DispatchResult<()>;
}

/// Creates one container scope per call and disposes it when the call ends.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{
///     CallContext, ComponentRegistry, InstanceProvider, Lifetime,
///     PerCallInstanceProvider, ServiceDescriptor,
/// };
/// use std::sync::Arc;
///
/// struct Echo;
///
/// let mut registry = ComponentRegistry::new();
/// registry.register("Echo", Lifetime::Scoped, |_| Ok(Echo));
/// let container = Arc::new(registry.build());
///
/// let descriptor = ServiceDescriptor::builder()
///     .contract("Echo")
///     .resolve_contract()
///     .build()
///     .unwrap();
/// let provider = PerCallInstanceProvider::new(container, descriptor);
///
/// let call = CallContext::new();
/// let instance = provider.get_instance(&call).unwrap();
/// assert!(call.current_scope().is_some());
///
/// provider.release_instance(&call, instance).unwrap();
/// assert!(call.current_scope().is_none());
/// ```
pub struct PerCallInstanceProvider {
    container: Arc<dyn Container>,
    descriptor: ServiceDescriptor,
    observers: Observers,
}

impl PerCallInstanceProvider {
    pub fn new(container: Arc<dyn Container>, descriptor: ServiceDescriptor) -> Self {
        Self {
            container,
            descriptor,
            observers: Observers::new(),
        }
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }
}

impl InstanceProvider for PerCallInstanceProvider {
    /// Creates the call's scope and resolves the descriptor in it.
    ///
    /// The scope is published on the call only after resolution succeeded.
    /// On failure the scope is disposed before the error is returned, so
    /// ambient lookup never sees it.
    fn get_instance(&self, call: &CallContext) -> DispatchResult<Instance> {
        let contract = self.descriptor.contract();
        let scope = self.container.create_child_scope()?;
        let scope = Arc::new(
            CallScope::new(call.id(), contract.clone(), scope).with_observers(self.observers.clone()),
        );
        self.observers.scope_created(call.id(), contract);
        tracing::debug!(call = %call.id(), %contract, "per-call scope created");

        let instance = match self.descriptor.resolve(&*scope) {
            Ok(instance) => instance,
            Err(err) => {
                self.observers.resolution_failed(call.id(), contract, &err);
                if let Err(dispose_err) = scope.dispose() {
                    tracing::warn!(call = %call.id(), error = %dispose_err, "failed to dispose scope after resolution failure");
                }
                return Err(err);
            }
        };

        if let Err(err) = call.scopes().publish(&scope) {
            drop(instance);
            if let Err(dispose_err) = scope.dispose() {
                tracing::warn!(call = %call.id(), error = %dispose_err, "failed to dispose unpublished scope");
            }
            return Err(err);
        }

        self.observers.instance_resolved(call.id(), contract);
        Ok(instance)
    }

    /// Retracts the call's scope and disposes it.
    ///
    /// A call with no published scope is a no-op. Timeouts and communication
    /// faults raised while disposing are logged and suppressed; any other
    /// disposal error is returned.
    fn release_instance(&self, call: &CallContext, instance: Instance) -> DispatchResult<()> {
        let Some(scope) = call.scopes().retract() else {
            tracing::trace!(call = %call.id(), "no scope to release");
            return Ok(());
        };
        drop(instance);

        match scope.dispose() {
            Ok(()) => Ok(()),
            Err(err) if err.is_release_fault() => {
                tracing::warn!(call = %call.id(), error = %err, "suppressed release fault");
                self.observers.release_suppressed(call.id(), scope.contract(), &err);
                Ok(())
            }
            Err(err) => {
                tracing::error!(call = %call.id(), error = %err, "scope disposal failed");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for PerCallInstanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerCallInstanceProvider")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Serves every call from one instance resolved in a host-lifetime scope.
///
/// The descriptor runs at most once, however many calls race on the first
/// activation. Its outcome is kept either way: a failed activation is
/// reported again to every later call instead of being retried. The scope,
/// and with it the instance's dependencies, is disposed by
/// [`shutdown`](Self::shutdown), which the binder registers as a host close
/// hook.
pub struct SingletonInstanceProvider {
    container: Arc<dyn Container>,
    descriptor: ServiceDescriptor,
    outcome: OnceCell<DispatchResult<Instance>>,
    // `shut_down` only flips while this lock is held.
    scope: Mutex<Option<Box<dyn LifetimeScope>>>,
    shut_down: AtomicBool,
}

impl SingletonInstanceProvider {
    pub fn new(container: Arc<dyn Container>, descriptor: ServiceDescriptor) -> Self {
        Self {
            container,
            descriptor,
            outcome: OnceCell::new(),
            scope: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Resolves the singleton if that has not happened yet.
    pub fn activate(&self) -> DispatchResult<Instance> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DispatchError::ScopeDisposed);
        }
        self.outcome.get_or_init(|| self.resolve_once()).clone()
    }

    fn resolve_once(&self) -> DispatchResult<Instance> {
        let contract = self.descriptor.contract();
        let scope = self.container.create_child_scope()?;
        let instance = match self.descriptor.resolve(scope.as_ref()) {
            Ok(instance) => instance,
            Err(err) => {
                tracing::warn!(%contract, error = %err, "singleton activation failed");
                if let Err(dispose_err) = scope.dispose() {
                    tracing::warn!(error = %dispose_err, "failed to dispose singleton scope after resolution failure");
                }
                return Err(err);
            }
        };

        let mut slot = self.scope.lock();
        if self.shut_down.load(Ordering::Acquire) {
            drop(slot);
            drop(instance);
            tracing::debug!(%contract, "host closed during singleton activation");
            if let Err(dispose_err) = scope.dispose() {
                tracing::warn!(error = %dispose_err, "failed to dispose singleton scope activated after shutdown");
            }
            return Err(DispatchError::ScopeDisposed);
        }
        *slot = Some(scope);
        tracing::debug!(%contract, "singleton activated");
        Ok(instance)
    }

    pub fn is_activated(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    /// Disposes the host-lifetime scope. Later activations fail with
    /// [`DispatchError::ScopeDisposed`], and an activation still in flight
    /// disposes its own scope instead of keeping it.
    pub fn shutdown(&self) -> DispatchResult<()> {
        let scope = {
            let mut slot = self.scope.lock();
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            slot.take()
        };
        match scope {
            Some(scope) => scope.dispose(),
            None => Ok(()),
        }
    }
}

impl InstanceProvider for SingletonInstanceProvider {
    fn get_instance(&self, _call: &CallContext) -> DispatchResult<Instance> {
        self.activate()
    }

    fn release_instance(&self, _call: &CallContext, _instance: Instance) -> DispatchResult<()> {
        Ok(())
    }
}

impl fmt::Debug for SingletonInstanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonInstanceProvider")
            .field("descriptor", &self.descriptor)
            .field("activated", &self.is_activated())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}

/// Serves an instance owned by the runtime itself.
#[derive(Clone)]
pub struct FixedInstanceProvider {
    instance: Instance,
}

impl FixedInstanceProvider {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }
}

impl InstanceProvider for FixedInstanceProvider {
    fn get_instance(&self, _call: &CallContext) -> DispatchResult<Instance> {
        Ok(self.instance.clone())
    }

    fn release_instance(&self, _call: &CallContext, _instance: Instance) -> DispatchResult<()> {
        Ok(())
    }
}

impl fmt::Debug for FixedInstanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FixedInstanceProvider")
    }
}
