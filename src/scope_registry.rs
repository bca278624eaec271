//! Per-call scopes and their ambient registration on the call context.
//!
//! A [`CallScope`] is the owned child scope created for exactly one call. The
//! [`ScopeRegistry`] makes it discoverable from the call's [`CallContext`]
//! while the call is in flight. The entry the registry exposes is
//! non-owning: it holds a `Weak` handle, so looking a scope up can never keep
//! it alive past its disposal.
//!
//! The registry lives in the call's extension slot rather than in a
//! process-wide table, so two calls can never observe each other's scope.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::call::{CallContext, CallId};
use crate::container::{Instance, LifetimeScope};
use crate::error::{DispatchError, DispatchResult};
use crate::key::ContractKey;
use crate::observer::Observers;
use crate::traits::ScopeResolveExt;

/// The lifetime scope owned by a single call.
///
/// Disposal is idempotent: the first call disposes the underlying container
/// scope, later calls return `Ok(())` and do nothing. A `CallScope` dropped
/// without being disposed disposes itself, so a scope can not outlive its
/// last owner.
pub struct CallScope {
    call_id: CallId,
    contract: ContractKey,
    scope: Box<dyn LifetimeScope>,
    disposed: AtomicBool,
    observers: Observers,
}

impl CallScope {
    /// Wraps a container scope created for `call_id`.
    pub fn new(call_id: CallId, contract: ContractKey, scope: Box<dyn LifetimeScope>) -> Self {
        Self {
            call_id,
            contract,
            scope,
            disposed: AtomicBool::new(false),
            observers: Observers::new(),
        }
    }

    pub(crate) fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Contract whose instance this scope was created to serve.
    pub fn contract(&self) -> &ContractKey {
        &self.contract
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Resolves `key` from this scope and downcasts it to `T`.
    pub fn resolve_as<T: Send + Sync + 'static>(&self, key: &ContractKey) -> DispatchResult<Arc<T>> {
        ScopeResolveExt::resolve_as(self, key)
    }
}

impl LifetimeScope for CallScope {
    fn resolve(&self, key: &ContractKey) -> DispatchResult<Instance> {
        if self.is_disposed() {
            return Err(DispatchError::ScopeDisposed);
        }
        self.scope.resolve(key)
    }

    fn is_registered(&self, key: &ContractKey) -> bool {
        self.scope.is_registered(key)
    }

    fn dispose(&self) -> DispatchResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.scope.dispose();
        tracing::debug!(call = %self.call_id, contract = %self.contract, "call scope disposed");
        self.observers.scope_disposed(self.call_id, &self.contract);
        result
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        if !self.is_disposed() {
            if let Err(err) = LifetimeScope::dispose(self) {
                tracing::warn!(call = %self.call_id, error = %err, "call scope dropped with failing release hooks");
            }
        }
    }
}

impl fmt::Debug for CallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallScope")
            .field("call_id", &self.call_id)
            .field("contract", &self.contract)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Non-owning registry entry stored in the call's extensions.
#[derive(Clone)]
pub(crate) struct AmbientScope {
    call_id: CallId,
    scope: Weak<CallScope>,
}

impl AmbientScope {
    fn upgrade(&self) -> Option<Arc<CallScope>> {
        self.scope.upgrade().filter(|scope| !scope.is_disposed())
    }
}

/// Owning slot used by the instance provider between get and release.
struct ScopeOwnership(Arc<CallScope>);

/// Ambient lookup of the scope serving a call.
///
/// Obtained from [`CallContext::scopes`]. All operations key off the call's
/// identity, never the current thread, so get and release may run on
/// different workers.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{CallContext, CallScope, ComponentRegistry, Container, ContractKey};
/// use std::sync::Arc;
///
/// let container = ComponentRegistry::new().build();
/// let call = CallContext::new();
/// let scope = Arc::new(CallScope::new(
///     call.id(),
///     ContractKey::named("Echo"),
///     container.create_child_scope().unwrap(),
/// ));
///
/// call.scopes().attach(&scope).unwrap();
/// assert!(call.scopes().attach(&scope).is_err()); // one scope per call
/// assert!(Arc::ptr_eq(&call.current_scope().unwrap(), &scope));
///
/// assert!(call.scopes().detach());
/// assert!(!call.scopes().detach()); // idempotent
/// ```
pub struct ScopeRegistry<'a> {
    call: &'a CallContext,
}

impl<'a> ScopeRegistry<'a> {
    pub(crate) fn new(call: &'a CallContext) -> Self {
        Self { call }
    }

    /// Attaches `scope` to the call.
    ///
    /// Fails with [`DispatchError::ScopeAlreadyAttached`] if a live scope is
    /// already attached, and with [`DispatchError::ArgumentInvalid`] if the
    /// scope was created for a different call.
    pub fn attach(&self, scope: &Arc<CallScope>) -> DispatchResult<()> {
        if scope.call_id() != self.call.id() {
            return Err(DispatchError::ArgumentInvalid("scope"));
        }
        let mut extensions = self.call.extensions();
        let occupied = extensions
            .get::<AmbientScope>()
            .and_then(AmbientScope::upgrade)
            .is_some();
        if occupied {
            return Err(DispatchError::ScopeAlreadyAttached(self.call.id()));
        }
        extensions.insert(AmbientScope {
            call_id: scope.call_id(),
            scope: Arc::downgrade(scope),
        });
        Ok(())
    }

    /// The live scope attached to the call, if any.
    pub fn lookup(&self) -> Option<Arc<CallScope>> {
        self.call
            .ambient()
            .filter(|entry| entry.call_id == self.call.id())
            .and_then(|entry| entry.upgrade())
    }

    /// Removes the entry. Returns `true` if one was present.
    pub fn detach(&self) -> bool {
        self.call.extensions().remove::<AmbientScope>().is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.lookup().is_some()
    }

    /// Publishes the ambient entry and hands ownership of `scope` to the call
    /// in one step. A live scope attached through [`attach`](Self::attach)
    /// blocks publishing just as an owned one does.
    pub(crate) fn publish(&self, scope: &Arc<CallScope>) -> DispatchResult<()> {
        let mut extensions = self.call.extensions();
        let occupied = extensions.contains::<ScopeOwnership>()
            || extensions
                .get::<AmbientScope>()
                .and_then(AmbientScope::upgrade)
                .is_some();
        if occupied {
            return Err(DispatchError::ScopeAlreadyAttached(self.call.id()));
        }
        extensions.insert(AmbientScope {
            call_id: scope.call_id(),
            scope: Arc::downgrade(scope),
        });
        extensions.insert(ScopeOwnership(scope.clone()));
        Ok(())
    }

    /// Removes both the ambient entry and the owning slot, returning the
    /// owned scope. The entry is gone before the caller disposes the scope.
    pub(crate) fn retract(&self) -> Option<Arc<CallScope>> {
        let mut extensions = self.call.extensions();
        extensions.remove::<AmbientScope>();
        extensions.remove::<ScopeOwnership>().map(|owned| owned.0)
    }
}

impl fmt::Debug for ScopeRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("call", &self.call.id())
            .field("attached", &self.is_attached())
            .finish()
    }
}
