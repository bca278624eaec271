//! Per-call context: identity, cancellation, and a typed extension map.
//!
//! Every call dispatched to a hosted service carries a [`CallContext`]. The
//! bridge stores the call's lifetime scope in the context's extensions (see
//! [`ScopeRegistry`]), so code running inside the operation can reach the
//! same scope without it being passed explicitly.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{DispatchError, DispatchResult};
use crate::scope_registry::{AmbientScope, CallScope, ScopeRegistry};

/// Process-unique identifier of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    /// Allocates the next identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CallId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identifier, e.g. one carried on the wire.
    pub fn from_raw(raw: u64) -> Self {
        CallId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Type-keyed storage attached to a call.
///
/// At most one value per type. Values must be `Send + Sync` because a call
/// context may be observed from the thread that releases its instance.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}

/// A token that signals cancellation of a call or of a whole host.
///
/// Child tokens observe their parent: cancelling a host's token cancels every
/// call token derived from it.
///
/// ```rust
/// use ferrous_dispatch::CancellationToken;
///
/// let host = CancellationToken::new();
/// let call = host.child_token();
///
/// host.cancel();
/// assert!(call.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationInner>,
}

#[derive(Default)]
struct CancellationInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled when either it or `self` is.
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(CancellationInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.inner.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Context of a single call.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::CallContext;
///
/// struct TenantId(&'static str);
///
/// let call = CallContext::new().with_action("Echo/Say");
/// call.extensions().insert(TenantId("acme"));
///
/// assert_eq!(call.action(), Some("Echo/Say"));
/// assert_eq!(call.extensions().get::<TenantId>().map(|t| t.0), Some("acme"));
/// assert!(call.current_scope().is_none());
/// ```
pub struct CallContext {
    id: CallId,
    action: Option<String>,
    extensions: Mutex<Extensions>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// Creates a context with a fresh [`CallId`].
    pub fn new() -> Self {
        Self::with_id(CallId::next())
    }

    pub fn with_id(id: CallId) -> Self {
        Self {
            id,
            action: None,
            extensions: Mutex::new(Extensions::new()),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the operation name carried by the call.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Replaces the call's cancellation token, typically with a child of the
    /// host's token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`DispatchError::Cancelled`] if the call was cancelled.
    pub fn ensure_active(&self) -> DispatchResult<()> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled(self.id))
        } else {
            Ok(())
        }
    }

    /// Locks the call's extension map.
    ///
    /// Do not hold the guard across a call into the container or the
    /// registry; both lock the same map.
    pub fn extensions(&self) -> MutexGuard<'_, Extensions> {
        self.extensions.lock()
    }

    /// Registry view over this call's scope entry.
    pub fn scopes(&self) -> ScopeRegistry<'_> {
        ScopeRegistry::new(self)
    }

    /// The lifetime scope currently serving this call, if any.
    pub fn current_scope(&self) -> Option<Arc<CallScope>> {
        self.scopes().lookup()
    }

    pub(crate) fn ambient(&self) -> Option<AmbientScope> {
        self.extensions.lock().get::<AmbientScope>().cloned()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
