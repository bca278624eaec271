//! Disposal trait for component cleanup.

/// Trait for synchronous resource disposal.
///
/// Implement this trait for components that need structured teardown when
/// the scope that resolved them ends (flushing buffers, returning pooled
/// connections). Register it with [`ComponentBuilder::disposable`]; hooks run
/// in LIFO order when the owning scope is disposed.
///
/// # Examples
///
/// ```
/// use ferrous_dispatch::{ComponentRegistry, Container, ContractKey, Dispose, Lifetime, LifetimeScope};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// struct UnitOfWork {
///     committed: Arc<AtomicBool>,
/// }
///
/// impl Dispose for UnitOfWork {
///     fn dispose(&self) {
///         self.committed.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let committed = Arc::new(AtomicBool::new(false));
/// let flag = committed.clone();
///
/// let mut registry = ComponentRegistry::new();
/// registry
///     .register(ContractKey::named("uow"), Lifetime::Scoped, move |_| {
///         Ok(UnitOfWork { committed: flag.clone() })
///     })
///     .disposable();
///
/// let container = registry.build();
/// let scope = container.create_child_scope().unwrap();
/// scope.resolve(&ContractKey::named("uow")).unwrap();
/// scope.dispose().unwrap();
/// assert!(committed.load(Ordering::SeqCst));
/// ```
///
/// [`ComponentBuilder::disposable`]: crate::ComponentBuilder::disposable
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}
