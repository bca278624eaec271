//! Reference in-memory container.
//!
//! A deliberately small [`Container`] implementation: components keyed by
//! [`ContractKey`], three lifetimes, and LIFO release hooks. It exists so a
//! host can be wired up without pulling in a full DI framework, and so the
//! bridge can be exercised end to end. Registration is closed once
//! [`ComponentRegistry::build`] runs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::{Container, Instance, LifetimeScope};
use crate::error::{DispatchError, DispatchResult};
use crate::internal::DisposeBag;
use crate::key::ContractKey;
use crate::lifetime::Lifetime;
use crate::release::{safe_release, CommunicationObject};
use crate::traits::Dispose;

type Factory = Arc<dyn Fn(&dyn LifetimeScope) -> DispatchResult<Instance> + Send + Sync>;
type ReleaseFn = Arc<dyn Fn(&Instance) -> DispatchResult<()> + Send + Sync>;

struct Component {
    lifetime: Lifetime,
    factory: Factory,
    release: Option<ReleaseFn>,
    singleton: OnceCell<Instance>,
}

impl Component {
    fn new(lifetime: Lifetime, factory: Factory) -> Self {
        Self {
            lifetime,
            factory,
            release: None,
            singleton: OnceCell::new(),
        }
    }
}

/// Registration surface of the reference container.
///
/// # Examples
///
/// ```
/// use ferrous_dispatch::{ComponentRegistry, Container, ContractKey, Lifetime, ScopeResolveExt};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct Repository { db: Arc<Database> }
///
/// let mut registry = ComponentRegistry::new();
/// registry.register_instance(ContractKey::of::<Database>(), Database {
///     url: "postgres://localhost".to_string(),
/// });
/// registry.register_type::<Repository, _>(Lifetime::Scoped, |scope| {
///     Ok(Repository { db: scope.resolve_type::<Database>()? })
/// });
///
/// let container = registry.build();
/// let scope = container.create_child_scope().unwrap();
/// let repo = scope.resolve_type::<Repository>().unwrap();
/// assert_eq!(repo.db.url, "postgres://localhost");
/// ```
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<ContractKey, Component>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `key`. A later registration for the same key
    /// replaces the earlier one.
    pub fn register<T, F>(
        &mut self,
        key: impl Into<ContractKey>,
        lifetime: Lifetime,
        factory: F,
    ) -> ComponentBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn LifetimeScope) -> DispatchResult<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope: &dyn LifetimeScope| {
            factory(scope).map(|value| Arc::new(value) as Instance)
        });
        self.insert(key.into(), Component::new(lifetime, factory))
    }

    /// Registers a factory keyed by the type `T` itself.
    pub fn register_type<T, F>(&mut self, lifetime: Lifetime, factory: F) -> ComponentBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn LifetimeScope) -> DispatchResult<T> + Send + Sync + 'static,
    {
        self.register(ContractKey::of::<T>(), lifetime, factory)
    }

    /// Registers a pre-built singleton.
    ///
    /// The instance is externally owned: release hooks attached to it never
    /// run, because the container did not create it.
    pub fn register_instance<T>(&mut self, key: impl Into<ContractKey>, value: T) -> ComponentBuilder<'_, T>
    where
        T: Send + Sync + 'static,
    {
        let instance: Instance = Arc::new(value);
        let shared = instance.clone();
        let factory: Factory = Arc::new(move |_: &dyn LifetimeScope| Ok(shared.clone()));
        let mut component = Component::new(Lifetime::Singleton, factory);
        component.singleton = OnceCell::with_value(instance);
        self.insert(key.into(), component)
    }

    /// Returns `true` if `key` has a registration.
    pub fn contains(&self, key: &ContractKey) -> bool {
        self.components.contains_key(key)
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Closes registration and produces the root container.
    pub fn build(self) -> RootContainer {
        RootContainer {
            inner: Arc::new(RootInner {
                components: self.components,
                disposers: Mutex::new(DisposeBag::default()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn insert<T>(&mut self, key: ContractKey, component: Component) -> ComponentBuilder<'_, T> {
        let component = match self.components.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(component);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(component),
        };
        ComponentBuilder {
            component,
            _marker: PhantomData,
        }
    }
}

/// Fluent configuration of a single registration.
pub struct ComponentBuilder<'a, T> {
    component: &'a mut Component,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentBuilder<'_, T>
where
    T: Send + Sync + 'static,
{
    /// Runs `hook` when the scope owning an instance is disposed.
    ///
    /// Scoped and transient instances are owned by the scope that resolved
    /// them; singletons are owned by the root container.
    pub fn on_release<F>(self, hook: F) -> Self
    where
        F: Fn(&T) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.component.release = Some(Arc::new(move |instance: &Instance| {
            match (**instance).downcast_ref::<T>() {
                Some(value) => hook(value),
                None => Err(DispatchError::TypeMismatch(std::any::type_name::<T>())),
            }
        }));
        self
    }

    /// Calls [`Dispose::dispose`] on release.
    pub fn disposable(self) -> Self
    where
        T: Dispose,
    {
        self.on_release(|value| {
            value.dispose();
            Ok(())
        })
    }

    /// Releases the instance with [`safe_release`]: faulted resources are
    /// aborted, close timeouts and communication faults are swallowed, and
    /// only unrecognized close failures reach the scope's disposal result.
    pub fn use_safe_release(self) -> Self
    where
        T: CommunicationObject,
    {
        self.on_release(|value| safe_release(value).map_err(DispatchError::from))
    }

    /// Lifetime of the registration being configured.
    pub fn lifetime(&self) -> Lifetime {
        self.component.lifetime
    }
}

struct RootInner {
    components: HashMap<ContractKey, Component>,
    disposers: Mutex<DisposeBag>,
    disposed: AtomicBool,
}

/// Root of the reference container.
///
/// Cheap to clone. Singletons are created once and released when the root
/// itself is disposed; scoped components can only be resolved from a
/// [`ChildScope`].
#[derive(Clone)]
pub struct RootContainer {
    inner: Arc<RootInner>,
}

impl RootContainer {
    /// Number of registered components.
    pub fn component_count(&self) -> usize {
        self.inner.components.len()
    }

    /// Returns `true` once [`LifetimeScope::dispose`] ran on the root.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn component(&self, key: &ContractKey) -> DispatchResult<&Component> {
        self.inner
            .components
            .get(key)
            .ok_or_else(|| DispatchError::NotRegistered(key.clone()))
    }

    fn resolve_singleton(&self, component: &Component) -> DispatchResult<Instance> {
        component
            .singleton
            .get_or_try_init(|| {
                let instance = (component.factory)(self)?;
                if let Some(release) = &component.release {
                    track(&self.inner.disposers, release, &instance);
                }
                Ok(instance)
            })
            .cloned()
    }
}

fn track(bag: &Mutex<DisposeBag>, release: &ReleaseFn, instance: &Instance) {
    let release = release.clone();
    let instance = instance.clone();
    bag.lock().push(Box::new(move || release(&instance)));
}

impl Container for RootContainer {
    fn create_child_scope(&self) -> DispatchResult<Box<dyn LifetimeScope>> {
        if self.is_disposed() {
            return Err(DispatchError::ScopeDisposed);
        }
        Ok(Box::new(ChildScope::new(self.clone())))
    }

    fn is_registered(&self, key: &ContractKey) -> bool {
        self.inner.components.contains_key(key)
    }
}

impl LifetimeScope for RootContainer {
    fn resolve(&self, key: &ContractKey) -> DispatchResult<Instance> {
        if self.is_disposed() {
            return Err(DispatchError::ScopeDisposed);
        }
        let component = self.component(key)?;
        match component.lifetime {
            Lifetime::Singleton => self.resolve_singleton(component),
            Lifetime::Scoped => Err(DispatchError::WrongLifetime(
                "Cannot resolve scoped component from the root container",
            )),
            Lifetime::Transient => {
                let instance = (component.factory)(self)?;
                if let Some(release) = &component.release {
                    track(&self.inner.disposers, release, &instance);
                }
                Ok(instance)
            }
        }
    }

    fn is_registered(&self, key: &ContractKey) -> bool {
        self.inner.components.contains_key(key)
    }

    fn dispose(&self) -> DispatchResult<()> {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut bag = self.inner.disposers.lock().take();
        bag.run_all_reverse()
    }
}

impl fmt::Debug for RootContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContainer")
            .field("components", &self.inner.components.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A child scope of the reference container.
///
/// Caches scoped instances and owns the release hooks of every scoped and
/// transient instance it produced. Dropping an undisposed scope disposes it.
pub struct ChildScope {
    id: u64,
    root: RootContainer,
    scoped: Mutex<HashMap<ContractKey, Instance>>,
    disposers: Mutex<DisposeBag>,
    disposed: AtomicBool,
}

impl ChildScope {
    fn new(root: RootContainer) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            root,
            scoped: Mutex::new(HashMap::new()),
            disposers: Mutex::new(DisposeBag::default()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Process-unique scope identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of release hooks this scope currently owns.
    pub fn owned_count(&self) -> usize {
        self.disposers.lock().len()
    }

    fn resolve_scoped(&self, key: &ContractKey, component: &Component) -> DispatchResult<Instance> {
        if let Some(existing) = self.scoped.lock().get(key) {
            return Ok(existing.clone());
        }

        // The factory may resolve other scoped components, so it runs unlocked.
        let created = (component.factory)(self)?;

        let mut cache = self.scoped.lock();
        if let Some(existing) = cache.get(key) {
            let existing = existing.clone();
            drop(cache);
            if let Some(release) = &component.release {
                if let Err(err) = release(&created) {
                    tracing::warn!(contract = %key, error = %err, "failed to release duplicate scoped instance");
                }
            }
            return Ok(existing);
        }
        cache.insert(key.clone(), created.clone());
        drop(cache);

        if let Some(release) = &component.release {
            track(&self.disposers, release, &created);
        }
        Ok(created)
    }
}

impl LifetimeScope for ChildScope {
    fn resolve(&self, key: &ContractKey) -> DispatchResult<Instance> {
        if self.is_disposed() {
            return Err(DispatchError::ScopeDisposed);
        }
        let component = self.root.component(key)?;
        match component.lifetime {
            Lifetime::Singleton => self.root.resolve_singleton(component),
            Lifetime::Scoped => self.resolve_scoped(key, component),
            Lifetime::Transient => {
                let instance = (component.factory)(self)?;
                if let Some(release) = &component.release {
                    track(&self.disposers, release, &instance);
                }
                Ok(instance)
            }
        }
    }

    fn is_registered(&self, key: &ContractKey) -> bool {
        self.root.inner.components.contains_key(key)
    }

    fn dispose(&self) -> DispatchResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.scoped.lock().clear();
        let mut bag = self.disposers.lock().take();
        bag.run_all_reverse()
    }
}

impl Drop for ChildScope {
    fn drop(&mut self) {
        if !self.is_disposed() {
            if let Err(err) = LifetimeScope::dispose(self) {
                tracing::warn!(scope = self.id, error = %err, "scope dropped with failing release hooks");
            }
        }
    }
}

impl fmt::Debug for ChildScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildScope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
