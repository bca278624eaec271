//! Lifecycle observers for per-call scopes.
//!
//! Observers see the events the bridge produces while serving calls: a scope
//! created, an instance resolved or failing to resolve, a scope disposed, and
//! a teardown fault that was suppressed. They are registered on the
//! [`HostConfiguration`] and flow into every provider the binder installs.
//!
//! [`HostConfiguration`]: crate::HostConfiguration

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::call::CallId;
use crate::error::DispatchError;
use crate::key::ContractKey;

/// Observer of per-call scope lifecycle events.
///
/// # Performance
///
/// Observer calls are made synchronously on the call path. Keep
/// implementations lightweight.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{CallId, ContractKey, DispatchError, LifecycleObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct FailureCounter(AtomicUsize);
///
/// impl LifecycleObserver for FailureCounter {
///     fn scope_created(&self, _call: CallId, _contract: &ContractKey) {}
///     fn instance_resolved(&self, _call: CallId, _contract: &ContractKey) {}
///     fn resolution_failed(&self, _call: CallId, _contract: &ContractKey, _error: &DispatchError) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait LifecycleObserver: Send + Sync {
    /// A child scope was created for `call`.
    fn scope_created(&self, call: CallId, contract: &ContractKey);

    /// The call's instance was resolved and its scope published.
    fn instance_resolved(&self, call: CallId, contract: &ContractKey);

    /// Resolution failed; the scope has been disposed and nothing was published.
    fn resolution_failed(&self, call: CallId, contract: &ContractKey, error: &DispatchError);

    /// The call's scope was disposed.
    fn scope_disposed(&self, call: CallId, contract: &ContractKey) {
        let _ = (call, contract);
    }

    /// A teardown fault was logged and swallowed instead of returned.
    fn release_suppressed(&self, call: CallId, contract: &ContractKey, error: &DispatchError) {
        let _ = (call, contract, error);
    }
}

/// Registered observers.
///
/// Cheap to clone; notification with no observers is a no-op loop.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn scope_created(&self, call: CallId, contract: &ContractKey) {
        for observer in &self.observers {
            observer.scope_created(call, contract);
        }
    }

    #[inline]
    pub(crate) fn instance_resolved(&self, call: CallId, contract: &ContractKey) {
        for observer in &self.observers {
            observer.instance_resolved(call, contract);
        }
    }

    #[inline]
    pub(crate) fn resolution_failed(&self, call: CallId, contract: &ContractKey, error: &DispatchError) {
        for observer in &self.observers {
            observer.resolution_failed(call, contract, error);
        }
    }

    #[inline]
    pub(crate) fn scope_disposed(&self, call: CallId, contract: &ContractKey) {
        for observer in &self.observers {
            observer.scope_disposed(call, contract);
        }
    }

    #[inline]
    pub(crate) fn release_suppressed(&self, call: CallId, contract: &ContractKey, error: &DispatchError) {
        for observer in &self.observers {
            observer.release_suppressed(call, contract, error);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.observers.len()).finish()
    }
}

/// Built-in observer that forwards events to `tracing`.
///
/// Lifecycle transitions are emitted at `debug`, failures at `warn`.
///
/// ```rust
/// use ferrous_dispatch::{HostConfiguration, LoggingObserver};
/// use std::sync::Arc;
///
/// let mut config = HostConfiguration::new();
/// config.add_observer(Arc::new(LoggingObserver::with_target("orders-host")));
/// ```
pub struct LoggingObserver {
    target: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::with_target("ferrous-dispatch")
    }

    /// Tags every event with `target` so hosts sharing a process can be told apart.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for LoggingObserver {
    fn scope_created(&self, call: CallId, contract: &ContractKey) {
        tracing::debug!(host = %self.target, %call, %contract, "scope created");
    }

    fn instance_resolved(&self, call: CallId, contract: &ContractKey) {
        tracing::debug!(host = %self.target, %call, %contract, "instance resolved");
    }

    fn resolution_failed(&self, call: CallId, contract: &ContractKey, error: &DispatchError) {
        tracing::warn!(host = %self.target, %call, %contract, %error, "resolution failed");
    }

    fn scope_disposed(&self, call: CallId, contract: &ContractKey) {
        tracing::debug!(host = %self.target, %call, %contract, "scope disposed");
    }

    fn release_suppressed(&self, call: CallId, contract: &ContractKey, error: &DispatchError) {
        tracing::warn!(host = %self.target, %call, %contract, %error, "release fault suppressed");
    }
}

/// Point-in-time copy of [`MetricsObserver`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub scopes_created: u64,
    pub instances_resolved: u64,
    pub resolutions_failed: u64,
    pub scopes_disposed: u64,
    pub releases_suppressed: u64,
}

impl MetricsSnapshot {
    /// Scopes created but not yet disposed.
    pub fn active_scopes(&self) -> u64 {
        self.scopes_created.saturating_sub(self.scopes_disposed)
    }
}

/// Observer that counts lifecycle events.
///
/// ```rust
/// use ferrous_dispatch::{CallId, ContractKey, LifecycleObserver, MetricsObserver};
///
/// let metrics = MetricsObserver::new();
/// metrics.scope_created(CallId::next(), &ContractKey::named("Echo"));
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.scopes_created, 1);
/// assert_eq!(snapshot.active_scopes(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MetricsObserver {
    scopes_created: AtomicU64,
    instances_resolved: AtomicU64,
    resolutions_failed: AtomicU64,
    scopes_disposed: AtomicU64,
    releases_suppressed: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scopes_created: self.scopes_created.load(Ordering::Relaxed),
            instances_resolved: self.instances_resolved.load(Ordering::Relaxed),
            resolutions_failed: self.resolutions_failed.load(Ordering::Relaxed),
            scopes_disposed: self.scopes_disposed.load(Ordering::Relaxed),
            releases_suppressed: self.releases_suppressed.load(Ordering::Relaxed),
        }
    }
}

impl LifecycleObserver for MetricsObserver {
    fn scope_created(&self, _call: CallId, _contract: &ContractKey) {
        self.scopes_created.fetch_add(1, Ordering::Relaxed);
    }

    fn instance_resolved(&self, _call: CallId, _contract: &ContractKey) {
        self.instances_resolved.fetch_add(1, Ordering::Relaxed);
    }

    fn resolution_failed(&self, _call: CallId, _contract: &ContractKey, _error: &DispatchError) {
        self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn scope_disposed(&self, _call: CallId, _contract: &ContractKey) {
        self.scopes_disposed.fetch_add(1, Ordering::Relaxed);
    }

    fn release_suppressed(&self, _call: CallId, _contract: &ContractKey, _error: &DispatchError) {
        self.releases_suppressed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_reach_every_observer() {
        let a = Arc::new(MetricsObserver::new());
        let b = Arc::new(MetricsObserver::new());
        let mut observers = Observers::new();
        observers.add(a.clone());
        observers.add(b.clone());

        let call = CallId::next();
        let contract = ContractKey::named("Echo");
        observers.scope_created(call, &contract);
        observers.scope_disposed(call, &contract);
        observers.release_suppressed(call, &contract, &DispatchError::Communication("reset".into()));

        for metrics in [a, b] {
            let snapshot = metrics.snapshot();
            assert_eq!(snapshot.scopes_created, 1);
            assert_eq!(snapshot.scopes_disposed, 1);
            assert_eq!(snapshot.releases_suppressed, 1);
            assert_eq!(snapshot.active_scopes(), 0);
        }
    }

    #[test]
    fn empty_collection_has_no_observers() {
        let observers = Observers::new();
        assert!(!observers.has_observers());
        observers.scope_created(CallId::next(), &ContractKey::named("Echo"));
    }
}
