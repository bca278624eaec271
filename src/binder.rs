//! Wires instance providers into a host before it opens.

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::descriptor::{ResolutionStrategy, ServiceDescriptor};
use crate::error::{DispatchError, DispatchResult};
use crate::host::ServiceHost;
use crate::key::ContractKey;
use crate::lifetime::InstanceContextMode;
use crate::observer::Observers;
use crate::provider::{InstanceProvider, PerCallInstanceProvider, SingletonInstanceProvider};

/// What [`HostLifecycleBinder::apply`] did to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The host instances its service itself; nothing was installed.
    DeferredToRuntime,
    /// A per-call provider was installed on the named endpoints.
    PerCall { endpoints: Vec<String> },
    /// A singleton provider was installed on the named endpoints.
    Singleton { endpoints: Vec<String> },
}

impl BindOutcome {
    /// Names of the endpoints that received a provider.
    pub fn installed_endpoints(&self) -> &[String] {
        match self {
            BindOutcome::DeferredToRuntime => &[],
            BindOutcome::PerCall { endpoints } | BindOutcome::Singleton { endpoints } => endpoints,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, BindOutcome::DeferredToRuntime)
    }
}

/// Installs a descriptor's provider on every matching endpoint of a host.
///
/// Matching is by contract identity. A host with no matching endpoint gets
/// nothing installed, and a host that already instances its service as a
/// runtime-owned singleton is left alone.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{
///     BindOutcome, ComponentRegistry, HostDescription, HostLifecycleBinder, Lifetime,
///     ResolutionStrategy, ServiceHost,
/// };
/// use std::sync::Arc;
///
/// struct Calculator;
///
/// let mut registry = ComponentRegistry::new();
/// registry.register("ICalculator", Lifetime::Scoped, |_| Ok(Calculator));
/// let container = Arc::new(registry.build());
///
/// let host = ServiceHost::new(
///     HostDescription::new("Calculator")
///         .with_endpoint("calc", "ICalculator")
///         .with_endpoint("admin", "IAdmin"),
/// );
///
/// let binder = HostLifecycleBinder::for_contract(
///     "ICalculator",
///     container,
///     ResolutionStrategy::Contract,
///     false,
/// ).unwrap();
///
/// let outcome = binder.apply(&host).unwrap();
/// assert_eq!(outcome, BindOutcome::PerCall { endpoints: vec!["calc".to_string()] });
/// assert!(host.endpoint("calc").unwrap().dispatcher().has_instance_provider());
/// assert!(!host.endpoint("admin").unwrap().dispatcher().has_instance_provider());
/// ```
pub struct HostLifecycleBinder {
    container: Arc<dyn Container>,
    descriptor: ServiceDescriptor,
    observers: Observers,
    eager_singletons: bool,
}

impl HostLifecycleBinder {
    pub fn new(container: Arc<dyn Container>, descriptor: ServiceDescriptor) -> Self {
        Self {
            container,
            descriptor,
            observers: Observers::new(),
            eager_singletons: true,
        }
    }

    /// Builds the descriptor from its parts, then the binder.
    pub fn for_contract(
        contract: impl Into<ContractKey>,
        container: Arc<dyn Container>,
        strategy: ResolutionStrategy,
        singleton: bool,
    ) -> DispatchResult<Self> {
        let descriptor = ServiceDescriptor::new(contract.into(), strategy, singleton)?;
        Ok(Self::new(container, descriptor))
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Resolve singleton descriptors while binding instead of on the first
    /// call. On by default.
    pub fn with_eager_singletons(mut self, eager: bool) -> Self {
        self.eager_singletons = eager;
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Installs the provider on `host`.
    ///
    /// Fails with a configuration error once the host has left the `Created`
    /// state. The install itself holds the host in `Created`, so a concurrent
    /// `open` waits for it instead of opening a half-bound host. With eager
    /// singletons, a singleton that cannot be resolved fails the bind.
    pub fn apply(&self, host: &ServiceHost) -> DispatchResult<BindOutcome> {
        let service = host.description().service_name();
        if !host.is_configurable() {
            return Err(DispatchError::configuration(format!(
                "host '{}' can no longer be configured",
                service
            )));
        }

        if host.instance_mode() == InstanceContextMode::Single {
            tracing::debug!(host = %service, contract = %self.descriptor.contract(), "host owns its instance, skipping");
            return Ok(BindOutcome::DeferredToRuntime);
        }

        let contract = self.descriptor.contract();
        let endpoints: Vec<_> = host.description().endpoints_for(contract).collect();
        let names: Vec<String> = endpoints.iter().map(|endpoint| endpoint.name().to_string()).collect();
        if endpoints.is_empty() {
            tracing::debug!(host = %service, %contract, "no endpoint exposes contract");
        }

        if !self.descriptor.is_singleton() {
            let provider: Arc<dyn InstanceProvider> = Arc::new(
                PerCallInstanceProvider::new(self.container.clone(), self.descriptor.clone())
                    .with_observers(self.observers.clone()),
            );
            host.while_configurable(|| {
                for endpoint in &endpoints {
                    endpoint.dispatcher().set_instance_provider(provider.clone());
                }
                Ok(())
            })?;
            tracing::debug!(host = %service, %contract, endpoints = names.len(), "per-call provider installed");
            return Ok(BindOutcome::PerCall { endpoints: names });
        }

        if endpoints.is_empty() {
            return Ok(BindOutcome::Singleton { endpoints: names });
        }
        let singleton = Arc::new(SingletonInstanceProvider::new(
            self.container.clone(),
            self.descriptor.clone(),
        ));
        // Activation runs container factories and must not hold the host's lock.
        if self.eager_singletons {
            singleton.activate()?;
        }
        let installed = host.while_configurable(|| {
            let shutdown = singleton.clone();
            host.on_close(move || shutdown.shutdown());
            let provider: Arc<dyn InstanceProvider> = singleton.clone();
            for endpoint in &endpoints {
                endpoint.dispatcher().set_instance_provider(provider.clone());
            }
            Ok(())
        });
        if let Err(err) = installed {
            if let Err(shutdown_err) = singleton.shutdown() {
                tracing::warn!(host = %service, error = %shutdown_err, "failed to release singleton of unbound host");
            }
            return Err(err);
        }
        tracing::debug!(host = %service, %contract, endpoints = names.len(), "singleton provider installed");

        Ok(BindOutcome::Singleton { endpoints: names })
    }
}

impl fmt::Debug for HostLifecycleBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLifecycleBinder")
            .field("descriptor", &self.descriptor)
            .field("eager_singletons", &self.eager_singletons)
            .finish()
    }
}
