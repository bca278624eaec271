//! Service descriptors: how one contract is satisfied.

use std::fmt;
use std::sync::Arc;

use crate::container::{Instance, LifetimeScope};
use crate::error::{DispatchError, DispatchResult};
use crate::key::ContractKey;

/// Resolution closure run against a scope.
pub type ResolveFn = Arc<dyn Fn(&dyn LifetimeScope) -> DispatchResult<Instance> + Send + Sync>;

/// How a descriptor produces its instance from a scope.
#[derive(Clone)]
pub enum ResolutionStrategy {
    /// Resolve the descriptor's own contract key from the container
    Contract,
    /// Resolve a different component key, e.g. a concrete implementation
    Component(ContractKey),
    /// Run a closure against the scope
    Factory(ResolveFn),
}

impl ResolutionStrategy {
    /// Typed closure strategy.
    ///
    /// ```rust
    /// use ferrous_dispatch::{ResolutionStrategy, ScopeResolveExt};
    ///
    /// struct Greeter { greeting: String }
    ///
    /// let strategy = ResolutionStrategy::factory(|scope| {
    ///     let greeting = scope.resolve_type::<String>()?;
    ///     Ok(Greeter { greeting: (*greeting).clone() })
    /// });
    /// # let _ = strategy;
    /// ```
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn LifetimeScope) -> DispatchResult<T> + Send + Sync + 'static,
    {
        ResolutionStrategy::Factory(Arc::new(move |scope: &dyn LifetimeScope| {
            factory(scope).map(|value| Arc::new(value) as Instance)
        }))
    }
}

impl fmt::Debug for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStrategy::Contract => f.write_str("Contract"),
            ResolutionStrategy::Component(key) => f.debug_tuple("Component").field(key).finish(),
            ResolutionStrategy::Factory(_) => f.write_str("Factory(<closure>)"),
        }
    }
}

/// Static description of how to satisfy one contract.
///
/// Immutable once built and cheap to clone; every call against the contract
/// shares the same descriptor.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{ContractKey, DispatchError, ResolutionStrategy, ServiceDescriptor};
///
/// let descriptor = ServiceDescriptor::new(
///     ContractKey::named("Echo"),
///     ResolutionStrategy::Contract,
///     false,
/// ).unwrap();
/// assert!(!descriptor.is_singleton());
///
/// let unset = ServiceDescriptor::new(ContractKey::named(""), ResolutionStrategy::Contract, false);
/// assert!(matches!(unset, Err(DispatchError::ArgumentInvalid("contract"))));
/// ```
#[derive(Clone)]
pub struct ServiceDescriptor {
    contract: ContractKey,
    strategy: ResolutionStrategy,
    singleton: bool,
}

impl ServiceDescriptor {
    /// Fails with [`DispatchError::ArgumentInvalid`] if `contract` is unset.
    pub fn new(contract: ContractKey, strategy: ResolutionStrategy, singleton: bool) -> DispatchResult<Self> {
        if contract.is_unset() {
            return Err(DispatchError::ArgumentInvalid("contract"));
        }
        if let ResolutionStrategy::Component(component) = &strategy {
            if component.is_unset() {
                return Err(DispatchError::ArgumentInvalid("component"));
            }
        }
        Ok(Self { contract, strategy, singleton })
    }

    pub fn builder() -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder::default()
    }

    pub fn contract(&self) -> &ContractKey {
        &self.contract
    }

    pub fn strategy(&self) -> &ResolutionStrategy {
        &self.strategy
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Container key the descriptor resolves, or `None` for closure strategies.
    pub fn component_key(&self) -> Option<&ContractKey> {
        match &self.strategy {
            ResolutionStrategy::Contract => Some(&self.contract),
            ResolutionStrategy::Component(key) => Some(key),
            ResolutionStrategy::Factory(_) => None,
        }
    }

    /// Produces the instance from `scope`. Container errors pass through unchanged.
    pub fn resolve(&self, scope: &dyn LifetimeScope) -> DispatchResult<Instance> {
        match &self.strategy {
            ResolutionStrategy::Contract => scope.resolve(&self.contract),
            ResolutionStrategy::Component(key) => scope.resolve(key),
            ResolutionStrategy::Factory(factory) => factory(scope),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("contract", &self.contract)
            .field("strategy", &self.strategy)
            .field("singleton", &self.singleton)
            .finish()
    }
}

/// Builder for [`ServiceDescriptor`].
///
/// ```rust
/// use ferrous_dispatch::{ContractKey, ServiceDescriptor};
///
/// let descriptor = ServiceDescriptor::builder()
///     .contract("Calculator")
///     .resolve_component(ContractKey::named("BasicCalculator"))
///     .singleton(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(descriptor.component_key(), Some(&ContractKey::named("BasicCalculator")));
/// ```
#[derive(Default)]
pub struct ServiceDescriptorBuilder {
    contract: Option<ContractKey>,
    strategy: Option<ResolutionStrategy>,
    singleton: bool,
}

impl ServiceDescriptorBuilder {
    pub fn contract(mut self, contract: impl Into<ContractKey>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Resolve the contract key itself from the container.
    pub fn resolve_contract(self) -> Self {
        self.strategy(ResolutionStrategy::Contract)
    }

    pub fn resolve_component(self, component: impl Into<ContractKey>) -> Self {
        self.strategy(ResolutionStrategy::Component(component.into()))
    }

    pub fn resolve_with<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn LifetimeScope) -> DispatchResult<T> + Send + Sync + 'static,
    {
        self.strategy(ResolutionStrategy::factory(factory))
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Fails with [`DispatchError::ArgumentInvalid`] when the contract or the
    /// resolution strategy is missing.
    pub fn build(self) -> DispatchResult<ServiceDescriptor> {
        let contract = self.contract.ok_or(DispatchError::ArgumentInvalid("contract"))?;
        let strategy = self.strategy.ok_or(DispatchError::ArgumentInvalid("resolve"))?;
        ServiceDescriptor::new(contract, strategy, self.singleton)
    }
}
