//! Host configuration: the active container, descriptors, and settings.
//!
//! A [`HostConfiguration`] is built once, before any host opens, and shared
//! read-only afterwards (typically behind an `Arc` held by a
//! [`ServiceHostFactory`](crate::ServiceHostFactory)). It replaces any notion
//! of a process-wide "current container": everything a binder needs is
//! passed in explicitly.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::binder::{BindOutcome, HostLifecycleBinder};
use crate::container::Container;
use crate::descriptor::{ResolutionStrategy, ServiceDescriptor};
use crate::error::{DispatchError, DispatchResult};
use crate::host::ServiceHost;
use crate::key::ContractKey;
use crate::observer::{LifecycleObserver, Observers};
use crate::release::{safe_release_with_timeout, CloseError, DEFAULT_CLOSE_TIMEOUT};

type HostAction = Arc<dyn Fn(&ServiceHost) -> DispatchResult<()> + Send + Sync>;

/// Tunables for hosts bound through a [`HostConfiguration`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct HostSettings {
    /// Budget for gracefully closing a host, in milliseconds
    pub close_timeout_ms: u64,
    /// Resolve singleton descriptors at bind time rather than on first call
    pub eager_singletons: bool,
}

impl HostSettings {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Reads `<PREFIX>_CLOSE_TIMEOUT_MS` and `<PREFIX>_EAGER_SINGLETONS`,
    /// falling back to defaults for unset variables.
    ///
    /// A variable that is set but unparsable is a configuration error.
    pub fn from_env(prefix: &str) -> DispatchResult<Self> {
        let mut settings = Self::default();
        let prefix = prefix.to_uppercase();

        let key = format!("{}_CLOSE_TIMEOUT_MS", prefix);
        if let Ok(value) = env::var(&key) {
            settings.close_timeout_ms = value.trim().parse().map_err(|_| {
                DispatchError::configuration(format!("{} must be a number of milliseconds, got '{}'", key, value))
            })?;
        }

        let key = format!("{}_EAGER_SINGLETONS", prefix);
        if let Ok(value) = env::var(&key) {
            settings.eager_singletons = parse_bool(&value).ok_or_else(|| {
                DispatchError::configuration(format!("{} must be a boolean, got '{}'", key, value))
            })?;
        }

        Ok(settings)
    }

    /// Parses settings from JSON. Missing fields take their defaults.
    ///
    /// ```rust
    /// use ferrous_dispatch::HostSettings;
    ///
    /// let settings = HostSettings::from_json(r#"{ "close_timeout_ms": 250 }"#).unwrap();
    /// assert_eq!(settings.close_timeout_ms, 250);
    /// assert!(settings.eager_singletons);
    /// ```
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> DispatchResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| DispatchError::configuration(format!("invalid host settings: {}", err)))
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT.as_millis() as u64,
            eager_singletons: true,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Everything a host needs to be bound: container, descriptors, observers.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{
///     ComponentRegistry, HostConfiguration, HostDescription, Lifetime,
///     ResolutionStrategy, ServiceHost,
/// };
/// use std::sync::Arc;
///
/// struct Echo;
///
/// let mut registry = ComponentRegistry::new();
/// registry.register("Echo", Lifetime::Scoped, |_| Ok(Echo));
///
/// let mut config = HostConfiguration::with_container(Arc::new(registry.build()));
/// config.register("Echo", ResolutionStrategy::Contract, false).unwrap();
///
/// // Duplicate registrations are rejected
/// assert!(config.register("Echo", ResolutionStrategy::Contract, true).is_err());
///
/// let host = ServiceHost::new(HostDescription::new("Echo").with_endpoint("main", "Echo"));
/// let outcomes = config.bind(&host).unwrap();
/// assert_eq!(outcomes.len(), 1);
/// ```
#[derive(Default)]
pub struct HostConfiguration {
    container: Option<Arc<dyn Container>>,
    descriptors: Vec<ServiceDescriptor>,
    observers: Observers,
    settings: HostSettings,
    host_actions: Vec<HostAction>,
}

impl HostConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(container: Arc<dyn Container>) -> Self {
        Self {
            container: Some(container),
            ..Self::default()
        }
    }

    /// Designates the container hosts resolve from. May be set once.
    pub fn set_container(&mut self, container: Arc<dyn Container>) -> DispatchResult<()> {
        if self.container.is_some() {
            return Err(DispatchError::configuration("container is already set"));
        }
        self.container = Some(container);
        Ok(())
    }

    /// The active container, or a configuration error if none was set.
    pub fn container(&self) -> DispatchResult<Arc<dyn Container>> {
        self.container
            .clone()
            .ok_or_else(|| DispatchError::configuration("no container has been set"))
    }

    /// Registers how `contract` is satisfied.
    pub fn register(
        &mut self,
        contract: impl Into<ContractKey>,
        strategy: ResolutionStrategy,
        singleton: bool,
    ) -> DispatchResult<&ServiceDescriptor> {
        let descriptor = ServiceDescriptor::new(contract.into(), strategy, singleton)?;
        self.add_descriptor(descriptor)
    }

    pub fn add_descriptor(&mut self, descriptor: ServiceDescriptor) -> DispatchResult<&ServiceDescriptor> {
        if self.descriptor(descriptor.contract()).is_some() {
            return Err(DispatchError::configuration(format!(
                "contract '{}' is already registered",
                descriptor.contract()
            )));
        }
        self.descriptors.push(descriptor);
        Ok(&self.descriptors[self.descriptors.len() - 1])
    }

    pub fn descriptor(&self, contract: &ContractKey) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.contract() == contract)
    }

    /// Registered descriptors, in registration order.
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    pub fn add_observer(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.add(observer);
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: HostSettings) {
        self.settings = settings;
    }

    /// Runs `action` on every host after it has been bound and before it opens.
    pub fn on_host_configured<F>(&mut self, action: F)
    where
        F: Fn(&ServiceHost) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.host_actions.push(Arc::new(action));
    }

    /// A binder for `descriptor` carrying this configuration's observers and settings.
    pub fn binder_for(&self, descriptor: &ServiceDescriptor) -> DispatchResult<HostLifecycleBinder> {
        Ok(HostLifecycleBinder::new(self.container()?, descriptor.clone())
            .with_observers(self.observers.clone())
            .with_eager_singletons(self.settings.eager_singletons))
    }

    /// Binds every registered descriptor whose contract `host` exposes.
    pub fn bind(&self, host: &ServiceHost) -> DispatchResult<Vec<(ContractKey, BindOutcome)>> {
        let container = self.container()?;
        let mut outcomes = Vec::new();
        for descriptor in &self.descriptors {
            let exposed = host.description().endpoints_for(descriptor.contract()).next().is_some();
            if !exposed {
                continue;
            }
            let binder = HostLifecycleBinder::new(container.clone(), descriptor.clone())
                .with_observers(self.observers.clone())
                .with_eager_singletons(self.settings.eager_singletons);
            outcomes.push((descriptor.contract().clone(), binder.apply(host)?));
        }
        Ok(outcomes)
    }

    /// [`bind`](Self::bind), then the `on_host_configured` actions.
    pub fn configure(&self, host: &ServiceHost) -> DispatchResult<Vec<(ContractKey, BindOutcome)>> {
        let outcomes = self.bind(host)?;
        for action in &self.host_actions {
            action(host)?;
        }
        Ok(outcomes)
    }

    /// Safe-releases `host` within the configured close timeout.
    pub fn release_host(&self, host: &ServiceHost) -> Result<(), CloseError> {
        safe_release_with_timeout(host, self.settings.close_timeout())
    }
}

impl fmt::Debug for HostConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfiguration")
            .field("has_container", &self.container.is_some())
            .field("descriptors", &self.descriptors)
            .field("observers", &self.observers)
            .field("settings", &self.settings)
            .field("host_actions", &self.host_actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ComponentRegistry;
    use crate::host::HostDescription;

    #[test]
    fn container_can_only_be_set_once() {
        let mut config = HostConfiguration::new();
        assert!(config.container().err().unwrap().is_configuration());

        config.set_container(Arc::new(ComponentRegistry::new().build())).unwrap();
        let err = config.set_container(Arc::new(ComponentRegistry::new().build())).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn bind_without_container_fails() {
        let mut config = HostConfiguration::new();
        config.register("Echo", ResolutionStrategy::Contract, false).unwrap();
        let host = ServiceHost::new(HostDescription::new("Echo").with_endpoint("main", "Echo"));

        assert!(config.bind(&host).unwrap_err().is_configuration());
    }

    #[test]
    fn bind_skips_contracts_the_host_does_not_expose() {
        let mut config = HostConfiguration::with_container(Arc::new(ComponentRegistry::new().build()));
        config.register("Echo", ResolutionStrategy::Contract, false).unwrap();
        config.register("Admin", ResolutionStrategy::Contract, false).unwrap();
        let host = ServiceHost::new(HostDescription::new("Echo").with_endpoint("main", "Echo"));

        let outcomes = config.bind(&host).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, ContractKey::named("Echo"));
    }

    #[test]
    fn unset_contract_is_rejected_at_registration() {
        let mut config = HostConfiguration::new();
        let err = config.register("", ResolutionStrategy::Contract, false).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentInvalid("contract")));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
