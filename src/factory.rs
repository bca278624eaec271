//! Creates bound hosts from constructor strings.

use std::sync::Arc;

use crate::configuration::HostConfiguration;
use crate::descriptor::ServiceDescriptor;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostDescription, ServiceHost};
use crate::key::ContractKey;

/// Builds hosts for services named by a constructor string.
///
/// The constructor string names a registered contract. Lookup tries the
/// named key first, then any registered contract whose display name matches,
/// so type-keyed contracts can be addressed by their type name.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{
///     ComponentRegistry, HostConfiguration, Lifetime, ResolutionStrategy, ServiceHostFactory,
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
/// let factory = ServiceHostFactory::new(Arc::new(config));
/// let host = factory.create_host("Echo", &["main"]).unwrap();
/// assert!(host.endpoint("main").unwrap().dispatcher().has_instance_provider());
///
/// assert!(factory.create_host("Unknown", &["main"]).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ServiceHostFactory {
    configuration: Arc<HostConfiguration>,
}

impl ServiceHostFactory {
    pub fn new(configuration: Arc<HostConfiguration>) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &HostConfiguration {
        &self.configuration
    }

    /// Creates a host exposing the constructor's contract on each of
    /// `endpoints`, binds it, and runs the configured host actions.
    ///
    /// The returned host is still `Created`; the caller opens it.
    pub fn create_host(&self, constructor: &str, endpoints: &[&str]) -> DispatchResult<ServiceHost> {
        let descriptor = self.lookup(constructor)?;
        self.verify_component(descriptor)?;

        let mut description = HostDescription::new(constructor.trim());
        for name in endpoints {
            description = description.with_endpoint(*name, descriptor.contract().clone());
        }
        self.create_host_from(description)
    }

    /// Binds an explicitly described host.
    pub fn create_host_from(&self, description: HostDescription) -> DispatchResult<ServiceHost> {
        let host = ServiceHost::new(description);
        let outcomes = self.configuration.configure(&host)?;
        tracing::debug!(
            host = %host.description().service_name(),
            bound = outcomes.len(),
            "host created"
        );
        Ok(host)
    }

    fn lookup(&self, constructor: &str) -> DispatchResult<&ServiceDescriptor> {
        let name = constructor.trim();
        if name.is_empty() {
            return Err(DispatchError::ArgumentInvalid("constructor"));
        }
        if let Some(descriptor) = self.configuration.descriptor(&ContractKey::named(name)) {
            return Ok(descriptor);
        }
        self.configuration
            .descriptors()
            .iter()
            .find(|descriptor| descriptor.contract().display_name() == name)
            .ok_or_else(|| {
                DispatchError::configuration(format!("no service registered for constructor '{}'", name))
            })
    }

    fn verify_component(&self, descriptor: &ServiceDescriptor) -> DispatchResult<()> {
        let Some(component) = descriptor.component_key() else {
            return Ok(());
        };
        if self.configuration.container()?.is_registered(component) {
            Ok(())
        } else {
            Err(DispatchError::configuration(format!(
                "container has no component '{}' for contract '{}'",
                component,
                descriptor.contract()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ComponentRegistry;
    use crate::descriptor::ResolutionStrategy;
    use crate::lifetime::Lifetime;

    trait Greeter {}

    fn factory() -> ServiceHostFactory {
        let mut registry = ComponentRegistry::new();
        registry.register_type::<String, _>(Lifetime::Scoped, |_| Ok("hi".to_string()));
        let mut config = HostConfiguration::with_container(Arc::new(registry.build()));
        config
            .register(ContractKey::of::<dyn Greeter>(), ResolutionStrategy::Component(ContractKey::of::<String>()), false)
            .unwrap();
        config.register("Orphan", ResolutionStrategy::Contract, false).unwrap();
        ServiceHostFactory::new(Arc::new(config))
    }

    #[test]
    fn type_keyed_contract_is_found_by_display_name() {
        let factory = factory();
        let name = ContractKey::of::<dyn Greeter>().display_name().to_string();
        let host = factory.create_host(&name, &["a", "b"]).unwrap();

        assert_eq!(host.description().endpoints().len(), 2);
        assert!(host.endpoint("b").unwrap().dispatcher().has_instance_provider());
    }

    #[test]
    fn blank_constructor_is_an_argument_error() {
        let err = factory().create_host("  ", &["a"]).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentInvalid("constructor")));
    }

    #[test]
    fn missing_component_is_reported_before_the_host_exists() {
        let err = factory().create_host("Orphan", &["a"]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Orphan"));
    }
}
