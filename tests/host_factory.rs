/// Host factory tests
///
/// These tests verify host creation from constructor strings, host
/// configuration actions, and host shutdown through the configuration.

use ferrous_dispatch::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

trait Calculator: Send + Sync {
    fn add(&self, a: i64, b: i64) -> i64;
}

struct BasicCalculator;

impl Calculator for BasicCalculator {
    fn add(&self, a: i64, b: i64) -> i64 {
        a + b
    }
}

fn configuration() -> HostConfiguration {
    let mut registry = ComponentRegistry::new();
    registry.register("BasicCalculator", Lifetime::Scoped, |_| {
        Ok(Box::new(BasicCalculator) as Box<dyn Calculator>)
    });

    let mut config = HostConfiguration::with_container(Arc::new(registry.build()));
    config
        .register(
            ContractKey::of::<dyn Calculator>(),
            ResolutionStrategy::Component(ContractKey::named("BasicCalculator")),
            false,
        )
        .unwrap();
    config
}

#[test]
fn host_is_created_bound_and_usable() {
    let factory = ServiceHostFactory::new(Arc::new(configuration()));
    let constructor = ContractKey::of::<dyn Calculator>().display_name().to_string();

    let host = factory.create_host(&constructor, &["http", "tcp"]).unwrap();
    assert_eq!(host.state(), CommunicationState::Created);
    host.open().unwrap();

    for endpoint in ["http", "tcp"] {
        let sum = host
            .endpoint(endpoint)
            .unwrap()
            .dispatcher()
            .dispatch_as::<Box<dyn Calculator>, _, _>(&host.new_call(), |calc| Ok(calc.add(2, 3)))
            .unwrap();
        assert_eq!(sum, 5);
    }
}

#[test]
fn host_actions_run_after_binding() {
    let mut config = configuration();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    config.on_host_configured(move |host| {
        let bound = host
            .description()
            .endpoints()
            .iter()
            .filter(|endpoint| endpoint.dispatcher().has_instance_provider())
            .count();
        s.lock().unwrap().push((host.description().service_name().to_string(), bound));
        Ok(())
    });
    let factory = ServiceHostFactory::new(Arc::new(config));
    let constructor = ContractKey::of::<dyn Calculator>().display_name().to_string();

    factory.create_host(&constructor, &["a", "b"]).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(constructor, 2)]);
}

#[test]
fn failing_host_action_fails_creation() {
    let mut config = configuration();
    config.on_host_configured(|_| Err(DispatchError::configuration("tls certificate missing")));
    let factory = ServiceHostFactory::new(Arc::new(config));
    let constructor = ContractKey::of::<dyn Calculator>().display_name().to_string();

    let err = factory.create_host(&constructor, &["a"]).unwrap_err();
    assert_eq!(err.to_string(), "Configuration error: tls certificate missing");
}

#[test]
fn unknown_constructor_is_a_configuration_error() {
    let factory = ServiceHostFactory::new(Arc::new(configuration()));
    let err = factory.create_host("NoSuchService", &["a"]).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn factory_without_container_fails_at_bind_time() {
    let mut config = HostConfiguration::new();
    config.register("Echo", ResolutionStrategy::factory(|_| Ok(())), false).unwrap();
    let factory = ServiceHostFactory::new(Arc::new(config));

    let err = factory.create_host("Echo", &["main"]).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn explicit_description_is_bound_per_contract() {
    let factory = ServiceHostFactory::new(Arc::new(configuration()));
    let host = factory
        .create_host_from(
            HostDescription::new("Mixed")
                .with_endpoint("calc", ContractKey::of::<dyn Calculator>())
                .with_endpoint("other", "Unregistered"),
        )
        .unwrap();

    assert!(host.endpoint("calc").unwrap().dispatcher().has_instance_provider());
    assert!(!host.endpoint("other").unwrap().dispatcher().has_instance_provider());
}

#[test]
fn release_host_uses_configured_timeout_and_runs_close_hooks() {
    let mut config = configuration();
    config.set_settings(HostSettings { close_timeout_ms: 500, eager_singletons: true });
    let config = Arc::new(config);
    let factory = ServiceHostFactory::new(config.clone());
    let constructor = ContractKey::of::<dyn Calculator>().display_name().to_string();
    let host = factory.create_host(&constructor, &["a"]).unwrap();
    host.open().unwrap();

    let closed = Arc::new(AtomicUsize::new(0));
    let c = closed.clone();
    host.on_close(move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    config.release_host(&host).unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(host.state(), CommunicationState::Closed);
}
