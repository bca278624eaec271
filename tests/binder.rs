/// Host binding tests
///
/// These tests verify that providers land only on endpoints exposing the
/// descriptor's contract, that runtime-owned singletons are left alone, and
/// that configuration errors surface before a host opens.

use ferrous_dispatch::*;
use std::sync::Arc;

struct ServiceX;
struct ServiceY;

fn container() -> Arc<RootContainer> {
    let mut registry = ComponentRegistry::new();
    registry.register("ContractX", Lifetime::Scoped, |_| Ok(ServiceX));
    registry.register("ContractY", Lifetime::Scoped, |_| Ok(ServiceY));
    Arc::new(registry.build())
}

fn two_endpoint_host() -> ServiceHost {
    ServiceHost::new(
        HostDescription::new("Mixed")
            .with_endpoint("A", "ContractX")
            .with_endpoint("B", "ContractY"),
    )
}

#[test]
fn only_matching_endpoint_receives_the_provider() {
    let host = two_endpoint_host();
    let binder =
        HostLifecycleBinder::for_contract("ContractX", container(), ResolutionStrategy::Contract, false).unwrap();

    let outcome = binder.apply(&host).unwrap();

    assert_eq!(outcome, BindOutcome::PerCall { endpoints: vec!["A".to_string()] });
    assert!(host.endpoint("A").unwrap().dispatcher().has_instance_provider());
    assert!(!host.endpoint("B").unwrap().dispatcher().has_instance_provider());

    host.open().unwrap();
    host.endpoint("A")
        .unwrap()
        .dispatcher()
        .dispatch_as::<ServiceX, _, _>(&host.new_call(), |_| Ok(()))
        .unwrap();
    let err = host.dispatch("B", &host.new_call(), |_| Ok(())).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn every_endpoint_sharing_the_contract_is_bound() {
    let host = ServiceHost::new(
        HostDescription::new("Fanout")
            .with_endpoint("http", "ContractX")
            .with_endpoint("tcp", "ContractX")
            .with_endpoint("admin", "ContractY"),
    );
    let binder =
        HostLifecycleBinder::for_contract("ContractX", container(), ResolutionStrategy::Contract, false).unwrap();

    let outcome = binder.apply(&host).unwrap();

    assert_eq!(outcome.installed_endpoints(), ["http".to_string(), "tcp".to_string()]);
}

#[test]
fn runtime_owned_singleton_host_is_skipped() {
    let host = ServiceHost::single(
        HostDescription::new("Owned").with_endpoint("A", "ContractX"),
        Arc::new(String::from("runtime instance")),
    );
    let binder =
        HostLifecycleBinder::for_contract("ContractX", container(), ResolutionStrategy::Contract, false).unwrap();

    let outcome = binder.apply(&host).unwrap();
    assert!(outcome.is_deferred());

    host.open().unwrap();
    let served = host
        .endpoint("A")
        .unwrap()
        .dispatcher()
        .dispatch_as::<String, _, _>(&host.new_call(), |s| Ok(s.clone()))
        .unwrap();
    assert_eq!(served, "runtime instance");
}

#[test]
fn binding_an_open_host_is_a_configuration_error() {
    let host = two_endpoint_host();
    host.open().unwrap();
    let binder =
        HostLifecycleBinder::for_contract("ContractX", container(), ResolutionStrategy::Contract, false).unwrap();

    let err = binder.apply(&host).unwrap_err();
    assert!(err.is_configuration());
    assert!(!host.endpoint("A").unwrap().dispatcher().has_instance_provider());
}

#[test]
fn unset_contract_is_rejected_before_binding() {
    let err = HostLifecycleBinder::for_contract("", container(), ResolutionStrategy::Contract, false).unwrap_err();
    assert!(matches!(err, DispatchError::ArgumentInvalid("contract")));
}

#[test]
fn configuration_observers_flow_into_installed_providers() {
    let metrics = Arc::new(MetricsObserver::new());
    let mut config = HostConfiguration::with_container(container());
    config.add_observer(metrics.clone());
    config.add_observer(Arc::new(LoggingObserver::new()));
    config.register("ContractX", ResolutionStrategy::Contract, false).unwrap();
    config.register("ContractY", ResolutionStrategy::Contract, false).unwrap();

    let host = two_endpoint_host();
    let outcomes = config.bind(&host).unwrap();
    assert_eq!(outcomes.len(), 2);
    host.open().unwrap();

    host.dispatch("A", &host.new_call(), |_| Ok(())).unwrap();
    host.dispatch("B", &host.new_call(), |_| Ok(())).unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.scopes_created, 2);
    assert_eq!(snapshot.instances_resolved, 2);
    assert_eq!(snapshot.scopes_disposed, 2);
}
