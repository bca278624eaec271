//! # ferrous-dispatch
//!
//! Per-call and singleton service instancing for request-dispatch hosts,
//! backed by a dependency-injection container.
//!
//! ## Features
//!
//! - **Per-call scopes**: every call gets a fresh child scope, disposed exactly once when the call ends
//! - **Ambient lookup**: the call's scope is reachable from its [`CallContext`], never from a global
//! - **Singletons**: resolved exactly once per host, released when the host closes
//! - **Endpoint binding**: providers are installed only on endpoints exposing the matching contract
//! - **Safe release**: faulted channels are aborted instead of closed, so teardown never hides the real fault
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_dispatch::{
//!     ComponentRegistry, HostConfiguration, Lifetime, ResolutionStrategy, ServiceHostFactory,
//! };
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct Echo {
//!     id: usize,
//! }
//!
//! impl Echo {
//!     fn say(&self, text: &str) -> String {
//!         format!("[{}] {}", self.id, text)
//!     }
//! }
//!
//! // Register the implementation in the container
//! let next_id = Arc::new(AtomicUsize::new(0));
//! let mut registry = ComponentRegistry::new();
//! registry.register("Echo", Lifetime::Scoped, move |_| {
//!     Ok(Echo { id: next_id.fetch_add(1, Ordering::SeqCst) })
//! });
//!
//! // Describe how the host satisfies the contract
//! let mut config = HostConfiguration::with_container(Arc::new(registry.build()));
//! config.register("Echo", ResolutionStrategy::Contract, false).unwrap();
//!
//! // Create, bind and open a host
//! let factory = ServiceHostFactory::new(Arc::new(config));
//! let host = factory.create_host("Echo", &["main"]).unwrap();
//! host.open().unwrap();
//!
//! let endpoint = host.endpoint("main").unwrap().dispatcher();
//! let first = endpoint.dispatch_as::<Echo, _, _>(&host.new_call(), |echo| Ok(echo.say("hi"))).unwrap();
//! let second = endpoint.dispatch_as::<Echo, _, _>(&host.new_call(), |echo| Ok(echo.say("hi"))).unwrap();
//!
//! // Each call was served by its own instance
//! assert_eq!(first, "[0] hi");
//! assert_eq!(second, "[1] hi");
//! ```
//!
//! ## Call Lifecycle
//!
//! 1. [`HostLifecycleBinder`] installs a [`PerCallInstanceProvider`] on matching endpoints before the host opens
//! 2. The dispatcher asks the provider for an instance; the provider creates a scope, resolves, and publishes the scope on the call
//! 3. The operation runs; code inside it can reach the scope through [`CallContext::current_scope`]
//! 4. The dispatcher hands the instance back; the provider retracts the scope and disposes it
//!
//! Resolution failures dispose the scope before the error reaches the caller, and
//! release is guaranteed even when the operation fails, panics, or the call is cancelled.

pub mod binder;
pub mod call;
pub mod configuration;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod host;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod provider;
pub mod release;
pub mod scope_registry;
pub mod traits;

// Internal modules
mod internal;

pub use binder::{BindOutcome, HostLifecycleBinder};
pub use call::{CallContext, CallId, CancellationToken, Extensions};
pub use configuration::{HostConfiguration, HostSettings};
pub use container::{
    ChildScope, ComponentBuilder, ComponentRegistry, Container, Instance, LifetimeScope, RootContainer,
};
pub use descriptor::{ResolutionStrategy, ResolveFn, ServiceDescriptor, ServiceDescriptorBuilder};
pub use error::{DispatchError, DispatchResult};
pub use factory::ServiceHostFactory;
pub use host::{EndpointDispatcher, HostDescription, ServiceEndpoint, ServiceHost};
pub use key::{contract_of, ContractKey};
pub use lifetime::{InstanceContextMode, Lifetime};
pub use observer::{LifecycleObserver, LoggingObserver, MetricsObserver, MetricsSnapshot, Observers};
pub use provider::{FixedInstanceProvider, InstanceProvider, PerCallInstanceProvider, SingletonInstanceProvider};
pub use release::{
    safe_release, safe_release_with_timeout, CloseError, CommunicationObject, CommunicationState, SafeRelease,
    DEFAULT_CLOSE_TIMEOUT,
};
pub use scope_registry::{CallScope, ScopeRegistry};
pub use traits::{Dispose, ScopeResolveExt};

#[cfg(feature = "async")]
pub use release::{safe_release_async, AsyncCommunicationObject};
