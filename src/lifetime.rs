//! Lifetime definitions for container components and hosted services.

/// Component lifetimes in the reference container
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{ComponentRegistry, Container, ContractKey, Lifetime, ScopeResolveExt};
/// use std::sync::Arc;
///
/// struct Connection(u32);
///
/// let mut registry = ComponentRegistry::new();
/// registry.register(ContractKey::named("conn"), Lifetime::Scoped, |_| Ok(Connection(7)));
/// let container = registry.build();
///
/// let scope = container.create_child_scope().unwrap();
/// let a = scope.resolve_as::<Connection>(&ContractKey::named("conn")).unwrap();
/// let b = scope.resolve_as::<Connection>(&ContractKey::named("conn")).unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // Same scope, same instance
/// assert_eq!(a.0, 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Single instance per root container, released when the root is disposed
    Singleton,
    /// Single instance per scope, released with the scope
    Scoped,
    /// New instance per resolution, released with the scope that resolved it
    Transient,
}

/// How the dispatch runtime itself instances a hosted service.
///
/// A host configured as `Single` serves every call from one instance the
/// runtime already owns; the binder leaves such hosts alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceContextMode {
    /// One instance per call, obtained from the endpoint's instance provider
    #[default]
    PerCall,
    /// One instance for the host's lifetime, owned by the runtime
    Single,
}
