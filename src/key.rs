//! Contract identity for dispatch endpoints and container components.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Identity of a service contract.
///
/// A contract key ties together three things that must agree for a call to be
/// served: the endpoint that exposes the contract, the [`ServiceDescriptor`]
/// describing how to satisfy it, and the container component that produces
/// the implementation.
///
/// Keys come in two flavours:
///
/// - **Type**: derived from a Rust type or trait object (`ContractKey::of::<dyn Echo>()`).
/// - **Named**: an arbitrary string, used for constructor strings and for
///   hosts whose contracts are described by name only.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::ContractKey;
///
/// trait Echo: Send + Sync {}
///
/// let by_type = ContractKey::of::<dyn Echo>();
/// let by_name = ContractKey::named("EchoService");
///
/// assert_eq!(by_type, ContractKey::of::<dyn Echo>());
/// assert_ne!(by_type, by_name);
/// assert_eq!(by_name.display_name(), "EchoService");
/// ```
///
/// [`ServiceDescriptor`]: crate::ServiceDescriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractKey {
    /// Contract identified by a type or trait object, with its name for diagnostics
    Type(TypeId, &'static str),
    /// Contract identified by name
    Named(Arc<str>),
}

impl ContractKey {
    /// Key for the type or trait object `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        ContractKey::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Key for a named contract.
    ///
    /// The name is not validated here; an empty name produces an *unset* key
    /// that descriptors and registrations reject.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        ContractKey::Named(name.into())
    }

    /// Human-readable name of the contract.
    pub fn display_name(&self) -> &str {
        match self {
            ContractKey::Type(_, name) => name,
            ContractKey::Named(name) => name,
        }
    }

    /// Returns `true` for a named key whose name is empty or whitespace.
    ///
    /// ```rust
    /// use ferrous_dispatch::ContractKey;
    ///
    /// assert!(ContractKey::named("").is_unset());
    /// assert!(ContractKey::named("   ").is_unset());
    /// assert!(!ContractKey::named("Echo").is_unset());
    /// assert!(!ContractKey::of::<String>().is_unset());
    /// ```
    pub fn is_unset(&self) -> bool {
        match self {
            ContractKey::Type(..) => false,
            ContractKey::Named(name) => name.trim().is_empty(),
        }
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<&str> for ContractKey {
    fn from(name: &str) -> Self {
        ContractKey::named(name)
    }
}

impl From<String> for ContractKey {
    fn from(name: String) -> Self {
        ContractKey::named(name)
    }
}

/// Shorthand for [`ContractKey::of`].
pub fn contract_of<T: ?Sized + 'static>() -> ContractKey {
    ContractKey::of::<T>()
}
