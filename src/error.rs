//! Error types for instance provisioning and release.

use std::fmt;
use std::time::Duration;

use crate::call::CallId;
use crate::key::ContractKey;

/// Dispatch bridge errors
///
/// The variants fall into three groups:
///
/// - **Configuration**: `ArgumentInvalid`, `Configuration`. Raised synchronously
///   at registration or bind time and never ignored.
/// - **Resolution**: `NotRegistered`, `TypeMismatch`, `WrongLifetime`,
///   `Resolution`, `ScopeDisposed`. Surfaced on the call path; the call fails
///   with this error.
/// - **Call and release**: `ScopeAlreadyAttached`, `Cancelled`, `Operation`,
///   `Communication`, `Timeout`, `Release`.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{DispatchError, ContractKey};
/// use std::time::Duration;
///
/// let missing = DispatchError::NotRegistered(ContractKey::named("Echo"));
/// assert_eq!(missing.to_string(), "No component registered for contract: Echo");
///
/// // Timeouts and communication faults are expected during teardown
/// assert!(DispatchError::Timeout(Duration::from_secs(1)).is_release_fault());
/// assert!(!missing.is_release_fault());
/// ```
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// A required argument was missing or malformed
    ArgumentInvalid(&'static str),
    /// Host or descriptor configuration is invalid
    Configuration(String),
    /// The container has no component for the contract
    NotRegistered(ContractKey),
    /// A resolved instance was not of the requested type
    TypeMismatch(&'static str),
    /// A component was resolved from a scope that cannot own it
    WrongLifetime(&'static str),
    /// The container failed while producing an instance
    Resolution { contract: ContractKey, reason: String },
    /// A scope is already attached to the call
    ScopeAlreadyAttached(CallId),
    /// The scope has been disposed
    ScopeDisposed,
    /// The call was cancelled before its operation ran
    Cancelled(CallId),
    /// The service operation itself failed
    Operation(String),
    /// A communication-layer fault while closing a resource
    Communication(String),
    /// A close or shutdown exceeded its timeout
    Timeout(Duration),
    /// An unrecognized failure while releasing a resource
    Release(String),
}

impl DispatchError {
    /// Builds a `Resolution` error for `contract`.
    pub fn resolution(contract: ContractKey, reason: impl Into<String>) -> Self {
        DispatchError::Resolution { contract, reason: reason.into() }
    }

    /// Builds a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        DispatchError::Configuration(message.into())
    }

    /// Teardown faults that are logged and suppressed rather than re-thrown.
    pub fn is_release_fault(&self) -> bool {
        matches!(self, DispatchError::Communication(_) | DispatchError::Timeout(_))
    }

    /// Errors raised at configuration time.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DispatchError::ArgumentInvalid(_) | DispatchError::Configuration(_))
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ArgumentInvalid(name) => write!(f, "Invalid argument: {}", name),
            DispatchError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            DispatchError::NotRegistered(key) => {
                write!(f, "No component registered for contract: {}", key)
            }
            DispatchError::TypeMismatch(name) => write!(f, "Type mismatch for: {}", name),
            DispatchError::WrongLifetime(msg) => write!(f, "Lifetime error: {}", msg),
            DispatchError::Resolution { contract, reason } => {
                write!(f, "Failed to resolve {}: {}", contract, reason)
            }
            DispatchError::ScopeAlreadyAttached(call) => {
                write!(f, "A scope is already attached to {}", call)
            }
            DispatchError::ScopeDisposed => write!(f, "Scope has been disposed"),
            DispatchError::Cancelled(call) => write!(f, "{} was cancelled", call),
            DispatchError::Operation(msg) => write!(f, "Operation failed: {}", msg),
            DispatchError::Communication(msg) => write!(f, "Communication error: {}", msg),
            DispatchError::Timeout(timeout) => write!(f, "Timed out after {:?}", timeout),
            DispatchError::Release(msg) => write!(f, "Release failed: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Result type for dispatch operations
///
/// ```rust
/// use ferrous_dispatch::{DispatchResult, DispatchError};
///
/// fn bind() -> DispatchResult<()> {
///     Err(DispatchError::configuration("no container"))
/// }
///
/// assert!(bind().unwrap_err().is_configuration());
/// ```
pub type DispatchResult<T> = Result<T, DispatchError>;
