//! Model of the dispatch runtime the bridge plugs into.
//!
//! A [`ServiceHost`] exposes a set of [`ServiceEndpoint`]s, each bound to one
//! contract and owning an [`EndpointDispatcher`] with an installable
//! [`InstanceProvider`] slot. The dispatcher drives a call through
//! get-instance, operation, and release-instance, guaranteeing the release
//! half on every exit path.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::call::{CallContext, CancellationToken};
use crate::container::Instance;
use crate::error::{DispatchError, DispatchResult};
use crate::internal::DisposeBag;
use crate::key::ContractKey;
use crate::lifetime::InstanceContextMode;
use crate::provider::{FixedInstanceProvider, InstanceProvider};
use crate::release::{CloseError, CommunicationObject, CommunicationState};

/// Per-endpoint call driver.
#[derive(Default)]
pub struct EndpointDispatcher {
    provider: RwLock<Option<Arc<dyn InstanceProvider>>>,
}

impl EndpointDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `provider`, replacing any previous one.
    pub fn set_instance_provider(&self, provider: Arc<dyn InstanceProvider>) {
        *self.provider.write() = Some(provider);
    }

    pub fn instance_provider(&self) -> Option<Arc<dyn InstanceProvider>> {
        self.provider.read().clone()
    }

    pub fn has_instance_provider(&self) -> bool {
        self.provider.read().is_some()
    }

    /// Serves one call.
    ///
    /// Obtains the instance, checks the call is still active, runs
    /// `operation`, and releases the instance. Release also happens when the
    /// call was cancelled or `operation` panics. A release error never
    /// changes the call's outcome: it is logged and the operation's result
    /// is returned as is.
    pub fn dispatch<R, F>(&self, call: &CallContext, operation: F) -> DispatchResult<R>
    where
        F: FnOnce(&Instance) -> DispatchResult<R>,
    {
        let provider = self
            .instance_provider()
            .ok_or_else(|| DispatchError::configuration("endpoint has no instance provider"))?;
        let instance = provider.get_instance(call)?;
        let mut guard = ReleaseGuard {
            provider: provider.as_ref(),
            call,
            instance: Some(instance.clone()),
        };

        call.ensure_active()?;
        let result = operation(&instance);
        drop(instance);
        let released = guard.release();

        if let Err(release_err) = released {
            tracing::error!(
                call = %call.id(),
                error = %release_err,
                operation_failed = result.is_err(),
                "instance release failed after call completed"
            );
        }
        result
    }

    /// [`dispatch`](Self::dispatch) with the instance downcast to `T`.
    pub fn dispatch_as<T, R, F>(&self, call: &CallContext, operation: F) -> DispatchResult<R>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> DispatchResult<R>,
    {
        self.dispatch(call, |instance| match (**instance).downcast_ref::<T>() {
            Some(service) => operation(service),
            None => Err(DispatchError::TypeMismatch(std::any::type_name::<T>())),
        })
    }
}

impl fmt::Debug for EndpointDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDispatcher")
            .field("has_instance_provider", &self.has_instance_provider())
            .finish()
    }
}

struct ReleaseGuard<'a> {
    provider: &'a dyn InstanceProvider,
    call: &'a CallContext,
    instance: Option<Instance>,
}

impl ReleaseGuard<'_> {
    fn release(&mut self) -> DispatchResult<()> {
        match self.instance.take() {
            Some(instance) => self.provider.release_instance(self.call, instance),
            None => Ok(()),
        }
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(call = %self.call.id(), error = %err, "release failed on abandoned call");
        }
    }
}

/// An addressable endpoint exposing one contract.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    name: String,
    contract: ContractKey,
    dispatcher: Arc<EndpointDispatcher>,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, contract: impl Into<ContractKey>) -> Self {
        Self {
            name: name.into(),
            contract: contract.into(),
            dispatcher: Arc::new(EndpointDispatcher::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract(&self) -> &ContractKey {
        &self.contract
    }

    pub fn dispatcher(&self) -> &Arc<EndpointDispatcher> {
        &self.dispatcher
    }
}

/// Metadata describing a host: its service, instancing mode, and endpoints.
///
/// ```rust
/// use ferrous_dispatch::{ContractKey, HostDescription};
///
/// let description = HostDescription::new("Calculator")
///     .with_endpoint("basic", "ICalculator")
///     .with_endpoint("basic-tcp", "ICalculator")
///     .with_endpoint("admin", "IAdmin");
///
/// assert_eq!(description.endpoints_for(&ContractKey::named("ICalculator")).count(), 2);
/// assert_eq!(description.contracts().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct HostDescription {
    service_name: String,
    instance_mode: InstanceContextMode,
    endpoints: Vec<ServiceEndpoint>,
}

impl HostDescription {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            instance_mode: InstanceContextMode::default(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_instance_mode(mut self, mode: InstanceContextMode) -> Self {
        self.instance_mode = mode;
        self
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, contract: impl Into<ContractKey>) -> Self {
        self.endpoints.push(ServiceEndpoint::new(name, contract));
        self
    }

    pub fn add_endpoint(&mut self, endpoint: ServiceEndpoint) {
        self.endpoints.push(endpoint);
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn instance_mode(&self) -> InstanceContextMode {
        self.instance_mode
    }

    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.endpoints
    }

    pub fn endpoint(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.iter().find(|endpoint| endpoint.name == name)
    }

    /// Endpoints whose contract is `contract`.
    pub fn endpoints_for<'a>(&'a self, contract: &'a ContractKey) -> impl Iterator<Item = &'a ServiceEndpoint> + 'a {
        self.endpoints.iter().filter(move |endpoint| &endpoint.contract == contract)
    }

    /// Distinct contracts exposed by the host, in endpoint order.
    pub fn contracts(&self) -> Vec<ContractKey> {
        let mut contracts: Vec<ContractKey> = Vec::new();
        for endpoint in &self.endpoints {
            if !contracts.contains(&endpoint.contract) {
                contracts.push(endpoint.contract.clone());
            }
        }
        contracts
    }
}

/// A service host: endpoints plus an open/close lifecycle.
///
/// Hooks registered with [`on_close`](Self::on_close) run LIFO when the host
/// closes or aborts. A host dropped while still open is aborted.
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{CommunicationObject, CommunicationState, HostDescription, ServiceHost};
/// use std::time::Duration;
///
/// let host = ServiceHost::new(HostDescription::new("Echo").with_endpoint("main", "Echo"));
/// assert!(host.is_configurable());
///
/// host.open().unwrap();
/// assert_eq!(host.state(), CommunicationState::Opened);
///
/// host.close(Duration::from_secs(1)).unwrap();
/// assert_eq!(host.state(), CommunicationState::Closed);
/// ```
pub struct ServiceHost {
    description: HostDescription,
    state: Mutex<CommunicationState>,
    on_close: Mutex<DisposeBag>,
    cancellation: CancellationToken,
}

impl ServiceHost {
    pub fn new(description: HostDescription) -> Self {
        Self {
            description,
            state: Mutex::new(CommunicationState::Created),
            on_close: Mutex::new(DisposeBag::default()),
            cancellation: CancellationToken::new(),
        }
    }

    /// A host that serves every endpoint from `instance`, which the runtime owns.
    pub fn single(description: HostDescription, instance: Instance) -> Self {
        let description = description.with_instance_mode(InstanceContextMode::Single);
        let provider: Arc<dyn InstanceProvider> = Arc::new(FixedInstanceProvider::new(instance));
        for endpoint in description.endpoints() {
            endpoint.dispatcher().set_instance_provider(provider.clone());
        }
        Self::new(description)
    }

    pub fn description(&self) -> &HostDescription {
        &self.description
    }

    pub fn instance_mode(&self) -> InstanceContextMode {
        self.description.instance_mode()
    }

    pub fn endpoint(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.description.endpoint(name)
    }

    /// Providers may only be installed before the host opens.
    pub fn is_configurable(&self) -> bool {
        *self.state.lock() == CommunicationState::Created
    }

    /// Runs `configure` with the host held in the `Created` state, so `open`
    /// cannot start until it returns.
    ///
    /// `configure` must not call back into the host's state methods.
    pub(crate) fn while_configurable<R, F>(&self, configure: F) -> DispatchResult<R>
    where
        F: FnOnce() -> DispatchResult<R>,
    {
        let state = self.state.lock();
        if *state != CommunicationState::Created {
            return Err(DispatchError::configuration(format!(
                "host '{}' can no longer be configured",
                self.description.service_name()
            )));
        }
        let result = configure();
        drop(state);
        result
    }

    pub fn open(&self) -> DispatchResult<()> {
        {
            let mut state = self.state.lock();
            if *state != CommunicationState::Created {
                return Err(DispatchError::configuration(format!(
                    "host '{}' cannot open from state {}",
                    self.description.service_name(),
                    *state
                )));
            }
            *state = CommunicationState::Opening;
        }

        for endpoint in self.description.endpoints() {
            if !endpoint.dispatcher().has_instance_provider() {
                tracing::warn!(
                    host = %self.description.service_name(),
                    endpoint = %endpoint.name(),
                    "endpoint has no instance provider; calls to it will fail"
                );
            }
        }

        *self.state.lock() = CommunicationState::Opened;
        tracing::debug!(host = %self.description.service_name(), "host opened");
        Ok(())
    }

    /// Context for a new call, cancelled when the host closes.
    pub fn new_call(&self) -> CallContext {
        CallContext::new().with_cancellation(self.cancellation.child_token())
    }

    /// Dispatches `call` to the named endpoint of an open host.
    pub fn dispatch<R, F>(&self, endpoint: &str, call: &CallContext, operation: F) -> DispatchResult<R>
    where
        F: FnOnce(&Instance) -> DispatchResult<R>,
    {
        let state = self.state();
        if state != CommunicationState::Opened {
            return Err(DispatchError::Communication(format!(
                "host '{}' is {}",
                self.description.service_name(),
                state
            )));
        }
        let endpoint = self
            .endpoint(endpoint)
            .ok_or(DispatchError::ArgumentInvalid("endpoint"))?;
        endpoint.dispatcher().dispatch(call, operation)
    }

    /// Registers a hook that runs when the host closes or aborts.
    pub fn on_close<F>(&self, hook: F)
    where
        F: FnOnce() -> DispatchResult<()> + Send + 'static,
    {
        self.on_close.lock().push(Box::new(hook));
    }

    /// Marks the host faulted and cancels in-flight calls.
    pub fn fault(&self) {
        let mut state = self.state.lock();
        if *state != CommunicationState::Closed {
            *state = CommunicationState::Faulted;
            self.cancellation.cancel();
        }
    }

    fn run_close_hooks(&self) -> DispatchResult<()> {
        let mut hooks = self.on_close.lock().take();
        if hooks.is_empty() {
            return Ok(());
        }
        tracing::trace!(host = %self.description.service_name(), hooks = hooks.len(), "running close hooks");
        hooks.run_all_reverse()
    }
}

fn close_error(err: DispatchError) -> CloseError {
    match err {
        DispatchError::Timeout(timeout) => CloseError::Timeout(timeout),
        DispatchError::Communication(msg) => CloseError::Communication(msg),
        other => CloseError::other(other),
    }
}

impl CommunicationObject for ServiceHost {
    fn state(&self) -> CommunicationState {
        *self.state.lock()
    }

    /// Closes the host and runs its close hooks.
    ///
    /// Hooks are synchronous and cannot be interrupted; a close that overruns
    /// `timeout` still completes but is reported as a timeout.
    fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        {
            let mut state = self.state.lock();
            match *state {
                CommunicationState::Closed => return Ok(()),
                CommunicationState::Faulted => {
                    return Err(CloseError::Communication("host is faulted".to_string()))
                }
                _ => *state = CommunicationState::Closing,
            }
        }

        let started = Instant::now();
        self.cancellation.cancel();
        let result = self.run_close_hooks();
        *self.state.lock() = CommunicationState::Closed;
        tracing::debug!(host = %self.description.service_name(), "host closed");

        result.map_err(close_error)?;
        if started.elapsed() > timeout {
            return Err(CloseError::Timeout(timeout));
        }
        Ok(())
    }

    fn abort(&self) {
        {
            let mut state = self.state.lock();
            if *state == CommunicationState::Closed {
                return;
            }
            *state = CommunicationState::Closed;
        }
        self.cancellation.cancel();
        if let Err(err) = self.run_close_hooks() {
            tracing::warn!(host = %self.description.service_name(), error = %err, "close hook failed during abort");
        }
        tracing::debug!(host = %self.description.service_name(), "host aborted");
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        if self.state() != CommunicationState::Closed {
            self.abort();
        }
    }
}

impl fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHost")
            .field("service", &self.description.service_name())
            .field("state", &self.state())
            .field("endpoints", &self.description.endpoints().len())
            .finish()
    }
}
