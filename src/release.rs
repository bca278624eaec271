//! Safe release of communication resources.
//!
//! A channel-like resource has an observable state machine and two ways to
//! end: a graceful `close`, which may block, time out, or fail on the wire,
//! and a hard `abort`, which cannot fail. Closing a resource that has already
//! faulted raises a secondary error that hides the real one, so release
//! follows one rule set:
//!
//! | State              | Action                                                   |
//! |--------------------|----------------------------------------------------------|
//! | `Faulted`          | abort, never close                                       |
//! | `Closed`           | nothing                                                  |
//! | anything else      | close; on timeout or communication fault abort and swallow |
//! | close fails otherwise | abort, then return the error                          |

use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DispatchError;

/// Default budget for a graceful close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Observable state of a communication resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunicationState {
    Created,
    Opening,
    Opened,
    Closing,
    Closed,
    Faulted,
}

impl CommunicationState {
    /// `Closed` or `Faulted`: no further transitions except abort.
    pub fn is_terminal(self) -> bool {
        matches!(self, CommunicationState::Closed | CommunicationState::Faulted)
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommunicationState::Created => "created",
            CommunicationState::Opening => "opening",
            CommunicationState::Opened => "opened",
            CommunicationState::Closing => "closing",
            CommunicationState::Closed => "closed",
            CommunicationState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Failure of a single close attempt.
#[derive(Debug)]
pub enum CloseError {
    /// The close did not finish within its budget
    Timeout(Duration),
    /// The transport failed during the close handshake
    Communication(String),
    /// Anything else; never swallowed
    Other(Box<dyn Error + Send + Sync>),
}

impl CloseError {
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        CloseError::Other(err.into())
    }

    /// Timeouts and communication faults are expected while tearing down and
    /// are handled by aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CloseError::Timeout(_) | CloseError::Communication(_))
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseError::Timeout(timeout) => write!(f, "close timed out after {:?}", timeout),
            CloseError::Communication(msg) => write!(f, "communication fault during close: {}", msg),
            CloseError::Other(err) => write!(f, "close failed: {}", err),
        }
    }
}

impl Error for CloseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CloseError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<CloseError> for DispatchError {
    fn from(err: CloseError) -> Self {
        match err {
            CloseError::Timeout(timeout) => DispatchError::Timeout(timeout),
            CloseError::Communication(msg) => DispatchError::Communication(msg),
            CloseError::Other(err) => DispatchError::Release(err.to_string()),
        }
    }
}

/// A resource with a fault/open/closed state machine.
pub trait CommunicationObject: Send + Sync {
    fn state(&self) -> CommunicationState;

    /// Graceful close bounded by `timeout`.
    fn close(&self, timeout: Duration) -> Result<(), CloseError>;

    /// Hard teardown. Must not fail and must be safe to call in any state.
    fn abort(&self);
}

impl<T: CommunicationObject + ?Sized> CommunicationObject for Arc<T> {
    fn state(&self) -> CommunicationState {
        (**self).state()
    }

    fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        (**self).close(timeout)
    }

    fn abort(&self) {
        (**self).abort()
    }
}

impl<T: CommunicationObject + ?Sized> CommunicationObject for Box<T> {
    fn state(&self) -> CommunicationState {
        (**self).state()
    }

    fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        (**self).close(timeout)
    }

    fn abort(&self) {
        (**self).abort()
    }
}

/// Releases `resource` with [`DEFAULT_CLOSE_TIMEOUT`].
///
/// # Examples
///
/// ```rust
/// use ferrous_dispatch::{safe_release, CloseError, CommunicationObject, CommunicationState};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct BrokenChannel { aborted: AtomicBool }
///
/// impl CommunicationObject for BrokenChannel {
///     fn state(&self) -> CommunicationState { CommunicationState::Faulted }
///     fn close(&self, _: Duration) -> Result<(), CloseError> {
///         Err(CloseError::Communication("socket reset".into()))
///     }
///     fn abort(&self) { self.aborted.store(true, Ordering::SeqCst); }
/// }
///
/// let channel = BrokenChannel::default();
/// safe_release(&channel).unwrap();
/// assert!(channel.aborted.load(Ordering::SeqCst));
/// ```
pub fn safe_release<C: CommunicationObject + ?Sized>(resource: &C) -> Result<(), CloseError> {
    safe_release_with_timeout(resource, DEFAULT_CLOSE_TIMEOUT)
}

/// Releases `resource`, giving a graceful close at most `timeout`.
pub fn safe_release_with_timeout<C: CommunicationObject + ?Sized>(
    resource: &C,
    timeout: Duration,
) -> Result<(), CloseError> {
    match resource.state() {
        CommunicationState::Faulted => {
            tracing::debug!("aborting faulted resource");
            resource.abort();
            Ok(())
        }
        CommunicationState::Closed => Ok(()),
        _ => settle(resource.close(timeout), || resource.abort()),
    }
}

fn settle(result: Result<(), CloseError>, abort: impl FnOnce()) -> Result<(), CloseError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_recoverable() => {
            tracing::warn!(error = %err, "close failed, aborting resource");
            abort();
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "unexpected close failure, aborting resource");
            abort();
            Err(err)
        }
    }
}

/// Guard that safe-releases a resource when dropped.
///
/// Prefer [`SafeRelease::release`] when the caller can act on an
/// unrecognized close failure; dropping the guard can only log it.
///
/// ```rust
/// use ferrous_dispatch::{CloseError, CommunicationObject, CommunicationState, SafeRelease};
/// use std::sync::Mutex;
/// use std::time::Duration;
///
/// struct Channel { state: Mutex<CommunicationState> }
///
/// impl CommunicationObject for Channel {
///     fn state(&self) -> CommunicationState { *self.state.lock().unwrap() }
///     fn close(&self, _: Duration) -> Result<(), CloseError> {
///         *self.state.lock().unwrap() = CommunicationState::Closed;
///         Ok(())
///     }
///     fn abort(&self) { *self.state.lock().unwrap() = CommunicationState::Closed; }
/// }
///
/// let channel = std::sync::Arc::new(Channel { state: Mutex::new(CommunicationState::Opened) });
/// {
///     let guard = SafeRelease::new(channel.clone());
///     assert_eq!(guard.state(), CommunicationState::Opened);
/// }
/// assert_eq!(channel.state(), CommunicationState::Closed);
/// ```
pub struct SafeRelease<C: CommunicationObject> {
    resource: C,
    timeout: Duration,
    released: bool,
}

impl<C: CommunicationObject> SafeRelease<C> {
    pub fn new(resource: C) -> Self {
        Self::with_timeout(resource, DEFAULT_CLOSE_TIMEOUT)
    }

    pub fn with_timeout(resource: C, timeout: Duration) -> Self {
        Self {
            resource,
            timeout,
            released: false,
        }
    }

    /// Releases now and returns the outcome.
    pub fn release(mut self) -> Result<(), CloseError> {
        self.released = true;
        safe_release_with_timeout(&self.resource, self.timeout)
    }
}

impl<C: CommunicationObject> Deref for SafeRelease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.resource
    }
}

impl<C: CommunicationObject> Drop for SafeRelease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = safe_release_with_timeout(&self.resource, self.timeout) {
            tracing::error!(error = %err, "resource release failed on drop");
        }
    }
}

#[cfg(feature = "async")]
pub use self::nonblocking::{safe_release_async, AsyncCommunicationObject};

#[cfg(feature = "async")]
mod nonblocking {
    use super::{settle, CloseError, CommunicationState};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Communication resource whose graceful close is asynchronous.
    #[async_trait]
    pub trait AsyncCommunicationObject: Send + Sync {
        fn state(&self) -> CommunicationState;

        /// Graceful close. The caller bounds it with a timeout.
        async fn close(&self) -> Result<(), CloseError>;

        fn abort(&self);
    }

    /// Async counterpart of [`safe_release_with_timeout`](super::safe_release_with_timeout).
    ///
    /// A close that does not finish within `timeout` is treated as a
    /// [`CloseError::Timeout`]: the resource is aborted and the call succeeds.
    pub async fn safe_release_async<C>(resource: &C, timeout: Duration) -> Result<(), CloseError>
    where
        C: AsyncCommunicationObject + ?Sized,
    {
        match resource.state() {
            CommunicationState::Faulted => {
                tracing::debug!("aborting faulted resource");
                resource.abort();
                Ok(())
            }
            CommunicationState::Closed => Ok(()),
            _ => {
                let result = match tokio::time::timeout(timeout, resource.close()).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(CloseError::Timeout(timeout)),
                };
                settle(result, || resource.abort())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        state: CommunicationState,
        close: fn(Duration) -> Result<(), CloseError>,
        closes: AtomicUsize,
        aborts: AtomicUsize,
    }

    impl Scripted {
        fn new(state: CommunicationState, close: fn(Duration) -> Result<(), CloseError>) -> Self {
            Self {
                state,
                close,
                closes: AtomicUsize::new(0),
                aborts: AtomicUsize::new(0),
            }
        }
    }

    impl CommunicationObject for Scripted {
        fn state(&self) -> CommunicationState {
            self.state
        }

        fn close(&self, timeout: Duration) -> Result<(), CloseError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            (self.close)(timeout)
        }

        fn abort(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn faulted_resource_is_aborted_without_close() {
        let res = Scripted::new(CommunicationState::Faulted, |_| panic!("close must not run"));
        safe_release(&res).unwrap();
        assert_eq!(res.closes.load(Ordering::SeqCst), 0);
        assert_eq!(res.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_resource_is_left_alone() {
        let res = Scripted::new(CommunicationState::Closed, |_| Ok(()));
        safe_release(&res).unwrap();
        assert_eq!(res.closes.load(Ordering::SeqCst), 0);
        assert_eq!(res.aborts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timeout_during_close_is_swallowed() {
        let res = Scripted::new(CommunicationState::Opened, |t| Err(CloseError::Timeout(t)));
        safe_release_with_timeout(&res, Duration::from_millis(5)).unwrap();
        assert_eq!(res.closes.load(Ordering::SeqCst), 1);
        assert_eq!(res.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unexpected_close_failure_aborts_then_propagates() {
        let res = Scripted::new(CommunicationState::Opened, |_| Err(CloseError::other("disk on fire")));
        let err = safe_release(&res).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(res.aborts.load(Ordering::SeqCst), 1);
        assert!(matches!(DispatchError::from(err), DispatchError::Release(msg) if msg == "disk on fire"));
    }

    #[test]
    fn released_guard_does_not_release_twice() {
        let res = Arc::new(Scripted::new(CommunicationState::Opened, |_| Ok(())));
        SafeRelease::new(res.clone()).release().unwrap();
        assert_eq!(res.closes.load(Ordering::SeqCst), 1);
    }
}
