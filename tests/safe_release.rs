/// Safe release tests
///
/// These tests verify the release discipline for channel-like resources,
/// both when called directly and when a container releases a channel it
/// resolved for a call.

use ferrous_dispatch::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===== Test Resource =====

#[derive(Clone, Copy)]
enum CloseBehavior {
    Succeed,
    TimeOut,
    Disconnect,
    Explode,
}

struct Channel {
    state: Mutex<CommunicationState>,
    behavior: CloseBehavior,
    closes: AtomicUsize,
    aborts: AtomicUsize,
}

impl Channel {
    fn new(state: CommunicationState, behavior: CloseBehavior) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            behavior,
            closes: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
        })
    }

    fn fault(&self) {
        *self.state.lock().unwrap() = CommunicationState::Faulted;
    }

    fn reopen(&self) {
        *self.state.lock().unwrap() = CommunicationState::Opened;
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl CommunicationObject for Channel {
    fn state(&self) -> CommunicationState {
        *self.state.lock().unwrap()
    }

    fn close(&self, timeout: Duration) -> Result<(), CloseError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.state() == CommunicationState::Faulted {
            return Err(CloseError::other("close called on a faulted channel"));
        }
        match self.behavior {
            CloseBehavior::Succeed => {
                *self.state.lock().unwrap() = CommunicationState::Closed;
                Ok(())
            }
            CloseBehavior::TimeOut => Err(CloseError::Timeout(timeout)),
            CloseBehavior::Disconnect => Err(CloseError::Communication("connection reset".into())),
            CloseBehavior::Explode => Err(CloseError::other("certificate store corrupted")),
        }
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = CommunicationState::Closed;
    }
}

// ===== Direct Release =====

#[test]
fn faulted_channel_never_throws_even_if_close_would() {
    for behavior in [CloseBehavior::Succeed, CloseBehavior::TimeOut, CloseBehavior::Explode] {
        let channel = Channel::new(CommunicationState::Faulted, behavior);
        safe_release(&channel).unwrap();
        assert_eq!(channel.closes(), 0);
        assert_eq!(channel.aborts(), 1);
    }
}

#[test]
fn timeout_on_open_channel_aborts_and_is_swallowed() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::TimeOut);
    safe_release_with_timeout(&channel, Duration::from_millis(50)).unwrap();
    assert_eq!(channel.closes(), 1);
    assert_eq!(channel.aborts(), 1);
    assert_eq!(channel.state(), CommunicationState::Closed);
}

#[test]
fn communication_fault_on_close_is_swallowed() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Disconnect);
    safe_release(&channel).unwrap();
    assert_eq!(channel.aborts(), 1);
}

#[test]
fn unknown_close_failure_aborts_then_propagates() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Explode);
    let err = safe_release(&channel).unwrap_err();
    assert!(matches!(err, CloseError::Other(_)));
    assert_eq!(err.to_string(), "close failed: certificate store corrupted");
    assert_eq!(channel.aborts(), 1);
}

#[test]
fn graceful_close_does_not_abort() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Succeed);
    safe_release(&channel).unwrap();
    safe_release(&channel).unwrap();
    assert_eq!(channel.closes(), 1);
    assert_eq!(channel.aborts(), 0);
}

#[test]
fn guard_releases_on_drop() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Disconnect);
    {
        let guard = SafeRelease::with_timeout(channel.clone(), Duration::from_millis(10));
        guard.fault();
    }
    assert_eq!(channel.closes(), 0);
    assert_eq!(channel.aborts(), 1);
}

// ===== Container-Owned Channels =====

fn channel_provider(channel: Arc<Channel>) -> PerCallInstanceProvider {
    let mut registry = ComponentRegistry::new();
    registry
        .register("Channel", Lifetime::Scoped, move |_| Ok(channel.clone()))
        .use_safe_release();
    let descriptor = ServiceDescriptor::builder().contract("Channel").resolve_contract().build().unwrap();
    PerCallInstanceProvider::new(Arc::new(registry.build()), descriptor)
}

#[test]
fn faulted_channel_from_the_container_is_aborted_at_release() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Succeed);
    let provider = channel_provider(channel.clone());

    let call = CallContext::new();
    let instance = provider.get_instance(&call).unwrap();
    channel.fault();

    provider.release_instance(&call, instance).unwrap();
    assert_eq!(channel.closes(), 0);
    assert_eq!(channel.aborts(), 1);
}

#[test]
fn unexpected_channel_failure_reaches_release_instance() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Explode);
    let provider = channel_provider(channel.clone());

    let call = CallContext::new();
    let instance = provider.get_instance(&call).unwrap();
    let err = provider.release_instance(&call, instance).unwrap_err();

    assert!(matches!(err, DispatchError::Release(_)));
    assert_eq!(channel.aborts(), 1);
    // The scope is gone regardless; a second release is a no-op
    provider.release_instance(&call, Arc::new(())).unwrap();
}

#[test]
fn release_failure_never_changes_the_call_outcome() {
    let channel = Channel::new(CommunicationState::Opened, CloseBehavior::Explode);
    let dispatcher = EndpointDispatcher::new();
    dispatcher.set_instance_provider(Arc::new(channel_provider(channel.clone())));

    let reply = dispatcher.dispatch(&CallContext::new(), |_| Ok("reply")).unwrap();
    assert_eq!(reply, "reply");
    assert_eq!(channel.aborts(), 1);

    channel.reopen();
    let err = dispatcher
        .dispatch(&CallContext::new(), |_| -> DispatchResult<()> {
            Err(DispatchError::Operation("bad request".into()))
        })
        .unwrap_err();
    assert!(matches!(err, DispatchError::Operation(_)));
    assert_eq!(channel.aborts(), 2);
}
