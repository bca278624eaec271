#![cfg(feature = "async")]

/// Async safe release tests
///
/// These tests verify that an async close is bounded by its timeout and that
/// the release discipline matches the blocking variant.

use async_trait::async_trait;
use ferrous_dispatch::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct AsyncChannel {
    state: Mutex<CommunicationState>,
    close_delay: Duration,
    close_result: fn() -> Result<(), CloseError>,
    aborts: AtomicUsize,
}

impl AsyncChannel {
    fn new(state: CommunicationState, close_delay: Duration, close_result: fn() -> Result<(), CloseError>) -> Self {
        Self {
            state: Mutex::new(state),
            close_delay,
            close_result,
            aborts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AsyncCommunicationObject for AsyncChannel {
    fn state(&self) -> CommunicationState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> Result<(), CloseError> {
        tokio::time::sleep(self.close_delay).await;
        let result = (self.close_result)();
        if result.is_ok() {
            *self.state.lock().unwrap() = CommunicationState::Closed;
        }
        result
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = CommunicationState::Closed;
    }
}

#[tokio::test]
async fn slow_close_is_aborted_after_timeout() {
    let channel = AsyncChannel::new(CommunicationState::Opened, Duration::from_secs(5), || Ok(()));

    safe_release_async(&channel, Duration::from_millis(20)).await.unwrap();

    assert_eq!(channel.aborts.load(Ordering::SeqCst), 1);
    assert_eq!(channel.state(), CommunicationState::Closed);
}

#[tokio::test]
async fn prompt_close_does_not_abort() {
    let channel = AsyncChannel::new(CommunicationState::Opened, Duration::ZERO, || Ok(()));

    safe_release_async(&channel, Duration::from_secs(1)).await.unwrap();

    assert_eq!(channel.aborts.load(Ordering::SeqCst), 0);
    assert_eq!(channel.state(), CommunicationState::Closed);
}

#[tokio::test]
async fn faulted_channel_is_aborted_without_closing() {
    let channel = AsyncChannel::new(CommunicationState::Faulted, Duration::from_secs(5), || {
        Err(CloseError::other("must not be called"))
    });

    safe_release_async(&channel, Duration::from_secs(1)).await.unwrap();

    assert_eq!(channel.aborts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unexpected_failure_is_returned_after_abort() {
    let channel = AsyncChannel::new(CommunicationState::Opened, Duration::ZERO, || {
        Err(CloseError::other("handshake rejected"))
    });

    let err = safe_release_async(&channel, Duration::from_secs(1)).await.unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(channel.aborts.load(Ordering::SeqCst), 1);
}
