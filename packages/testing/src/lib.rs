#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in `event_bridge` packages.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::Duration;

/// Runs a test with a timeout to prevent infinite hangs.
///
/// A disposed wait-once future stays pending forever, so a test that blocks on one by
/// mistake would otherwise stall the whole run. The test closure runs on a separate thread
/// and the calling thread panics if it does not finish within 10 seconds (60 seconds under
/// Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly.
///
/// # Panics
///
/// Panics if the test exceeds the timeout or if the test itself panics.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {} second timeout", timeout.as_secs());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Polls a future exactly once with a waker that does nothing.
///
/// Useful for asserting that a future is still pending (or already ready) without
/// blocking the test thread.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(Waker::noop());
    Pin::new(future).poll(&mut cx)
}

/// A waker that counts how many times it has been woken.
///
/// # Example
///
/// ```rust
/// use testing::WakeCounter;
///
/// let counter = WakeCounter::new();
/// let waker = counter.waker();
///
/// waker.wake_by_ref();
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct WakeCounter {
    wakes: AtomicUsize,
}

impl WakeCounter {
    /// Creates a new counter with zero recorded wakes.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a waker that increments this counter when woken.
    #[must_use]
    pub fn waker(self: &Arc<Self>) -> Waker {
        Waker::from(Arc::clone(self))
    }

    /// Returns the number of wakes recorded so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.wakes.load(Ordering::Relaxed)
    }

    /// Polls a future once with a waker that feeds this counter.
    pub fn poll<F>(self: &Arc<Self>, future: &mut F) -> Poll<F::Output>
    where
        F: Future + Unpin,
    {
        let waker = self.waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(future).poll(&mut cx)
    }
}

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::future::{pending, ready};

    use super::*;

    #[test]
    fn watchdog_returns_value_of_fast_test() {
        let result = with_watchdog(|| 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn poll_once_reports_ready_and_pending() {
        let mut done = ready(5);
        assert_eq!(poll_once(&mut done), Poll::Ready(5));

        let mut never = pending::<()>();
        assert_eq!(poll_once(&mut never), Poll::Pending);
    }

    #[test]
    fn wake_counter_counts_each_wake() {
        let counter = WakeCounter::new();

        counter.waker().wake();
        counter.waker().wake_by_ref();

        assert_eq!(counter.count(), 2);
    }
}
