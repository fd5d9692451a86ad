use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tracing::{debug, trace};

use crate::{AsyncDispose, CleanupError};

/// The memoized disposal of an [`AsyncDisposable`]. Every clone completes with the same result.
pub type DisposeFuture = Shared<LocalBoxFuture<'static, Result<(), CleanupError>>>;

type PriorAsyncHook<T> = fn(&T) -> LocalBoxFuture<'static, Result<(), CleanupError>>;

/// Owns a value and runs an asynchronous cleanup function for it exactly once.
///
/// The first call to [`dispose_async()`][Self::dispose_async] creates the disposal future and
/// stores it before returning. Every call, including calls made while an earlier disposal is
/// still in progress, returns a clone of that same future. The cleanup therefore runs once and
/// every caller observes the same outcome, including the same [`CleanupError`] on failure.
///
/// The cleanup starts when any clone of the disposal future is first polled.
///
/// The value is held in an [`Rc`] so the cleanup future can keep it alive for as long as it
/// needs to. It stays accessible via [`Deref`] and [`value()`][Self::value].
///
/// There is no asynchronous drop: dropping an `AsyncDisposable` that was never disposed does
/// not run the cleanup.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use event_bridge::{AsyncDisposable, CleanupError};
/// use futures::executor::block_on;
///
/// let flushes = Rc::new(Cell::new(0));
///
/// let flushes_clone = Rc::clone(&flushes);
/// let writer = AsyncDisposable::new("log file", move |_| async move {
///     flushes_clone.set(flushes_clone.get() + 1);
///     Ok::<(), CleanupError>(())
/// });
///
/// let first = writer.dispose_async();
/// let second = writer.dispose_async();
///
/// block_on(async {
///     first.await.unwrap();
///     second.await.unwrap();
/// });
///
/// assert_eq!(flushes.get(), 1);
/// ```
pub struct AsyncDisposable<T, F> {
    value: Rc<T>,

    // Taken when the disposal future is created; `None` afterwards.
    cleanup: Cell<Option<F>>,

    prior: Option<PriorAsyncHook<T>>,

    // Set by the first `dispose_async()` call and never cleared.
    disposal: RefCell<Option<DisposeFuture>>,
}

/// Wraps `value` so that the asynchronous `cleanup` runs for it exactly once.
///
/// Shorthand for [`AsyncDisposable::new()`].
#[must_use]
pub fn wrap_async<T, F, Fut>(value: T, cleanup: F) -> AsyncDisposable<T, F>
where
    T: 'static,
    F: FnOnce(Rc<T>) -> Fut + 'static,
    Fut: Future<Output = Result<(), CleanupError>> + 'static,
{
    AsyncDisposable::new(value, cleanup)
}

impl<T, F, Fut> AsyncDisposable<T, F>
where
    T: 'static,
    F: FnOnce(Rc<T>) -> Fut + 'static,
    Fut: Future<Output = Result<(), CleanupError>> + 'static,
{
    /// Wraps `value` so that the asynchronous `cleanup` runs for it exactly once.
    #[must_use]
    pub fn new(value: T, cleanup: F) -> Self {
        Self::with_prior(value, cleanup, None)
    }

    fn with_prior(value: T, cleanup: F, prior: Option<PriorAsyncHook<T>>) -> Self {
        Self {
            value: Rc::new(value),
            cleanup: Cell::new(Some(cleanup)),
            prior,
            disposal: RefCell::new(None),
        }
    }

    /// Returns the disposal future, creating it on the first call.
    ///
    /// The future awaits the cleanup function and then, if the value was wrapped with
    /// [`chained()`][Self::chained], the value's own [`AsyncDispose::dispose_async()`].
    /// If the cleanup function fails, the chained hook is skipped.
    pub fn dispose_async(&self) -> DisposeFuture {
        if let Some(existing) = self.disposal.borrow().as_ref() {
            return existing.clone();
        }

        let cleanup = self.cleanup.take();
        let prior = self.prior;
        let value = Rc::clone(&self.value);

        let disposal = async move {
            if let Some(cleanup) = cleanup {
                cleanup(Rc::clone(&value)).await?;
            }

            if let Some(prior) = prior {
                prior(&value).await?;
            }

            trace!(value_type = type_name::<T>(), "disposed value asynchronously");

            Ok::<(), CleanupError>(())
        }
        .boxed_local()
        .shared();

        // No suspension point between the check above and this assignment, so concurrent
        // callers cannot observe a half-started disposal.
        *self.disposal.borrow_mut() = Some(disposal.clone());

        disposal
    }

    /// Whether [`dispose_async()`][Self::dispose_async] has been called.
    #[must_use]
    pub fn is_disposal_requested(&self) -> bool {
        self.disposal.borrow().is_some()
    }

    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> &Rc<T> {
        &self.value
    }
}

impl<T, F, Fut> AsyncDisposable<T, F>
where
    T: AsyncDispose + 'static,
    F: FnOnce(Rc<T>) -> Fut + 'static,
    Fut: Future<Output = Result<(), CleanupError>> + 'static,
{
    /// Wraps `value` so that the asynchronous `cleanup` and then the value's own
    /// [`AsyncDispose::dispose_async()`] run exactly once.
    #[must_use]
    pub fn chained(value: T, cleanup: F) -> Self {
        Self::with_prior(value, cleanup, Some(<T as AsyncDispose>::dispose_async))
    }
}

impl<T, F, Fut> AsyncDispose for AsyncDisposable<T, F>
where
    T: 'static,
    F: FnOnce(Rc<T>) -> Fut + 'static,
    Fut: Future<Output = Result<(), CleanupError>> + 'static,
{
    fn dispose_async(&self) -> LocalBoxFuture<'static, Result<(), CleanupError>> {
        Self::dispose_async(self).boxed_local()
    }
}

impl<T, F> Deref for AsyncDisposable<T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F> Drop for AsyncDisposable<T, F> {
    fn drop(&mut self) {
        if self.disposal.get_mut().is_none() {
            debug!(
                value_type = type_name::<T>(),
                "async disposable dropped without being disposed; cleanup skipped"
            );
        }
    }
}

impl<T, F> fmt::Debug for AsyncDisposable<T, F>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("value", &self.value)
            .field("chained", &self.prior.is_some())
            .field("disposal_requested", &self.disposal.borrow().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::task::Poll;

    use futures::channel::oneshot;
    use futures::executor::block_on;
    use futures::future::{self, join_all};
    use static_assertions::assert_not_impl_any;
    use testing::{WakeCounter, poll_once, with_watchdog};

    use super::*;

    type BoxedAsyncCleanup = Box<dyn FnOnce(Rc<u32>) -> future::Ready<Result<(), CleanupError>>>;

    assert_not_impl_any!(AsyncDisposable<u32, BoxedAsyncCleanup>: Send, Sync);
    assert_not_impl_any!(DisposeFuture: Send, Sync);

    #[test]
    fn concurrent_disposals_run_cleanup_once() {
        with_watchdog(|| {
            for callers in [1_usize, 2, 7] {
                let calls = Rc::new(Cell::new(0));

                let calls_clone = Rc::clone(&calls);
                let disposable = AsyncDisposable::new(10_u32, move |_| async move {
                    calls_clone.set(calls_clone.get() + 1);
                    Ok::<(), CleanupError>(())
                });

                let disposals = (0..callers).map(|_| disposable.dispose_async());
                let results = block_on(join_all(disposals));

                assert_eq!(results.len(), callers);
                assert!(results.iter().all(Result::is_ok));
                assert_eq!(calls.get(), 1);
            }
        });
    }

    #[test]
    fn all_callers_observe_the_same_failure() {
        with_watchdog(|| {
            let disposable =
                AsyncDisposable::new((), |_| async { Err::<(), _>(CleanupError::msg("disk full")) });

            let results = block_on(join_all([
                disposable.dispose_async(),
                disposable.dispose_async(),
                disposable.dispose_async(),
            ]));

            let errors: Vec<_> = results.into_iter().map(Result::unwrap_err).collect();
            assert!(errors[0].is_same_failure(&errors[1]));
            assert!(errors[1].is_same_failure(&errors[2]));

            // Asking again after completion yields the very same failure.
            let late = block_on(disposable.dispose_async()).unwrap_err();
            assert!(late.is_same_failure(&errors[0]));
        });
    }

    #[test]
    fn call_during_inflight_disposal_joins_it() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let calls = Rc::new(Cell::new(0));

        let calls_clone = Rc::clone(&calls);
        let disposable = AsyncDisposable::new(1_u32, move |_| async move {
            calls_clone.set(calls_clone.get() + 1);
            release_rx.await.map_err(CleanupError::new)?;
            Ok::<(), CleanupError>(())
        });

        let counter = WakeCounter::new();

        let mut first = disposable.dispose_async();
        assert!(counter.poll(&mut first).is_pending());
        assert!(disposable.is_disposal_requested());

        let mut second = disposable.dispose_async();
        assert!(poll_once(&mut second).is_pending());

        release_tx.send(()).unwrap();
        assert!(counter.count() >= 1);

        assert!(matches!(poll_once(&mut first), Poll::Ready(Ok(()))));
        assert!(matches!(poll_once(&mut second), Poll::Ready(Ok(()))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cleanup_receives_the_same_value() {
        let disposable = AsyncDisposable::new(String::from("conn"), |value| async move {
            assert_eq!(value.as_str(), "conn");
            Ok::<(), CleanupError>(())
        });
        let original = Rc::clone(disposable.value());

        block_on(disposable.dispose_async()).unwrap();

        assert!(Rc::ptr_eq(&original, disposable.value()));
        assert_eq!(disposable.len(), 4);
    }

    #[test]
    fn chained_awaits_prior_hook_after_cleanup() {
        with_watchdog(|| {
            let order = Rc::new(RefCell::new(Vec::new()));

            let inner = {
                let order = Rc::clone(&order);
                AsyncDisposable::new(5_u32, move |_| async move {
                    order.borrow_mut().push("inner");
                    Ok::<(), CleanupError>(())
                })
            };

            let outer = {
                let order = Rc::clone(&order);
                AsyncDisposable::chained(inner, move |_| async move {
                    order.borrow_mut().push("outer");
                    Ok::<(), CleanupError>(())
                })
            };

            block_on(outer.dispose_async()).unwrap();
            block_on(outer.dispose_async()).unwrap();

            assert_eq!(*order.borrow(), vec!["outer", "inner"]);
        });
    }

    #[test]
    fn trait_object_disposal_shares_outcome() {
        let calls = Rc::new(Cell::new(0));

        let calls_clone = Rc::clone(&calls);
        let disposable = AsyncDisposable::new(0_u8, move |_| async move {
            calls_clone.set(calls_clone.get() + 1);
            Ok::<(), CleanupError>(())
        });

        let as_trait: &dyn AsyncDispose = &disposable;
        block_on(as_trait.dispose_async()).unwrap();
        block_on(disposable.dispose_async()).unwrap();

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn drop_without_disposal_skips_cleanup() {
        let calls = Rc::new(Cell::new(0));

        let calls_clone = Rc::clone(&calls);
        let disposable = wrap_async(0_u8, move |_| async move {
            calls_clone.set(calls_clone.get() + 1);
            Ok::<(), CleanupError>(())
        });
        assert!(!disposable.is_disposal_requested());

        drop(disposable);

        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn debug_output_mentions_state() {
        let disposable = AsyncDisposable::new(3_u32, |_| async { Ok::<(), CleanupError>(()) });
        let output = format!("{disposable:?}");

        assert!(output.contains("disposal_requested"));
    }
}
