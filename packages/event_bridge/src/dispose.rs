use futures::future::LocalBoxFuture;

use crate::CleanupError;

/// A resource that can release what it holds synchronously.
///
/// Implementations must be idempotent: only the first call has an effect, later calls
/// return `Ok(())` without doing anything.
///
/// When a value implementing this trait is wrapped with [`Disposable::chained()`], its own
/// `dispose()` runs after the wrapper's cleanup.
///
/// [`Disposable::chained()`]: crate::Disposable::chained
pub trait Dispose {
    /// Releases the resource. Only the first call has an effect.
    ///
    /// # Errors
    ///
    /// Returns the cleanup failure of the first call. Later calls never fail.
    fn dispose(&self) -> Result<(), CleanupError>;
}

/// A resource that releases what it holds asynchronously.
///
/// Every call must return a future with the same outcome: the cleanup runs once and all
/// callers observe its result.
///
/// When a value implementing this trait is wrapped with [`AsyncDisposable::chained()`], its
/// own `dispose_async()` is awaited after the wrapper's cleanup.
///
/// [`AsyncDisposable::chained()`]: crate::AsyncDisposable::chained
pub trait AsyncDispose {
    /// Starts releasing the resource (if not already started) and returns a future that
    /// completes when the release has completed.
    fn dispose_async(&self) -> LocalBoxFuture<'static, Result<(), CleanupError>>;
}
