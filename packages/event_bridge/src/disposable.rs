use std::any::type_name;
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;

use tracing::{trace, warn};

use crate::{CleanupError, Dispose};

/// A synchronous cleanup hook that a value already carried before it was wrapped.
type PriorHook<T> = fn(&T) -> Result<(), CleanupError>;

/// Owns a value and runs a cleanup function for it exactly once.
///
/// The cleanup runs on the first call to [`dispose()`][Self::dispose] or, if that never
/// happens, when the `Disposable` is dropped. Any later disposal request is a no-op.
///
/// The wrapped value is not modified and remains accessible through [`Deref`] and
/// [`value()`][Self::value] for the whole lifetime of the wrapper, including after disposal.
///
/// # Disposal order
///
/// The disposed flag is set before the cleanup function is invoked. Consequently:
///
/// * A cleanup function that (directly or indirectly) requests disposal of the same
///   `Disposable` again observes a no-op.
/// * A cleanup function that fails or panics is never retried.
///
/// # Chaining
///
/// If the wrapped value has its own cleanup hook (it implements [`Dispose`]), use
/// [`chained()`][Self::chained] instead of [`new()`][Self::new]. The value's own hook then
/// runs right after the cleanup function, as part of the same single disposal.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
///
/// use event_bridge::Disposable;
///
/// let log = RefCell::new(Vec::new());
///
/// {
///     let connection = Disposable::new(42, |id| {
///         log.borrow_mut().push(format!("closing connection {id}"));
///         Ok(())
///     });
///
///     assert_eq!(*connection, 42);
///     // `connection` is disposed when it goes out of scope.
/// }
///
/// assert_eq!(*log.borrow(), vec!["closing connection 42".to_string()]);
/// ```
pub struct Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    value: T,

    // Taken on the first disposal; `None` afterwards.
    cleanup: Cell<Option<F>>,

    prior: Option<PriorHook<T>>,

    disposed: Cell<bool>,
}

/// Wraps `value` so that `cleanup` runs for it exactly once.
///
/// Shorthand for [`Disposable::new()`].
#[must_use]
pub fn wrap_sync<T, F>(value: T, cleanup: F) -> Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    Disposable::new(value, cleanup)
}

impl<T, F> Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    /// Wraps `value` so that `cleanup` runs for it exactly once.
    #[must_use]
    pub fn new(value: T, cleanup: F) -> Self {
        Self::with_prior(value, cleanup, None)
    }

    fn with_prior(value: T, cleanup: F, prior: Option<PriorHook<T>>) -> Self {
        Self {
            value,
            cleanup: Cell::new(Some(cleanup)),
            prior,
            disposed: Cell::new(false),
        }
    }

    /// Runs the cleanup function, then the value's own cleanup hook if it was wrapped with
    /// [`chained()`][Self::chained].
    ///
    /// Only the first call has an effect. Later calls return `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns the failure of the cleanup function or of the chained hook. If the cleanup
    /// function fails, the chained hook is not invoked. The `Disposable` counts as disposed
    /// either way.
    pub fn dispose(&self) -> Result<(), CleanupError> {
        if self.disposed.replace(true) {
            return Ok(());
        }

        if let Some(cleanup) = self.cleanup.take() {
            cleanup(&self.value)?;
        }

        if let Some(prior) = self.prior {
            prior(&self.value)?;
        }

        trace!(value_type = type_name::<T>(), "disposed value");

        Ok(())
    }

    /// Whether disposal has been requested (successfully or not).
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T, F> Disposable<T, F>
where
    T: Dispose,
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    /// Wraps `value` so that `cleanup` and then the value's own [`Dispose::dispose()`] run
    /// exactly once.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    ///
    /// use event_bridge::Disposable;
    ///
    /// let order = RefCell::new(Vec::new());
    ///
    /// let inner = Disposable::new("file", |_| {
    ///     order.borrow_mut().push("inner");
    ///     Ok(())
    /// });
    /// let outer = Disposable::chained(inner, |_| {
    ///     order.borrow_mut().push("outer");
    ///     Ok(())
    /// });
    ///
    /// outer.dispose().unwrap();
    /// assert_eq!(*order.borrow(), vec!["outer", "inner"]);
    /// ```
    #[must_use]
    pub fn chained(value: T, cleanup: F) -> Self {
        Self::with_prior(value, cleanup, Some(<T as Dispose>::dispose))
    }
}

impl<T, F> Dispose for Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    fn dispose(&self) -> Result<(), CleanupError> {
        Self::dispose(self)
    }
}

impl<T, F> Deref for Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F> Drop for Disposable<T, F>
where
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    fn drop(&mut self) {
        if let Err(error) = Self::dispose(self) {
            warn!(
                value_type = type_name::<T>(),
                %error,
                "cleanup failed while dropping a disposable value"
            );
        }
    }
}

impl<T, F> fmt::Debug for Disposable<T, F>
where
    T: fmt::Debug,
    F: FnOnce(&T) -> Result<(), CleanupError>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("value", &self.value)
            .field("chained", &self.prior.is_some())
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}
