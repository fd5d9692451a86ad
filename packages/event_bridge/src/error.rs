use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use thiserror::Error;

use crate::Normalized;

/// A cleanup function failed while disposing of a resource.
///
/// The underlying error is reference-counted so the same failure can be handed to every
/// caller awaiting a shared asynchronous disposal.
///
/// # Example
///
/// ```rust
/// use event_bridge::CleanupError;
///
/// let error = CleanupError::msg("socket already closed");
/// assert_eq!(error.to_string(), "resource cleanup failed: socket already closed");
/// ```
#[derive(Clone, Debug, Error)]
#[error("resource cleanup failed: {reason}")]
pub struct CleanupError {
    reason: Rc<dyn Error>,
}

impl CleanupError {
    /// Wraps an arbitrary error that occurred during cleanup.
    #[must_use]
    pub fn new(reason: impl Error + 'static) -> Self {
        Self {
            reason: Rc::new(reason),
        }
    }

    /// Creates a cleanup error from a human-readable message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        let boxed: Box<dyn Error> = message.into();

        Self {
            reason: Rc::from(boxed),
        }
    }

    /// The error that caused the cleanup to fail.
    #[must_use]
    pub fn reason(&self) -> &(dyn Error + 'static) {
        &*self.reason
    }

    /// Whether two values describe the very same failure (not merely an equal message).
    ///
    /// Every awaiter of a shared asynchronous disposal observes the same failure.
    #[must_use]
    pub fn is_same_failure(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.reason, &other.reason)
    }
}

/// The event a wait-once bridge was waiting for fired, and the bridge was configured to treat
/// that as a failure.
///
/// Carries the normalized arguments the event fired with.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use event_bridge::{LocalEmitter, Normalized, wait_once};
///
/// let emitter = Rc::new(LocalEmitter::<&str, String>::new());
/// let failed = wait_once(&emitter, "error", true);
///
/// emitter.emit(&"error", vec!["connection reset".to_string()]);
///
/// let rejection = futures::executor::block_on(failed).unwrap_err();
/// assert_eq!(
///     rejection.into_payload(),
///     Normalized::Single("connection reset".to_string())
/// );
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rejected<A> {
    payload: Normalized<A>,
}

impl<A> Rejected<A> {
    pub(crate) fn new(payload: Normalized<A>) -> Self {
        Self { payload }
    }

    /// The normalized arguments the event fired with.
    #[must_use]
    pub fn payload(&self) -> &Normalized<A> {
        &self.payload
    }

    /// Consumes the rejection, returning the normalized arguments the event fired with.
    #[must_use]
    pub fn into_payload(self) -> Normalized<A> {
        self.payload
    }
}

impl<A> Display for Rejected<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event fired as a rejection with {} argument(s)",
            self.payload.len()
        )
    }
}

impl<A: Debug> Error for Rejected<A> {}
