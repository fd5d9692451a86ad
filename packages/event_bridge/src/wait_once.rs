use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::future::FusedFuture;

use crate::{
    CleanupError, Dispose, EventSource, Listener, Normalized, Rejected, Subscription, normalize,
};

/// The result a [`WaitOnce`] future completes with.
pub type WaitOnceResult<A> = Result<Normalized<A>, Rejected<A>>;

/// Waits for the next occurrence of `key` on `source`.
///
/// Returns a future that completes with the normalized arguments of the first occurrence.
/// If `rejects_on_fire` is `true`, the future instead completes with [`Rejected`] carrying
/// those arguments; use this for events that signal failure (e.g. an "error" event).
///
/// The listener is registered with [`EventSource::subscribe_once()`] before this function
/// returns. It is removed by [`WaitOnce::dispose()`] or by dropping the future, whichever
/// comes first; after the event has fired, disposal still unsubscribes (the source treats
/// that as a no-op).
///
/// If the future is disposed before the event fires, it never completes.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use event_bridge::{LocalEmitter, Normalized, wait_once};
/// use futures::executor::block_on;
///
/// let emitter = Rc::new(LocalEmitter::<&str, &str>::new());
/// let closed = wait_once(&emitter, "close", false);
///
/// emitter.emit(&"close", vec!["bye", "for now"]);
///
/// assert_eq!(
///     block_on(closed),
///     Ok(Normalized::Multiple(vec!["bye", "for now"]))
/// );
/// ```
#[must_use]
pub fn wait_once<S>(source: &Rc<S>, key: S::Key, rejects_on_fire: bool) -> WaitOnce<S>
where
    S: EventSource,
    S::Arg: Clone + 'static,
{
    WaitOnce::new(source, key, rejects_on_fire)
}

/// A future that completes when an event occurs once. Created by [`wait_once()`].
///
/// Disposing the future (via [`dispose()`][Self::dispose], [`Dispose`] or by dropping it)
/// removes its listener from the event source. Disposal never completes the future: if the
/// event has not fired yet, the future stays pending forever.
pub struct WaitOnce<S>
where
    S: EventSource,
{
    state: Rc<RefCell<OnceState<S::Arg>>>,
    subscription: Subscription<S>,
}

struct OnceState<A> {
    settlement: Settlement<A>,
    waker: Option<Waker>,

    // Set on disposal. A source may still invoke the listener after that if it captured its
    // listener list before the listener was removed; such invocations are ignored.
    disposed: bool,
}

enum Settlement<A> {
    Pending,
    Settled(WaitOnceResult<A>),
    Completed,
}

impl<S> WaitOnce<S>
where
    S: EventSource,
    S::Arg: Clone + 'static,
{
    fn new(source: &Rc<S>, key: S::Key, rejects_on_fire: bool) -> Self {
        let state = Rc::new(RefCell::new(OnceState {
            settlement: Settlement::Pending,
            waker: None,
            disposed: false,
        }));

        let listener: Listener<S::Arg> = {
            let state = Rc::clone(&state);

            Rc::new(move |args: &[S::Arg]| {
                let waker = {
                    let mut state = state.borrow_mut();

                    // A well-behaved source never invokes a one-shot listener twice but we do
                    // not rely on that: only the first invocation settles the future.
                    if state.disposed || !matches!(state.settlement, Settlement::Pending) {
                        return;
                    }

                    let payload = normalize(args.to_vec());

                    state.settlement = Settlement::Settled(if rejects_on_fire {
                        Err(Rejected::new(payload))
                    } else {
                        Ok(payload)
                    });

                    state.waker.take()
                };

                if let Some(waker) = waker {
                    waker.wake();
                }
            })
        };

        Self {
            state,
            subscription: Subscription::once(source, key, listener),
        }
    }
}

impl<S> WaitOnce<S>
where
    S: EventSource,
{
    /// Removes the listener from the event source, if not already removed.
    ///
    /// Only the first call has an effect. Disposal never settles the future: if the event has
    /// not fired yet, awaiting the future afterwards never completes.
    pub fn dispose(&self) {
        self.state.borrow_mut().disposed = true;
        self.subscription.cancel();
    }

    /// Whether the listener has been removed by disposal.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.subscription.is_cancelled()
    }

    /// Whether the event has fired (whether or not the result has been taken yet).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self.state.borrow().settlement, Settlement::Pending)
    }
}

impl<S> Future for WaitOnce<S>
where
    S: EventSource,
{
    type Output = WaitOnceResult<S::Arg>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();

        match std::mem::replace(&mut state.settlement, Settlement::Completed) {
            Settlement::Settled(result) => Poll::Ready(result),
            Settlement::Pending => {
                state.settlement = Settlement::Pending;

                let stale = state
                    .waker
                    .as_ref()
                    .is_none_or(|existing| !existing.will_wake(cx.waker()));

                if stale {
                    state.waker = Some(cx.waker().clone());
                }

                Poll::Pending
            }
            Settlement::Completed => panic!("WaitOnce polled after completion"),
        }
    }
}

impl<S> FusedFuture for WaitOnce<S>
where
    S: EventSource,
{
    fn is_terminated(&self) -> bool {
        matches!(self.state.borrow().settlement, Settlement::Completed)
    }
}

impl<S> Dispose for WaitOnce<S>
where
    S: EventSource,
{
    fn dispose(&self) -> Result<(), CleanupError> {
        Self::dispose(self);
        Ok(())
    }
}

// We never project pins to any of our fields, so the event key does not need to be `Unpin`.
impl<S> Unpin for WaitOnce<S> where S: EventSource {}

impl<S> fmt::Debug for WaitOnce<S>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("settled", &self.is_settled())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
