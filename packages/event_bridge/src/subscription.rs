use std::rc::Rc;

use tracing::{trace, warn};

use crate::{CleanupError, Disposable, EventSource, Listener};

type Unsubscribe<S> = fn(&Registration<S>) -> Result<(), CleanupError>;

/// A listener registration owned by one bridge.
///
/// The listener is removed from the source exactly once: on the first [`cancel()`] or when the
/// subscription is dropped, whichever comes first.
///
/// [`cancel()`]: Self::cancel
pub(crate) struct Subscription<S>
where
    S: EventSource,
{
    registration: Disposable<Registration<S>, Unsubscribe<S>>,
}

pub(crate) struct Registration<S>
where
    S: EventSource,
{
    source: Rc<S>,
    key: S::Key,
    listener: Listener<S::Arg>,
}

impl<S> Subscription<S>
where
    S: EventSource,
{
    /// Registers `listener` to be invoked every time `key` occurs.
    pub(crate) fn persistent(source: &Rc<S>, key: S::Key, listener: Listener<S::Arg>) -> Self {
        source.subscribe(&key, Rc::clone(&listener));
        trace!("subscribed persistent listener");

        Self::new(source, key, listener)
    }

    /// Registers `listener` to be invoked the next time `key` occurs.
    pub(crate) fn once(source: &Rc<S>, key: S::Key, listener: Listener<S::Arg>) -> Self {
        source.subscribe_once(&key, Rc::clone(&listener));
        trace!("subscribed one-shot listener");

        Self::new(source, key, listener)
    }

    fn new(source: &Rc<S>, key: S::Key, listener: Listener<S::Arg>) -> Self {
        let registration = Registration {
            source: Rc::clone(source),
            key,
            listener,
        };

        Self {
            registration: Disposable::new(registration, unsubscribe::<S> as Unsubscribe<S>),
        }
    }

    /// Removes the listener from the source. Only the first call has an effect.
    pub(crate) fn cancel(&self) {
        if let Err(error) = self.registration.dispose() {
            warn!(%error, "failed to remove listener from event source");
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.registration.is_disposed()
    }
}

fn unsubscribe<S>(registration: &Registration<S>) -> Result<(), CleanupError>
where
    S: EventSource,
{
    registration
        .source
        .unsubscribe(&registration.key, &registration.listener);
    trace!("unsubscribed listener");

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::LocalEmitter;

    fn counting_listener(counter: &Rc<Cell<usize>>) -> Listener<u8> {
        let counter = Rc::clone(counter);
        Rc::new(move |_: &[u8]| counter.set(counter.get() + 1))
    }

    #[test]
    fn cancel_unsubscribes_exactly_once() {
        let emitter = Rc::new(LocalEmitter::<&str, u8>::new());
        let calls = Rc::new(Cell::new(0));

        let subscription = Subscription::persistent(&emitter, "tick", counting_listener(&calls));
        emitter.emit(&"tick", vec![]);

        subscription.cancel();
        subscription.cancel();
        emitter.emit(&"tick", vec![]);

        assert!(subscription.is_cancelled());
        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.listener_count(&"tick"), 0);
    }

    #[test]
    fn cancel_only_removes_own_listener() {
        let emitter = Rc::new(LocalEmitter::<&str, u8>::new());
        let calls = Rc::new(Cell::new(0));

        let first = Subscription::persistent(&emitter, "tick", counting_listener(&calls));
        let _second = Subscription::persistent(&emitter, "tick", counting_listener(&calls));

        first.cancel();
        emitter.emit(&"tick", vec![]);

        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.listener_count(&"tick"), 1);
    }

    #[test]
    fn drop_unsubscribes() {
        let emitter = Rc::new(LocalEmitter::<&str, u8>::new());
        let calls = Rc::new(Cell::new(0));

        drop(Subscription::once(&emitter, "tick", counting_listener(&calls)));

        assert_eq!(emitter.emit(&"tick", vec![]), 0);
        assert_eq!(calls.get(), 0);
    }
}
