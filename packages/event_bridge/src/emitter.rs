use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tracing::trace;

use crate::{EventSource, Listener};

/// A single-threaded event emitter keyed by `K`, whose listeners receive `&[A]`.
///
/// This is a minimal [`EventSource`] for callers that do not already have one, and for tests.
/// The bridges in this package work with any `EventSource` implementation.
///
/// Delivery rules:
///
/// * Listeners for a key run in registration order.
/// * The set of listeners is captured when [`emit()`][Self::emit] starts. Listeners added or
///   removed by another listener during delivery take effect from the next `emit()` onwards.
/// * One-shot listeners are removed before they are invoked, so they never run twice even if
///   they emit the same event reentrantly.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use event_bridge::{EventSource, LocalEmitter};
///
/// let emitter = LocalEmitter::<&str, u8>::new();
/// let seen = Rc::new(Cell::new(0));
///
/// let seen_clone = Rc::clone(&seen);
/// emitter.subscribe_once(
///     &"ready",
///     Rc::new(move |_: &[u8]| seen_clone.set(seen_clone.get() + 1)),
/// );
///
/// assert_eq!(emitter.emit(&"ready", vec![]), 1);
/// assert_eq!(emitter.emit(&"ready", vec![]), 0);
/// assert_eq!(seen.get(), 1);
/// ```
pub struct LocalEmitter<K, A> {
    registrations: RefCell<HashMap<K, Vec<Registration<A>>>>,
}

struct Registration<A> {
    listener: Listener<A>,
    once: bool,
}

impl<K, A> LocalEmitter<K, A>
where
    K: Eq + Hash + Clone,
{
    /// Creates an emitter without any listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: RefCell::new(HashMap::new()),
        }
    }

    /// Invokes every listener registered for `key` with `args`.
    ///
    /// Returns the number of listeners that were invoked.
    pub fn emit(&self, key: &K, args: Vec<A>) -> usize {
        let listeners = self.take_delivery_list(key);

        trace!(
            listeners = listeners.len(),
            args = args.len(),
            "emitting event"
        );

        // No borrow of our own state is held here, so listeners may call back into us.
        for listener in &listeners {
            listener(args.as_slice());
        }

        listeners.len()
    }

    /// The number of listeners currently registered for `key`.
    #[must_use]
    pub fn listener_count(&self, key: &K) -> usize {
        self.registrations
            .borrow()
            .get(key)
            .map_or(0, Vec::len)
    }

    fn register(&self, key: &K, listener: Listener<A>, once: bool) {
        self.registrations
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push(Registration { listener, once });
    }

    /// Snapshots the listeners for `key`, removing the one-shot ones from the registry.
    fn take_delivery_list(&self, key: &K) -> Vec<Listener<A>> {
        let mut registrations = self.registrations.borrow_mut();

        let Some(for_key) = registrations.get_mut(key) else {
            return Vec::new();
        };

        let listeners = for_key
            .iter()
            .map(|registration| Rc::clone(&registration.listener))
            .collect();

        for_key.retain(|registration| !registration.once);

        if for_key.is_empty() {
            registrations.remove(key);
        }

        listeners
    }
}

impl<K, A> EventSource for LocalEmitter<K, A>
where
    K: Eq + Hash + Clone,
{
    type Key = K;
    type Arg = A;

    fn subscribe_once(&self, key: &K, listener: Listener<A>) {
        self.register(key, listener, true);
    }

    fn subscribe(&self, key: &K, listener: Listener<A>) {
        self.register(key, listener, false);
    }

    fn unsubscribe(&self, key: &K, listener: &Listener<A>) {
        let mut registrations = self.registrations.borrow_mut();

        let Some(for_key) = registrations.get_mut(key) else {
            return;
        };

        if let Some(index) = for_key
            .iter()
            .position(|registration| Rc::ptr_eq(&registration.listener, listener))
        {
            for_key.remove(index);
        }

        if for_key.is_empty() {
            registrations.remove(key);
        }
    }
}

impl<K, A> Default for LocalEmitter<K, A>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> fmt::Debug for LocalEmitter<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.registrations.borrow();
        let listener_count: usize = registrations.values().map(Vec::len).sum();

        f.debug_struct(type_name::<Self>())
            .field("keys", &registrations.len())
            .field("listeners", &listener_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(LocalEmitter<u8, u8>: Send, Sync);

    fn counting_listener(counter: &Rc<Cell<usize>>) -> Listener<u32> {
        let counter = Rc::clone(counter);
        Rc::new(move |_: &[u32]| counter.set(counter.get() + 1))
    }

    #[test]
    fn persistent_listener_runs_every_time() {
        let emitter = LocalEmitter::<&str, u32>::new();
        let calls = Rc::new(Cell::new(0));

        emitter.subscribe(&"tick", counting_listener(&calls));

        assert_eq!(emitter.emit(&"tick", vec![1]), 1);
        assert_eq!(emitter.emit(&"tick", vec![2]), 1);
        assert_eq!(calls.get(), 2);
        assert_eq!(emitter.listener_count(&"tick"), 1);
    }

    #[test]
    fn once_listener_runs_one_time() {
        let emitter = LocalEmitter::<&str, u32>::new();
        let calls = Rc::new(Cell::new(0));

        emitter.subscribe_once(&"tick", counting_listener(&calls));

        emitter.emit(&"tick", vec![]);
        emitter.emit(&"tick", vec![]);

        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.listener_count(&"tick"), 0);
    }

    #[test]
    fn listeners_only_hear_their_own_key() {
        let emitter = LocalEmitter::<&str, u32>::new();
        let calls = Rc::new(Cell::new(0));

        emitter.subscribe(&"a", counting_listener(&calls));

        assert_eq!(emitter.emit(&"b", vec![1]), 0);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn unsubscribe_removes_by_identity() {
        let emitter = LocalEmitter::<&str, u32>::new();
        let calls = Rc::new(Cell::new(0));

        let first = counting_listener(&calls);
        let second = counting_listener(&calls);
        emitter.subscribe(&"tick", Rc::clone(&first));
        emitter.subscribe(&"tick", Rc::clone(&second));

        emitter.unsubscribe(&"tick", &first);
        emitter.emit(&"tick", vec![]);

        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.listener_count(&"tick"), 1);
    }

    #[test]
    fn unsubscribe_unknown_listener_is_noop() {
        let emitter = LocalEmitter::<&str, u32>::new();
        let calls = Rc::new(Cell::new(0));
        let never_added = counting_listener(&calls);

        emitter.unsubscribe(&"tick", &never_added);
        emitter.subscribe(&"tick", counting_listener(&calls));
        emitter.unsubscribe(&"tick", &never_added);

        assert_eq!(emitter.listener_count(&"tick"), 1);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_emit() {
        let emitter = Rc::new(LocalEmitter::<&str, u32>::new());
        let calls = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<Listener<u32>>>> = Rc::new(RefCell::new(None));

        let listener: Listener<u32> = {
            let emitter = Rc::clone(&emitter);
            let calls = Rc::clone(&calls);
            let slot = Rc::clone(&slot);
            Rc::new(move |_: &[u32]| {
                calls.set(calls.get() + 1);
                if let Some(me) = slot.borrow().as_ref() {
                    emitter.unsubscribe(&"tick", me);
                }
            })
        };
        *slot.borrow_mut() = Some(Rc::clone(&listener));
        emitter.subscribe(&"tick", listener);

        emitter.emit(&"tick", vec![]);
        emitter.emit(&"tick", vec![]);

        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.listener_count(&"tick"), 0);

        // Break the reference cycle between the listener and its slot.
        slot.borrow_mut().take();
    }

    #[test]
    fn debug_output_is_not_empty() {
        let emitter = LocalEmitter::<&str, u32>::new();
        assert!(!format!("{emitter:?}").is_empty());
    }
}
