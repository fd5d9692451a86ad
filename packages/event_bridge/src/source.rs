use std::rc::Rc;

/// A callback registered with an [`EventSource`].
///
/// Listeners are compared by [`Rc`] pointer identity: to unsubscribe, pass a clone of the
/// same `Rc` that was subscribed.
pub type Listener<A> = Rc<dyn Fn(&[A])>;

/// A callback-driven source of events that the bridges in this package can subscribe to.
///
/// The source decides what arguments each listener invocation carries. All arguments of all
/// events from one source share the element type [`EventSource::Arg`]; use an enum for sources
/// whose events carry different kinds of payload.
///
/// Implementations are single-threaded and may be invoked reentrantly: a listener may call
/// back into the source (for example to unsubscribe itself) while an event is being delivered.
/// The bridges in this package never hold internal borrows while calling into the source.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use event_bridge::{EventSource, LocalEmitter, Listener};
///
/// let emitter = LocalEmitter::<&str, i32>::new();
/// let listener: Listener<i32> = Rc::new(|args: &[i32]| println!("got {args:?}"));
///
/// emitter.subscribe(&"data", Rc::clone(&listener));
/// emitter.emit(&"data", vec![1, 2]);
/// emitter.unsubscribe(&"data", &listener);
/// ```
pub trait EventSource {
    /// Identifies which event a listener is interested in.
    type Key;

    /// The element type of the argument list each listener invocation carries.
    type Arg;

    /// Registers a listener that is invoked at most once, the next time `key` occurs.
    fn subscribe_once(&self, key: &Self::Key, listener: Listener<Self::Arg>);

    /// Registers a listener that is invoked every time `key` occurs.
    fn subscribe(&self, key: &Self::Key, listener: Listener<Self::Arg>);

    /// Removes a previously registered listener for `key`.
    ///
    /// Must be a no-op if the listener was already removed or never registered.
    fn unsubscribe(&self, key: &Self::Key, listener: &Listener<Self::Arg>);
}
