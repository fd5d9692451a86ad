//! Pull-based asynchronous sequences of events.
//!
//! The listener pushes normalized values into a bounded buffer; consumers pull them out.
//! Consumers that pull while the buffer is empty are queued as waiters. After every push and
//! every pull, values and waiters are paired off oldest-to-oldest until one of the two queues
//! is empty, so at rest at most one of them holds anything.

use std::any::type_name;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Stream;
use futures::future::FusedFuture;
use futures::stream::FusedStream;
use tracing::{debug, trace};

use crate::{CleanupError, Dispose, EventSource, Listener, Normalized, Subscription, normalize};

/// How many events an [`EventSequence`] buffers by default before it starts dropping the
/// oldest ones.
pub const DEFAULT_MAX_BUFFER: usize = 100;

/// Subscribes to every occurrence of `key` on `source` and exposes the occurrences as a
/// pull-based asynchronous sequence.
///
/// Up to `max_buffer` values that nobody has pulled yet are kept; when another one arrives,
/// the oldest is dropped. With `max_buffer == 0`, nothing is kept: a value is delivered only if
/// a pull is already waiting for it and is discarded otherwise.
///
/// The listener is registered before this function returns and is removed when the sequence
/// is closed or dropped.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use event_bridge::{LocalEmitter, Normalized, as_sequence};
/// use futures::executor::block_on;
///
/// let emitter = Rc::new(LocalEmitter::<&str, u32>::new());
/// let readings = as_sequence(&emitter, "reading", 2);
///
/// for reading in 1..=4 {
///     emitter.emit(&"reading", vec![reading]);
/// }
///
/// // Only the two newest readings were kept.
/// block_on(async {
///     assert_eq!(readings.next().await, Some(Normalized::Single(3)));
///     assert_eq!(readings.next().await, Some(Normalized::Single(4)));
/// });
/// ```
#[must_use]
pub fn as_sequence<S>(source: &Rc<S>, key: S::Key, max_buffer: usize) -> EventSequence<S>
where
    S: EventSource,
    S::Arg: Clone + 'static,
{
    EventSequence::new(source, key, max_buffer)
}

/// Configures and creates an [`EventSequence`]. Created by [`EventSequence::builder()`].
pub struct SequenceBuilder<S>
where
    S: EventSource,
{
    source: Rc<S>,
    key: S::Key,
    max_buffer: usize,
}

impl<S> SequenceBuilder<S>
where
    S: EventSource,
    S::Arg: Clone + 'static,
{
    /// Sets how many unconsumed values to keep before dropping the oldest.
    ///
    /// Defaults to [`DEFAULT_MAX_BUFFER`]. Zero means values are only delivered to pulls that
    /// are already waiting.
    #[must_use]
    pub fn max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Subscribes to the event source and returns the sequence.
    #[must_use]
    pub fn build(self) -> EventSequence<S> {
        EventSequence::new(&self.source, self.key, self.max_buffer)
    }
}

impl<S> fmt::Debug for SequenceBuilder<S>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("max_buffer", &self.max_buffer)
            .finish_non_exhaustive()
    }
}

/// An unbounded, pull-based sequence of the occurrences of one event. Created by
/// [`as_sequence()`] or [`EventSequence::builder()`].
///
/// Values are pulled with [`next()`][Self::next] or through the [`Stream`] implementation.
/// Each pull yields the oldest value not yet pulled, or waits for the next occurrence if there
/// is none. Concurrent pulls are served in the order they started waiting.
///
/// The sequence never ends on its own. After [`close()`][Self::close] (or
/// [`dispose()`][Self::dispose]) every waiting pull and every later pull yields `None`, buffered
/// values are discarded and the listener is removed from the source. Dropping the sequence
/// closes it.
///
/// Dropping a [`Next`] future that is waiting gives up its place in the queue. If a value had
/// already been handed to it, the value goes back to the front of the buffer.
pub struct EventSequence<S>
where
    S: EventSource,
{
    state: Rc<RefCell<SequenceState<S::Arg>>>,
    subscription: Subscription<S>,

    // The pull started by `Stream::poll_next()` that is still waiting, if any.
    stream_pull: Option<Rc<Pull<S::Arg>>>,
}

impl<S> EventSequence<S>
where
    S: EventSource,
    S::Arg: Clone + 'static,
{
    /// Starts configuring a sequence of the occurrences of `key` on `source`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::rc::Rc;
    ///
    /// use event_bridge::{EventSequence, LocalEmitter};
    ///
    /// let emitter = Rc::new(LocalEmitter::<&str, u8>::new());
    /// let clicks = EventSequence::builder(&emitter, "click")
    ///     .max_buffer(0)
    ///     .build();
    ///
    /// // Nobody is waiting yet, so this click is dropped.
    /// emitter.emit(&"click", vec![1]);
    /// assert_eq!(clicks.buffered_len(), 0);
    /// ```
    #[must_use]
    pub fn builder(source: &Rc<S>, key: S::Key) -> SequenceBuilder<S> {
        SequenceBuilder {
            source: Rc::clone(source),
            key,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    fn new(source: &Rc<S>, key: S::Key, max_buffer: usize) -> Self {
        let state = Rc::new(RefCell::new(SequenceState {
            buffer: VecDeque::new(),
            waiters: VecDeque::new(),
            max_buffer,
            closed: false,
        }));

        let listener: Listener<S::Arg> = {
            let state = Rc::clone(&state);

            Rc::new(move |args: &[S::Arg]| {
                let wakers = state.borrow_mut().push(normalize(args.to_vec()));
                wake_all(wakers);
            })
        };

        Self {
            state,
            subscription: Subscription::persistent(source, key, listener),
            stream_pull: None,
        }
    }
}

impl<S> EventSequence<S>
where
    S: EventSource,
{
    /// Pulls the next value.
    ///
    /// Completes immediately if a value is buffered or the sequence is closed. Otherwise waits
    /// for the next occurrence of the event, or for the sequence to be closed, in which case it
    /// completes with `None`.
    pub fn next(&self) -> Next<'_, S> {
        Next {
            sequence: self,
            pull: None,
            completed: false,
        }
    }

    /// Ends the sequence and removes the listener from the event source.
    ///
    /// Every waiting pull completes with `None`, in the order the pulls started waiting.
    /// Buffered values are discarded. Only the first call has an effect.
    pub fn close(&self) {
        let wakers = self.state.borrow_mut().close();

        if let Some(wakers) = wakers {
            debug!(woken_pulls = wakers.len(), "event sequence closed");

            self.subscription.cancel();
            wake_all(wakers);
        }
    }

    /// Same as [`close()`][Self::close].
    pub fn dispose(&self) {
        self.close();
    }

    /// Whether the sequence has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// The number of values waiting to be pulled.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    /// The number of pulls waiting for a value.
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.state.borrow().waiters.len()
    }

    /// How many unconsumed values are kept before the oldest is dropped.
    #[must_use]
    pub fn max_buffer(&self) -> usize {
        self.state.borrow().max_buffer
    }
}

impl<S> Stream for EventSequence<S>
where
    S: EventSource,
{
    type Item = Normalized<S::Arg>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        poll_pull(&this.state, &mut this.stream_pull, cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let state = self.state.borrow();

        if state.closed {
            (0, Some(0))
        } else {
            (state.buffer.len(), None)
        }
    }
}

impl<S> FusedStream for EventSequence<S>
where
    S: EventSource,
{
    fn is_terminated(&self) -> bool {
        self.is_closed()
    }
}

impl<S> Dispose for EventSequence<S>
where
    S: EventSource,
{
    fn dispose(&self) -> Result<(), CleanupError> {
        self.close();
        Ok(())
    }
}

impl<S> Drop for EventSequence<S>
where
    S: EventSource,
{
    fn drop(&mut self) {
        if let Some(pull) = self.stream_pull.take() {
            cancel_pull(&self.state, &pull);
        }

        self.close();
    }
}

// We never project pins to any of our fields, so the event key does not need to be `Unpin`.
impl<S> Unpin for EventSequence<S> where S: EventSource {}

impl<S> fmt::Debug for EventSequence<S>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();

        f.debug_struct(type_name::<Self>())
            .field("buffered", &state.buffer.len())
            .field("waiting", &state.waiters.len())
            .field("max_buffer", &state.max_buffer)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

/// A future that pulls one value from an [`EventSequence`]. Created by
/// [`EventSequence::next()`].
///
/// Completes with `None` once the sequence is closed. Each `Next` takes at most one value;
/// polling it again after it has completed panics.
pub struct Next<'a, S>
where
    S: EventSource,
{
    sequence: &'a EventSequence<S>,

    // Our place in the waiter queue, once we have had to wait.
    pull: Option<Rc<Pull<S::Arg>>>,

    completed: bool,
}

impl<S> Future for Next<'_, S>
where
    S: EventSource,
{
    type Output = Option<Normalized<S::Arg>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        assert!(!this.completed, "event sequence pull polled after completion");

        let poll = poll_pull(&this.sequence.state, &mut this.pull, cx);

        if poll.is_ready() {
            this.completed = true;
        }

        poll
    }
}

impl<S> FusedFuture for Next<'_, S>
where
    S: EventSource,
{
    fn is_terminated(&self) -> bool {
        self.completed
    }
}

impl<S> Drop for Next<'_, S>
where
    S: EventSource,
{
    fn drop(&mut self) {
        if let Some(pull) = self.pull.take() {
            cancel_pull(&self.sequence.state, &pull);
        }
    }
}

impl<S> fmt::Debug for Next<'_, S>
where
    S: EventSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("waiting", &self.pull.is_some())
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

struct SequenceState<A> {
    buffer: VecDeque<Normalized<A>>,
    waiters: VecDeque<Rc<Pull<A>>>,
    max_buffer: usize,
    closed: bool,
}

impl<A> SequenceState<A> {
    /// Accepts a value from the listener. Returns the wakers of any pulls it satisfied.
    fn push(&mut self, value: Normalized<A>) -> Vec<Waker> {
        if self.closed {
            return Vec::new();
        }

        if self.max_buffer == 0 {
            if self.waiters.is_empty() {
                trace!("no pull is waiting; discarding event");
                return Vec::new();
            }

            // Staged only until the pairing step below hands it to the oldest waiter.
            self.buffer.push_back(value);
        } else {
            self.buffer.push_back(value);

            if self.buffer.len() > self.max_buffer {
                self.buffer.pop_front();
                trace!(max_buffer = self.max_buffer, "buffer full; dropped oldest event");
            }
        }

        self.pair()
    }

    /// Returns a value that was handed to a pull which then gave up before taking it.
    fn requeue(&mut self, value: Normalized<A>) -> Vec<Waker> {
        if self.closed {
            return Vec::new();
        }

        if self.max_buffer == 0 && self.waiters.is_empty() {
            trace!("no pull is waiting; discarding returned event");
            return Vec::new();
        }

        self.buffer.push_front(value);

        if self.max_buffer > 0 && self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
            trace!(max_buffer = self.max_buffer, "buffer full; dropped returned event");
        }

        self.pair()
    }

    /// Hands buffered values to waiting pulls, oldest to oldest, until either side runs out.
    fn pair(&mut self) -> Vec<Waker> {
        let mut wakers = Vec::new();

        while !self.closed && !self.buffer.is_empty() && !self.waiters.is_empty() {
            if let (Some(value), Some(pull)) = (self.buffer.pop_front(), self.waiters.pop_front())
                && let Some(waker) = pull.fulfil(Some(value))
            {
                wakers.push(waker);
            }
        }

        wakers
    }

    /// Returns `None` if already closed, otherwise the wakers of every pull that was waiting.
    fn close(&mut self) -> Option<Vec<Waker>> {
        if mem::replace(&mut self.closed, true) {
            return None;
        }

        self.buffer.clear();

        Some(
            self.waiters
                .drain(..)
                .filter_map(|pull| pull.fulfil(None))
                .collect(),
        )
    }
}

/// One pull that found the buffer empty and had to wait.
struct Pull<A> {
    state: RefCell<PullState<A>>,
}

enum PullState<A> {
    Waiting(Waker),

    // `None` is the end of the sequence.
    Fulfilled(Option<Normalized<A>>),

    Taken,
}

impl<A> Pull<A> {
    fn new(waker: Waker) -> Self {
        Self {
            state: RefCell::new(PullState::Waiting(waker)),
        }
    }

    /// Hands the pull its result. Returns the waker to wake once no borrows are held.
    fn fulfil(&self, item: Option<Normalized<A>>) -> Option<Waker> {
        match mem::replace(&mut *self.state.borrow_mut(), PullState::Fulfilled(item)) {
            PullState::Waiting(waker) => Some(waker),
            PullState::Fulfilled(_) | PullState::Taken => {
                unreachable!("a pull is removed from the waiter queue when it is fulfilled")
            }
        }
    }

    fn poll(&self, waker: &Waker) -> Poll<Option<Normalized<A>>> {
        let mut state = self.state.borrow_mut();

        if let PullState::Waiting(existing) = &mut *state {
            if !existing.will_wake(waker) {
                existing.clone_from(waker);
            }

            return Poll::Pending;
        }

        match mem::replace(&mut *state, PullState::Taken) {
            PullState::Fulfilled(item) => Poll::Ready(item),
            PullState::Taken => panic!("event sequence pull polled after completion"),
            PullState::Waiting(_) => unreachable!(),
        }
    }

    /// The value handed to this pull, if it was fulfilled with one that was never taken.
    fn take_undelivered(&self) -> Option<Normalized<A>> {
        match mem::replace(&mut *self.state.borrow_mut(), PullState::Taken) {
            PullState::Fulfilled(item) => item,
            PullState::Waiting(_) | PullState::Taken => None,
        }
    }
}

fn poll_pull<A>(
    state: &RefCell<SequenceState<A>>,
    pull: &mut Option<Rc<Pull<A>>>,
    cx: &mut Context<'_>,
) -> Poll<Option<Normalized<A>>> {
    if let Some(waiting) = pull.as_ref() {
        let poll = waiting.poll(cx.waker());

        if poll.is_ready() {
            *pull = None;
        }

        return poll;
    }

    let mut sequence = state.borrow_mut();

    if sequence.closed {
        return Poll::Ready(None);
    }

    if let Some(value) = sequence.buffer.pop_front() {
        return Poll::Ready(Some(value));
    }

    let waiting = Rc::new(Pull::new(cx.waker().clone()));
    sequence.waiters.push_back(Rc::clone(&waiting));
    *pull = Some(waiting);

    Poll::Pending
}

/// Withdraws a pull that is being dropped before it completed.
fn cancel_pull<A>(state: &RefCell<SequenceState<A>>, pull: &Rc<Pull<A>>) {
    let wakers = {
        let mut sequence = state.borrow_mut();

        if let Some(position) = sequence
            .waiters
            .iter()
            .position(|waiting| Rc::ptr_eq(waiting, pull))
        {
            sequence.waiters.remove(position);
            return;
        }

        match pull.take_undelivered() {
            Some(value) => sequence.requeue(value),
            None => return,
        }
    };

    wake_all(wakers);
}

fn wake_all(wakers: Vec<Waker>) {
    for waker in wakers {
        waker.wake();
    }
}
