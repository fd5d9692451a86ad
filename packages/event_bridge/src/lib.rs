#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Exactly-once disposal and callback-to-async bridges for single-threaded event sources.
//!
//! Many event sources deliver notifications by invoking registered callbacks. This package
//! converts such sources into the two standard asynchronous consumption patterns:
//!
//! * [`wait_once()`] - wait for exactly one occurrence of an event, as a [`Future`].
//! * [`as_sequence()`] - consume every occurrence of an event, as a pull-based sequence
//!   that also implements [`Stream`][futures::Stream].
//!
//! Both bridges hand back a disposable handle. Disposing the handle (explicitly or by dropping
//! it) removes the listener from the event source exactly once, whichever happens first.
//!
//! The same exactly-once guarantee is available for arbitrary resources through
//! [`Disposable`] (synchronous cleanup) and [`AsyncDisposable`] (asynchronous cleanup with a
//! memoized, shared disposal future).
//!
//! Everything in this package is single-threaded: no type is `Send` or `Sync`, and all
//! bookkeeping happens synchronously inside a listener invocation or a poll.
//!
//! The bridges do not implement an event emitter themselves. They consume any type that
//! implements [`EventSource`]. A simple [`LocalEmitter`] is provided for callers that do not
//! already have one.
//!
//! # Waiting for one event
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use event_bridge::{LocalEmitter, Normalized, wait_once};
//!
//! let emitter = Rc::new(LocalEmitter::<&str, u32>::new());
//! let connected = wait_once(&emitter, "connected", false);
//!
//! emitter.emit(&"connected", vec![7]);
//!
//! let value = futures::executor::block_on(connected).unwrap();
//! assert_eq!(value, Normalized::Single(7));
//! ```
//!
//! # Consuming a sequence of events
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use event_bridge::{LocalEmitter, Normalized, as_sequence};
//!
//! let emitter = Rc::new(LocalEmitter::<&str, u32>::new());
//! let ticks = as_sequence(&emitter, "tick", 16);
//!
//! emitter.emit(&"tick", vec![1]);
//! emitter.emit(&"tick", vec![2, 3]);
//!
//! futures::executor::block_on(async {
//!     assert_eq!(ticks.next().await, Some(Normalized::Single(1)));
//!     assert_eq!(ticks.next().await, Some(Normalized::Multiple(vec![2, 3])));
//! });
//!
//! // Closing the sequence unsubscribes and ends it.
//! ticks.close();
//! assert_eq!(emitter.listener_count(&"tick"), 0);
//! ```
//!
//! # Exactly-once cleanup
//!
//! ```rust
//! use std::cell::Cell;
//!
//! use event_bridge::Disposable;
//!
//! let cleanups = Cell::new(0);
//!
//! let socket = Disposable::new("socket", |_| {
//!     cleanups.set(cleanups.get() + 1);
//!     Ok(())
//! });
//!
//! socket.dispose().unwrap();
//! socket.dispose().unwrap();
//! drop(socket);
//!
//! assert_eq!(cleanups.get(), 1);
//! ```

mod async_disposable;
mod disposable;
mod dispose;
mod emitter;
mod error;
#[cfg(test)]
mod mock_source;
mod normalized;
mod sequence;
mod source;
mod subscription;
mod wait_once;

pub use async_disposable::*;
pub use disposable::*;
pub use dispose::*;
pub use emitter::*;
pub use error::*;
#[cfg(test)]
pub(crate) use mock_source::*;
pub use normalized::*;
pub use sequence::*;
pub use source::*;
pub(crate) use subscription::*;
pub use wait_once::*;
