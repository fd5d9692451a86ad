/// The shape of the argument list an event listener was invoked with.
///
/// Event sources may invoke listeners with any number of arguments. The bridges collapse the
/// argument list by count (never by type):
///
/// * no arguments - [`Normalized::Empty`]
/// * exactly one argument - [`Normalized::Single`] with that argument
/// * two or more arguments - [`Normalized::Multiple`] with the whole list, in original order
///
/// # Example
///
/// ```rust
/// use event_bridge::{Normalized, normalize};
///
/// assert_eq!(normalize::<u8>(vec![]), Normalized::Empty);
/// assert_eq!(normalize(vec![1]), Normalized::Single(1));
/// assert_eq!(normalize(vec![1, 2]), Normalized::Multiple(vec![1, 2]));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the three shapes are the whole point of the type; callers match on them"
)]
pub enum Normalized<A> {
    /// The listener was invoked without arguments.
    Empty,

    /// The listener was invoked with exactly one argument.
    Single(A),

    /// The listener was invoked with two or more arguments. The list is never shorter than 2.
    Multiple(Vec<A>),
}

/// Collapses a listener argument list into a [`Normalized`] value.
#[must_use]
pub fn normalize<A>(mut args: Vec<A>) -> Normalized<A> {
    if args.len() > 1 {
        return Normalized::Multiple(args);
    }

    args.pop().map_or(Normalized::Empty, Normalized::Single)
}

impl<A> Normalized<A> {
    /// Whether the listener was invoked without arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The number of arguments the listener was invoked with.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Multiple(args) => args.len(),
        }
    }

    /// The sole argument, if the listener was invoked with exactly one.
    #[must_use]
    pub fn as_single(&self) -> Option<&A> {
        match self {
            Self::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Expands the value back into the argument list it was created from.
    #[must_use]
    pub fn into_vec(self) -> Vec<A> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(value) => vec![value],
            Self::Multiple(args) => args,
        }
    }
}

impl<A> From<Vec<A>> for Normalized<A> {
    fn from(args: Vec<A>) -> Self {
        normalize(args)
    }
}
