/// Associates readiness events with [`event::Source`]s.
///
/// `Token` is a wrapper around `usize` and is used as a field in [`Event`] to
/// allow the caller to map a readiness event back to its source. A `Token` is
/// passed to [`Registry::register`] alongside the handle being registered,
/// and the selector hands the same `Token` back in each `Event` it reports
/// for that handle.
///
/// `Token(usize::MAX)` is reserved for internal use and should not be used.
///
/// [`event::Source`]: crate::event::Source
/// [`Event`]: crate::event::Event
/// [`Registry::register`]: crate::Registry::register
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct Token(pub usize);

impl From<Token> for usize {
    fn from(val: Token) -> usize {
        val.0
    }
}

impl From<usize> for Token {
    fn from(val: usize) -> Token {
        Token(val)
    }
}
