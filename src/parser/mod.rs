//! Incremental, suspendable parsers over chunked byte input (component I).
//!
//! [`json`] and [`xml`] both implement [`IncrementalParser`] and differ only
//! in their state sets; the hard part — resuming a lexer that ran out of
//! input mid-token, across however the caller happens to slice the network
//! stream into chunks — is the same shape for both, grounded in
//! `dmem/json.c`/`dmem/xml.c`'s shared suspend/resume convention (each keeps
//! an explicit state cursor plus per-token partial buffers rather than the
//! non-local jump the original C uses to unwind out of a chunk boundary).
//!
//! A [`ParseError`] is returned by value everywhere a grammar violation or
//! application-callback abort occurs, per the REDESIGN FLAGS in `spec.md`
//! §9 ("Exceptions-for-partial-input → explicit state + return code"): no
//! part of this module ever panics or longjmps out of a callback.

use std::fmt;

pub mod json;
pub mod xml;

/// A parser diagnostic: a 1-based line number and a human-readable message.
///
/// Line numbers count `\n` bytes seen since the parser was created, so they
/// stay meaningful across `parse_chunk` calls regardless of how the input
/// was split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    line: usize,
    message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn callback_abort(line: usize) -> ParseError {
        ParseError::new(line, "callback abort")
    }

    /// The 1-based line the error was detected on.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The diagnostic message, without the line number.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// The contract shared by [`json::Reader`] and [`xml::Reader`].
///
/// A caller feeds chunks via [`IncrementalParser::parse_chunk`] until the
/// document is complete ([`IncrementalParser::parse_complete`] returns
/// `Ok`), an error is returned, or a visitor callback aborts (surfaced the
/// same way as a grammar error, per `spec.md` §7).
pub trait IncrementalParser {
    /// Feeds `bytes` to the parser. Returns the number of bytes consumed
    /// from the front of `bytes` on a clean or suspended parse (this is
    /// always `bytes.len()` for these two grammars — neither ever declines
    /// a suffix of its input — but the return type preserves the contract
    /// described in `spec.md` §4.8 for parsers that do).
    fn parse_chunk(&mut self, bytes: &[u8]) -> Result<usize, ParseError>;

    /// Finalizes the document. `Ok(())` iff a complete, well-formed
    /// document has been seen; `Err` otherwise (including "ran out of
    /// input mid-structure").
    fn parse_complete(&mut self) -> Result<(), ParseError>;

    /// The most recent error, if `parse_chunk`/`parse_complete` returned
    /// one. Once set, a parser never clears it and further `parse_chunk`
    /// calls keep returning the same error (`spec.md` §7: "the caller
    /// discards the parser").
    fn parse_error(&self) -> Option<&ParseError>;
}
