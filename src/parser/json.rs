//! Incremental JSON reader and streaming writer.
//!
//! Grounded in `dmem/json.c`. `Reader` is a SAX-style, suspendable lexer:
//! every structural event (object/array start/end, key, string, number,
//! boolean, null) is delivered to a [`Visitor`] as soon as it is lexed, and
//! the lexer's state — cursor plus partial token buffers — survives however
//! the caller happens to split the input into chunks (`spec.md` §8,
//! property 6, "Parser idempotence over chunking").
//!
//! `Writer` is the streaming serializer from `dj_Builder` in the same file;
//! `spec.md` only specifies the reader, but the original ships both behind
//! one escape table, so it is added here per `SPEC_FULL.md` §B.

use super::ParseError;
use crate::parser::IncrementalParser;

use std::fmt;
use std::io::{self, Write};

/// Receives structural events as a [`Reader`] lexes them.
///
/// Every method defaults to a no-op returning `true` ("keep going"); a
/// visitor overrides only the events it cares about. Returning `false` from
/// any method aborts the parse with a "callback abort" [`ParseError`],
/// matching `spec.md` §4.8's "delegate returns a boolean; false is an
/// abort".
#[allow(unused_variables)]
pub trait Visitor {
    /// `{` was lexed.
    fn object_start(&mut self) -> bool {
        true
    }
    /// The matching `}` was lexed.
    fn object_end(&mut self) -> bool {
        true
    }
    /// `[` was lexed.
    fn array_start(&mut self) -> bool {
        true
    }
    /// The matching `]` was lexed.
    fn array_end(&mut self) -> bool {
        true
    }
    /// An object member's key string completed.
    fn key(&mut self, key: &str) -> bool {
        true
    }
    /// A string value completed (not a key — see [`Visitor::key`]).
    fn string(&mut self, value: &str) -> bool {
        true
    }
    /// A number value completed, already converted from its decimal text.
    fn number(&mut self, value: f64) -> bool {
        true
    }
    /// `true` or `false` was lexed.
    fn boolean(&mut self, value: bool) -> bool {
        true
    }
    /// `null` was lexed.
    fn null(&mut self) -> bool {
        true
    }
}

/// A scope entry: which bracket is currently open, and whether no member or
/// element has been read yet inside it.
///
/// The `first` flag is what lets `ValueBegin`/`ObjectNext` tell an *empty*
/// `{}`/`[]` (closing bracket legal) apart from one reached by a trailing
/// comma (closing bracket illegal — `spec.md` §1's "no trailing commas").
enum Scope {
    Object { first: bool },
    Array { first: bool },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NumPart {
    Sign,
    IntZero,
    IntDigits,
    Dot,
    FracDigits,
    ExpStart,
    ExpSign,
    ExpDigits,
}

impl NumPart {
    fn is_acceptor(self) -> bool {
        matches!(
            self,
            NumPart::IntZero | NumPart::IntDigits | NumPart::FracDigits | NumPart::ExpDigits
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TokenKind {
    True,
    False,
    Null,
}

impl TokenKind {
    fn literal(self) -> &'static [u8] {
        match self {
            TokenKind::True => b"true",
            TokenKind::False => b"false",
            TokenKind::Null => b"null",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StringEscape {
    None,
    Backslash,
    /// Collecting a `\uXXXX` escape: digits seen so far, value so far.
    Unicode(u8, u32),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    /// Expect either the first `0xEF` byte of a leading BOM or the start of
    /// a value. Only reachable before any byte has been consumed.
    Bom0,
    Bom2,
    Bom3,
    ValueBegin,
    /// After a value: expect `,`/closing-bracket for the current scope, or
    /// (with an empty scope stack) nothing but trailing whitespace.
    Next,
    /// After `{` or `,` inside an object: expect a key string or `}`.
    ObjectNext,
    KeyString,
    ObjectColon,
    ValueString,
    ValueNumber,
    ValueToken,
    /// A complete, well-formed document has been seen; only whitespace is
    /// legal from here on.
    Done,
}

/// An incremental JSON reader driving a [`Visitor`].
///
/// See the module documentation and `spec.md` §4.8/§6 for the grammar and
/// suspension contract.
pub struct Reader<V> {
    visitor: V,
    state: State,
    scopes: Vec<Scope>,
    /// Raw text of the string/number currently being lexed, or the decoded
    /// bytes of a string value (escapes already resolved to UTF-8).
    partial: Vec<u8>,
    string_escape: StringEscape,
    pending_high_surrogate: Option<u16>,
    num_part: NumPart,
    token_kind: Option<TokenKind>,
    token_matched: usize,
    line: usize,
    error: Option<ParseError>,
}

impl<V: Visitor> Reader<V> {
    /// Creates a reader that will deliver events to `visitor`.
    pub fn new(visitor: V) -> Reader<V> {
        Reader {
            visitor,
            state: State::Bom0,
            scopes: Vec::new(),
            partial: Vec::new(),
            string_escape: StringEscape::None,
            pending_high_surrogate: None,
            num_part: NumPart::Sign,
            token_kind: None,
            token_matched: 0,
            line: 1,
            error: None,
        }
    }

    /// Consumes the reader, returning the visitor it was driving.
    pub fn into_visitor(self) -> V {
        self.visitor
    }

    fn err(&mut self, message: impl Into<String>) -> ParseError {
        let e = ParseError::new(self.line, message);
        self.error = Some(e.clone());
        e
    }

    fn is_ws(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\n' | b'\r')
    }

    fn bump_line(&mut self, b: u8) {
        if b == b'\n' {
            self.line += 1;
        }
    }

    /// Marks the value that just completed as finished: pops to whatever
    /// scope (if any) now contains it, and flags the document done if the
    /// scope stack is empty.
    fn finish_value(&mut self) {
        self.state = if self.scopes.is_empty() {
            State::Done
        } else {
            State::Next
        };
    }

    fn finish_string_value(&mut self, is_key: bool) -> Result<bool, ParseError> {
        if self.pending_high_surrogate.is_some() {
            return Err(self.err("unpaired UTF-16 surrogate in string"));
        }
        let text = String::from_utf8(std::mem::take(&mut self.partial))
            .map_err(|_| self.err("invalid UTF-8 in string"))?;
        let ok = if is_key {
            self.state = State::ObjectColon;
            self.visitor.key(&text)
        } else {
            self.finish_value();
            self.visitor.string(&text)
        };
        Ok(ok)
    }

    fn append_codepoint(&mut self, cp: u32) {
        match char::from_u32(cp) {
            Some(c) => {
                let mut buf = [0u8; 4];
                self.partial.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            None => {
                let mut buf = [0u8; 4];
                self.partial
                    .extend_from_slice('\u{FFFD}'.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    fn finish_number(&mut self) -> Result<bool, ParseError> {
        let text = std::str::from_utf8(&self.partial).expect("number text is ASCII");
        let value: f64 = text
            .parse()
            .map_err(|_| ParseError::new(self.line, "malformed number"))?;
        if value.is_infinite() {
            return Err(self.err("number exponent overflow"));
        }
        self.partial.clear();
        self.finish_value();
        Ok(self.visitor.number(value))
    }

    fn finish_token(&mut self) -> Result<bool, ParseError> {
        let kind = self.token_kind.take().expect("finish_token without a token in progress");
        self.finish_value();
        Ok(match kind {
            TokenKind::True => self.visitor.boolean(true),
            TokenKind::False => self.visitor.boolean(false),
            TokenKind::Null => self.visitor.null(),
        })
    }

    /// Processes exactly one byte, possibly re-entering for a byte that
    /// turned out to terminate the previous token (numbers/tokens) rather
    /// than extend it. Returns `Ok(true)` to continue, `Ok(false)` if `b`
    /// still needs processing in the new state (caller loops).
    fn step(&mut self, b: u8) -> Result<(), ParseError> {
        loop {
            match self.state {
                State::Bom0 => {
                    if b == 0xEF {
                        self.state = State::Bom2;
                        return Ok(());
                    }
                    self.state = State::ValueBegin;
                    continue;
                }
                State::Bom2 => {
                    if b == 0xBB {
                        self.state = State::Bom3;
                        return Ok(());
                    }
                    return Err(self.err("malformed UTF-8 BOM"));
                }
                State::Bom3 => {
                    if b == 0xBF {
                        self.state = State::ValueBegin;
                        return Ok(());
                    }
                    return Err(self.err("malformed UTF-8 BOM"));
                }

                State::ValueBegin => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    match b {
                        b'{' => {
                            self.scopes.push(Scope::Object { first: true });
                            let ok = self.visitor.object_start();
                            self.state = State::ObjectNext;
                            if !ok {
                                return Err(self.err("callback abort"));
                            }
                            return Ok(());
                        }
                        b'[' => {
                            self.scopes.push(Scope::Array { first: true });
                            let ok = self.visitor.array_start();
                            if !ok {
                                return Err(self.err("callback abort"));
                            }
                            return Ok(());
                        }
                        b']' => {
                            let closable = matches!(
                                self.scopes.last(),
                                Some(Scope::Array { first: true })
                            );
                            if !closable {
                                return Err(self.err("unexpected ']'"));
                            }
                            self.scopes.pop();
                            let ok = self.visitor.array_end();
                            self.finish_value();
                            if !ok {
                                return Err(self.err("callback abort"));
                            }
                            return Ok(());
                        }
                        b'"' => {
                            self.partial.clear();
                            self.string_escape = StringEscape::None;
                            self.state = State::ValueString;
                            return Ok(());
                        }
                        b'-' | b'0'..=b'9' => {
                            self.partial.clear();
                            self.partial.push(b);
                            self.num_part = if b == b'-' {
                                NumPart::Sign
                            } else if b == b'0' {
                                NumPart::IntZero
                            } else {
                                NumPart::IntDigits
                            };
                            self.state = State::ValueNumber;
                            return Ok(());
                        }
                        b't' => {
                            self.token_kind = Some(TokenKind::True);
                            self.token_matched = 1;
                            self.state = State::ValueToken;
                            return Ok(());
                        }
                        b'f' => {
                            self.token_kind = Some(TokenKind::False);
                            self.token_matched = 1;
                            self.state = State::ValueToken;
                            return Ok(());
                        }
                        b'n' => {
                            self.token_kind = Some(TokenKind::Null);
                            self.token_matched = 1;
                            self.state = State::ValueToken;
                            return Ok(());
                        }
                        _ => return Err(self.err("unexpected character in value")),
                    }
                }

                State::Next => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    match self.scopes.last_mut() {
                        None => return Err(self.err("unexpected trailing data after document")),
                        Some(Scope::Array { first }) => match b {
                            b',' => {
                                *first = false;
                                self.state = State::ValueBegin;
                                return Ok(());
                            }
                            b']' => {
                                self.scopes.pop();
                                let ok = self.visitor.array_end();
                                self.finish_value();
                                if !ok {
                                    return Err(self.err("callback abort"));
                                }
                                return Ok(());
                            }
                            _ => return Err(self.err("expected ',' or ']'")),
                        },
                        Some(Scope::Object { first }) => match b {
                            b',' => {
                                *first = false;
                                self.state = State::ObjectNext;
                                return Ok(());
                            }
                            b'}' => {
                                self.scopes.pop();
                                let ok = self.visitor.object_end();
                                self.finish_value();
                                if !ok {
                                    return Err(self.err("callback abort"));
                                }
                                return Ok(());
                            }
                            _ => return Err(self.err("expected ',' or '}'")),
                        },
                    }
                }

                State::ObjectNext => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    match b {
                        b'"' => {
                            self.partial.clear();
                            self.string_escape = StringEscape::None;
                            self.state = State::KeyString;
                            return Ok(());
                        }
                        b'}' => {
                            let closable = matches!(
                                self.scopes.last(),
                                Some(Scope::Object { first: true })
                            );
                            if !closable {
                                return Err(self.err("expected string key"));
                            }
                            self.scopes.pop();
                            let ok = self.visitor.object_end();
                            self.finish_value();
                            if !ok {
                                return Err(self.err("callback abort"));
                            }
                            return Ok(());
                        }
                        _ => return Err(self.err("expected string key or '}'")),
                    }
                }

                State::ObjectColon => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    if b == b':' {
                        if let Some(Scope::Object { first }) = self.scopes.last_mut() {
                            *first = false;
                        }
                        self.state = State::ValueBegin;
                        return Ok(());
                    }
                    return Err(self.err("expected ':'"));
                }

                State::KeyString | State::ValueString => {
                    let is_key = self.state == State::KeyString;
                    match self.string_escape {
                        StringEscape::None => {
                            if b == b'"' {
                                let ok = self.finish_string_value(is_key)?;
                                if !ok {
                                    return Err(self.err("callback abort"));
                                }
                                return Ok(());
                            }
                            if b == b'\\' {
                                self.string_escape = StringEscape::Backslash;
                                return Ok(());
                            }
                            if b < 0x20 {
                                return Err(self.err("control character in string"));
                            }
                            self.partial.push(b);
                            return Ok(());
                        }
                        StringEscape::Backslash => {
                            self.string_escape = StringEscape::None;
                            match b {
                                b'"' => self.partial.push(b'"'),
                                b'\\' => self.partial.push(b'\\'),
                                b'/' => self.partial.push(b'/'),
                                b'b' => self.partial.push(0x08),
                                b'f' => self.partial.push(0x0C),
                                b'n' => self.partial.push(b'\n'),
                                b't' => self.partial.push(b'\t'),
                                b'r' => self.partial.push(b'\r'),
                                b'u' => {
                                    self.string_escape = StringEscape::Unicode(0, 0);
                                }
                                _ => return Err(self.err("invalid escape sequence")),
                            }
                            return Ok(());
                        }
                        StringEscape::Unicode(digits, value) => {
                            let nibble = match b {
                                b'0'..=b'9' => b - b'0',
                                b'a'..=b'f' => b - b'a' + 10,
                                b'A'..=b'F' => b - b'A' + 10,
                                _ => return Err(self.err("invalid \\u escape")),
                            } as u32;
                            let value = (value << 4) | nibble;
                            if digits + 1 < 4 {
                                self.string_escape = StringEscape::Unicode(digits + 1, value);
                                return Ok(());
                            }
                            self.string_escape = StringEscape::None;

                            if let Some(high) = self.pending_high_surrogate.take() {
                                if (0xDC00..=0xDFFF).contains(&value) {
                                    let cp = 0x10000
                                        + (((high as u32 - 0xD800) << 10) | (value - 0xDC00));
                                    self.append_codepoint(cp);
                                } else {
                                    return Err(self.err("invalid low surrogate in \\u escape pair"));
                                }
                            } else if (0xD800..=0xDBFF).contains(&value) {
                                self.pending_high_surrogate = Some(value as u16);
                            } else if (0xDC00..=0xDFFF).contains(&value) {
                                return Err(self.err("lone low surrogate in \\u escape"));
                            } else {
                                self.append_codepoint(value);
                            }
                            return Ok(());
                        }
                    }
                }

                State::ValueNumber => {
                    let next_part = match self.num_part {
                        NumPart::Sign => match b {
                            b'0' => Some(NumPart::IntZero),
                            b'1'..=b'9' => Some(NumPart::IntDigits),
                            _ => return Err(self.err("expected digit after '-'")),
                        },
                        NumPart::IntZero | NumPart::IntDigits => match b {
                            b'0'..=b'9' if self.num_part == NumPart::IntDigits => {
                                Some(NumPart::IntDigits)
                            }
                            b'0'..=b'9' => return Err(self.err("invalid leading zero")),
                            b'.' => Some(NumPart::Dot),
                            b'e' | b'E' => Some(NumPart::ExpStart),
                            _ => None,
                        },
                        NumPart::Dot => match b {
                            b'0'..=b'9' => Some(NumPart::FracDigits),
                            _ => return Err(self.err("expected digit after '.'")),
                        },
                        NumPart::FracDigits => match b {
                            b'0'..=b'9' => Some(NumPart::FracDigits),
                            b'e' | b'E' => Some(NumPart::ExpStart),
                            _ => None,
                        },
                        NumPart::ExpStart => match b {
                            b'+' | b'-' => Some(NumPart::ExpSign),
                            b'0'..=b'9' => Some(NumPart::ExpDigits),
                            _ => return Err(self.err("expected digit in exponent")),
                        },
                        NumPart::ExpSign => match b {
                            b'0'..=b'9' => Some(NumPart::ExpDigits),
                            _ => return Err(self.err("expected digit in exponent")),
                        },
                        NumPart::ExpDigits => match b {
                            b'0'..=b'9' => Some(NumPart::ExpDigits),
                            _ => None,
                        },
                    };

                    match next_part {
                        Some(part) => {
                            self.num_part = part;
                            self.partial.push(b);
                            return Ok(());
                        }
                        None => {
                            debug_assert!(self.num_part.is_acceptor());
                            let ok = self.finish_number()?;
                            if !ok {
                                return Err(self.err("callback abort"));
                            }
                            continue;
                        }
                    }
                }

                State::ValueToken => {
                    let kind = self.token_kind.expect("ValueToken state without a token kind");
                    let literal = kind.literal();
                    if self.token_matched < literal.len() {
                        if b == literal[self.token_matched] {
                            self.token_matched += 1;
                            return Ok(());
                        }
                        return Err(self.err("invalid literal"));
                    }
                    let ok = self.finish_token()?;
                    if !ok {
                        return Err(self.err("callback abort"));
                    }
                    continue;
                }

                State::Done => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    return Err(self.err("unexpected trailing data after document"));
                }
            }
        }
    }
}

impl<V: Visitor> IncrementalParser for Reader<V> {
    fn parse_chunk(&mut self, bytes: &[u8]) -> Result<usize, ParseError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        for (i, &b) in bytes.iter().enumerate() {
            if let Err(e) = self.step(b) {
                return Err(e);
            }
            self.bump_line(b);
            let _ = i;
        }
        Ok(bytes.len())
    }

    fn parse_complete(&mut self) -> Result<(), ParseError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if matches!(self.state, State::ValueNumber | State::ValueToken) {
            self.step(b' ')?;
        }
        match self.state {
            State::Done => Ok(()),
            _ => Err(self.err("unexpected end of input")),
        }
    }

    fn parse_error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }
}

impl<V: fmt::Debug> fmt::Debug for Reader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("json::Reader")
            .field("state", &self.state)
            .field("depth", &self.scopes.len())
            .field("visitor", &self.visitor)
            .finish()
    }
}

/// A streaming JSON serializer, the `dj_Builder` half of `dmem/json.c`.
///
/// Writes directly to any [`Write`] implementor with no intermediate tree;
/// the caller is responsible for calling `start_*`/`end_*` in a
/// well-nested order (unlike [`Reader`], `Writer` trusts its caller rather
/// than re-validating grammar it is itself producing).
pub struct Writer<W> {
    out: W,
    /// One entry per open object/array: whether a member/element has
    /// already been written (controls whether the next one needs a
    /// leading comma).
    scopes: Vec<bool>,
    /// True after a key has been appended and before its value, used to
    /// decide whether the next value needs a leading comma (no) or not.
    awaiting_value: bool,
}

impl<W: Write> Writer<W> {
    /// Creates a writer over `out`. Nothing is written until the first
    /// `start_*`/`append_*` call.
    pub fn new(out: W) -> Writer<W> {
        Writer {
            out,
            scopes: Vec::new(),
            awaiting_value: false,
        }
    }

    fn before_value(&mut self) -> io::Result<()> {
        if self.awaiting_value {
            self.awaiting_value = false;
            return Ok(());
        }
        if let Some(has_member) = self.scopes.last_mut() {
            if *has_member {
                self.out.write_all(b",")?;
            }
            *has_member = true;
        }
        Ok(())
    }

    /// Opens an object. Must be paired with [`Writer::end_object`].
    pub fn start_object(&mut self) -> io::Result<()> {
        self.before_value()?;
        self.out.write_all(b"{")?;
        self.scopes.push(false);
        Ok(())
    }

    /// Closes the innermost open object.
    pub fn end_object(&mut self) -> io::Result<()> {
        self.scopes.pop();
        self.out.write_all(b"}")
    }

    /// Opens an array. Must be paired with [`Writer::end_array`].
    pub fn start_array(&mut self) -> io::Result<()> {
        self.before_value()?;
        self.out.write_all(b"[")?;
        self.scopes.push(false);
        Ok(())
    }

    /// Closes the innermost open array.
    pub fn end_array(&mut self) -> io::Result<()> {
        self.scopes.pop();
        self.out.write_all(b"]")
    }

    /// Appends an object member key. The following `append_*`/`start_*`
    /// call supplies its value.
    pub fn append_key(&mut self, key: &str) -> io::Result<()> {
        self.before_value()?;
        write_escaped_string(&mut self.out, key)?;
        self.out.write_all(b":")?;
        self.awaiting_value = true;
        Ok(())
    }

    /// Appends a string value (or element).
    pub fn append_string(&mut self, value: &str) -> io::Result<()> {
        self.before_value()?;
        write_escaped_string(&mut self.out, value)
    }

    /// Appends a number value (or element). `NaN`/infinite values are
    /// rejected — JSON has no token for them, matching `spec.md` §6's
    /// "no NaN/Inf".
    pub fn append_number(&mut self, value: f64) -> io::Result<()> {
        if !value.is_finite() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "JSON cannot represent NaN or infinite numbers",
            ));
        }
        self.before_value()?;
        if value == value.trunc() && value.abs() < 1e17 {
            write!(self.out, "{}", value as i64)
        } else {
            write!(self.out, "{value}")
        }
    }

    /// Appends a boolean value (or element).
    pub fn append_boolean(&mut self, value: bool) -> io::Result<()> {
        self.before_value()?;
        self.out.write_all(if value { b"true" } else { b"false" })
    }

    /// Appends a null value (or element).
    pub fn append_null(&mut self) -> io::Result<()> {
        self.before_value()?;
        self.out.write_all(b"null")
    }

    /// Consumes the writer, returning the underlying sink. Callers must
    /// have closed every `start_object`/`start_array` they opened.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn write_escaped_string<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    out.write_all(b"\"")?;
    for c in s.chars() {
        match c {
            '"' => out.write_all(b"\\\"")?,
            '\\' => out.write_all(b"\\\\")?,
            '\n' => out.write_all(b"\\n")?,
            '\t' => out.write_all(b"\\t")?,
            '\r' => out.write_all(b"\\r")?,
            '\u{08}' => out.write_all(b"\\b")?,
            '\u{0C}' => out.write_all(b"\\f")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => write!(out, "{c}")?,
        }
    }
    out.write_all(b"\"")
}
