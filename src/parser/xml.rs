//! Incremental XML reader.
//!
//! Grounded in `dmem/xml.c`'s `dx_Parser`, generalized the same way
//! `json::Reader` generalizes `dmem/json.c`: an explicit state cursor plus
//! partial buffers stand in for the original's `setjmp`/`longjmp` suspend
//! point, and parse failures come back as `Result<_, ParseError>` instead
//! of a negative return code.
//!
//! Namespace handling follows `spec.md` §4.8: `xmlns`/`xmlns:alias`
//! attributes push bindings that resolve `alias:local` element and
//! attribute names, emitted to the [`Visitor`] as `namespace:local`. DTD
//! subsets and external entities are out of scope (`spec.md` §6); a
//! `<!DOCTYPE ...>` or other unrecognized `<!...>` construct is skipped by
//! bracket depth rather than parsed.

use super::ParseError;
use crate::parser::IncrementalParser;

use std::fmt;

/// Receives structural events as a [`Reader`] lexes them.
///
/// `attributes` pairs are `(name, value)` in document order; namespace
/// declarations (`xmlns`, `xmlns:*`) are consumed to build the alias stack
/// and are not reported as ordinary attributes.
#[allow(unused_variables)]
pub trait Visitor {
    /// An element's start tag (or the tag of a self-closing element) was
    /// fully lexed, with `name` already namespace-resolved.
    fn element_start(&mut self, name: &str, attributes: &[(String, String)]) -> bool {
        true
    }

    /// The matching end of `name` (an explicit close tag, or immediately
    /// after `element_start` for a self-closing element).
    fn element_end(&mut self, name: &str) -> bool {
        true
    }

    /// Called once inner-text capture for an element completes, only if
    /// [`Visitor::wants_text`] returned `true` for it. Entities are already
    /// decoded; trailing whitespace before the close tag is trimmed.
    fn text(&mut self, value: &str) -> bool {
        true
    }

    /// Queried once right after `element_start` for a non-self-closing
    /// element: return `true` to have the parser buffer everything between
    /// this tag and its matching close tag and deliver it via
    /// [`Visitor::text`]. Defaults to `false` (most elements are pure
    /// structure, not text-bearing).
    fn wants_text(&mut self, name: &str, attributes: &[(String, String)]) -> bool {
        false
    }
}

struct Scope {
    /// The raw text between `<`/`</` and the first of whitespace/`/`/`>`,
    /// used to check the close tag matches (`spec.md`: "close tags must
    /// match the nearest open tag's local name").
    raw_name: String,
    resolved_name: String,
    /// Namespace bindings introduced on this element's own start tag:
    /// `("", uri)` for a default `xmlns`, `(alias, uri)` for `xmlns:alias`.
    bindings: Vec<(String, String)>,
    capturing: bool,
    text: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Text,
    TagOpenWait,
    BangStart,
    BangCData(u8),
    BangOther,
    CommentBody,
    CDataBody,
    PiBody,
    BangDash,
    OpenTagName,
    NextAttribute,
    AttributeName,
    AttributeEquals,
    AttributeQuote,
    AttributeValue(u8),
    CloseTagName,
    CloseTagTrailingWs,
    Done,
}

const CDATA_LITERAL: &[u8] = b"CDATA[";

fn is_name_char(b: u8) -> bool {
    !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'/' | b'>' | b'=')
}

fn decode_entity(name: &[u8]) -> Option<String> {
    match name {
        b"amp" => Some("&".to_string()),
        b"lt" => Some("<".to_string()),
        b"gt" => Some(">".to_string()),
        b"quot" => Some("\"".to_string()),
        b"apos" => Some("'".to_string()),
        _ => {
            let rest = name.strip_prefix(b"#")?;
            let cp = if let Some(hex) = rest.strip_prefix(b"x").or_else(|| rest.strip_prefix(b"X"))
            {
                u32::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?
            } else {
                std::str::from_utf8(rest).ok()?.parse().ok()?
            };
            char::from_u32(cp).map(|c| c.to_string())
        }
    }
}

/// An incremental XML reader driving a [`Visitor`].
pub struct Reader<V> {
    visitor: V,
    state: State,
    scopes: Vec<Scope>,
    /// Bindings collected from `xmlns`/`xmlns:alias` attributes on the tag
    /// currently being opened, not yet pushed as a [`Scope`].
    pending_bindings: Vec<(String, String)>,
    /// Ordinary (non-namespace-declaration) attributes collected so far on
    /// the tag currently being opened, raw (unresolved) names.
    pending_attrs: Vec<(String, String)>,
    tag_buf: Vec<u8>,
    attr_name: Vec<u8>,
    attr_value: Vec<u8>,
    /// `Some` while lexing inside `&...;`; the collected name so far.
    entity: Option<Vec<u8>>,
    /// Trailing run of `]` bytes not yet committed to CDATA content.
    cdata_bracket_run: u32,
    /// Trailing run of `-` bytes not yet known to end a comment.
    comment_dash_run: u32,
    bang_depth: u32,
    /// Set when `/` was seen in `NextAttribute`, awaiting the `>` that
    /// confirms a self-closing tag.
    self_closing_pending: bool,
    line: usize,
    error: Option<ParseError>,
}

impl<V: Visitor> Reader<V> {
    /// Creates a reader that will deliver events to `visitor`.
    pub fn new(visitor: V) -> Reader<V> {
        Reader {
            visitor,
            state: State::Text,
            scopes: Vec::new(),
            pending_bindings: Vec::new(),
            pending_attrs: Vec::new(),
            tag_buf: Vec::new(),
            attr_name: Vec::new(),
            attr_value: Vec::new(),
            entity: None,
            cdata_bracket_run: 0,
            comment_dash_run: 0,
            bang_depth: 0,
            self_closing_pending: false,
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

    fn resolve_alias<'a>(&'a self, alias: &str) -> Option<&'a str> {
        self.pending_bindings
            .iter()
            .rev()
            .chain(self.scopes.iter().rev().flat_map(|s| s.bindings.iter().rev()))
            .find(|(a, _)| a == alias)
            .map(|(_, uri)| uri.as_str())
    }

    /// Resolves an element name: `alias:local` through the namespace
    /// stack, or a bare name through the default namespace if one is
    /// bound, else returned unchanged.
    fn resolve_element_name(&mut self, raw: &str) -> Result<String, ParseError> {
        if let Some((alias, local)) = raw.split_once(':') {
            match self.resolve_alias(alias) {
                Some(uri) => Ok(format!("{uri}:{local}")),
                None => Err(self.err(format!("unresolved namespace alias '{alias}'"))),
            }
        } else {
            match self.resolve_alias("") {
                Some(uri) => Ok(format!("{uri}:{raw}")),
                None => Ok(raw.to_string()),
            }
        }
    }

    /// Resolves an attribute name. Unlike elements, an unprefixed
    /// attribute is never subject to the default namespace.
    fn resolve_attr_name(&mut self, raw: &str) -> Result<String, ParseError> {
        if let Some((alias, local)) = raw.split_once(':') {
            match self.resolve_alias(alias) {
                Some(uri) => Ok(format!("{uri}:{local}")),
                None => Err(self.err(format!("unresolved namespace alias '{alias}'"))),
            }
        } else {
            Ok(raw.to_string())
        }
    }

    fn current_text_buf(&mut self) -> Option<&mut Vec<u8>> {
        self.scopes.last_mut().filter(|s| s.capturing).map(|s| &mut s.text)
    }

    /// Appends raw bytes to the active captured-text buffer, a no-op if
    /// the innermost scope did not opt into text capture.
    fn push_text_bytes(&mut self, bytes: &[u8]) {
        if let Some(buf) = self.current_text_buf() {
            buf.extend_from_slice(bytes);
        }
    }

    fn handle_entity_byte(&mut self, b: u8, strict: bool, into_attr: bool) -> Result<bool, ParseError> {
        let mut name = self.entity.take().expect("handle_entity_byte without an entity in progress");
        if b == b';' {
            match decode_entity(&name) {
                Some(decoded) => {
                    if into_attr {
                        self.attr_value.extend_from_slice(decoded.as_bytes());
                    } else {
                        self.push_text_bytes(decoded.as_bytes());
                    }
                    Ok(true)
                }
                None => {
                    if strict {
                        Err(self.err("unknown entity reference"))
                    } else {
                        name.insert(0, b'&');
                        name.push(b';');
                        self.push_text_bytes(&name);
                        Ok(true)
                    }
                }
            }
        } else if b == b'&' || b == b'<' || name.len() > 32 {
            Err(self.err("malformed entity reference"))
        } else {
            name.push(b);
            self.entity = Some(name);
            Ok(false)
        }
    }

    fn open_tag_name(&self) -> Result<String, ParseError> {
        String::from_utf8(self.tag_buf.clone()).map_err(|_| ParseError::new(self.line, "invalid UTF-8 in tag name"))
    }

    /// Finalizes a start tag (`>` or `/>` reached): splits namespace
    /// declarations out of `pending_attrs`, resolves the element name and
    /// remaining attribute names, and delivers `element_start`.
    fn finish_open_tag(&mut self, self_closing: bool) -> Result<bool, ParseError> {
        let raw_name = self.open_tag_name()?;
        self.tag_buf.clear();

        let raw_attrs = std::mem::take(&mut self.pending_attrs);
        self.pending_bindings.clear();
        let mut attrs = Vec::with_capacity(raw_attrs.len());
        for (k, v) in raw_attrs {
            if k == "xmlns" {
                self.pending_bindings.push((String::new(), v));
            } else if let Some(alias) = k.strip_prefix("xmlns:") {
                self.pending_bindings.push((alias.to_string(), v));
            } else {
                attrs.push((k, v));
            }
        }

        let resolved_name = self.resolve_element_name(&raw_name)?;
        let mut resolved_attrs = Vec::with_capacity(attrs.len());
        for (k, v) in attrs {
            let rk = self.resolve_attr_name(&k)?;
            resolved_attrs.push((rk, v));
        }

        let ok = self.visitor.element_start(&resolved_name, &resolved_attrs);
        if !ok {
            return Err(self.err("callback abort"));
        }

        if self_closing {
            let ok = self.visitor.element_end(&resolved_name);
            self.pending_bindings.clear();
            if !ok {
                return Err(self.err("callback abort"));
            }
            self.state = if self.scopes.is_empty() { State::Done } else { State::Text };
        } else {
            let capturing = self.visitor.wants_text(&resolved_name, &resolved_attrs);
            self.scopes.push(Scope {
                raw_name,
                resolved_name,
                bindings: std::mem::take(&mut self.pending_bindings),
                capturing,
                text: Vec::new(),
            });
            self.state = State::Text;
        }
        Ok(true)
    }

    fn finish_close_tag(&mut self) -> Result<bool, ParseError> {
        let raw = self.open_tag_name()?;
        self.tag_buf.clear();
        let top = self
            .scopes
            .last()
            .ok_or_else(|| ParseError::new(self.line, "close tag with no matching open tag"))?;
        if top.raw_name != raw {
            return Err(self.err(format!(
                "close tag '{}' does not match open tag '{}'",
                raw, top.raw_name
            )));
        }
        let scope = self.scopes.pop().expect("checked above");
        let mut ok = true;
        if scope.capturing {
            let text = String::from_utf8(scope.text)
                .map_err(|_| ParseError::new(self.line, "invalid UTF-8 in element text"))?;
            ok = self.visitor.text(text.trim_end());
        }
        if ok {
            ok = self.visitor.element_end(&scope.resolved_name);
        }
        if !ok {
            return Err(self.err("callback abort"));
        }
        self.state = if self.scopes.is_empty() { State::Done } else { State::Text };
        Ok(true)
    }

    fn step(&mut self, b: u8) -> Result<(), ParseError> {
        loop {
            match self.state {
                State::Text => {
                    if b == b'<' {
                        if self.entity.is_some() {
                            return Err(self.err("malformed entity reference"));
                        }
                        self.state = State::TagOpenWait;
                        return Ok(());
                    }
                    if self.entity.is_some() {
                        self.handle_entity_byte(b, false, false)?;
                        return Ok(());
                    }
                    if b == b'&' {
                        self.entity = Some(Vec::new());
                        return Ok(());
                    }
                    self.push_text_bytes(&[b]);
                    return Ok(());
                }

                State::TagOpenWait => {
                    match b {
                        b'!' => {
                            self.state = State::BangStart;
                            return Ok(());
                        }
                        b'?' => {
                            self.state = State::PiBody;
                            return Ok(());
                        }
                        b'/' => {
                            self.state = State::CloseTagName;
                            return Ok(());
                        }
                        b if is_name_char(b) => {
                            self.tag_buf.clear();
                            self.tag_buf.push(b);
                            self.state = State::OpenTagName;
                            return Ok(());
                        }
                        _ => return Err(self.err("expected tag name after '<'")),
                    }
                }

                State::BangStart => {
                    match b {
                        b'-' => {
                            self.state = State::BangDash;
                            return Ok(());
                        }
                        b'[' => {
                            self.state = State::BangCData(0);
                            return Ok(());
                        }
                        _ => {
                            self.bang_depth = 1;
                            self.state = State::BangOther;
                            continue;
                        }
                    }
                }

                State::BangDash => {
                    if b == b'-' {
                        self.comment_dash_run = 0;
                        self.state = State::CommentBody;
                        return Ok(());
                    }
                    // A single '-' that turned out not to start a comment
                    // marker; neither consumed byte was a bracket.
                    self.bang_depth = 1;
                    self.state = State::BangOther;
                    continue;
                }

                State::BangCData(matched) => {
                    if (matched as usize) < CDATA_LITERAL.len() && b == CDATA_LITERAL[matched as usize] {
                        let next = matched + 1;
                        self.state = if next as usize == CDATA_LITERAL.len() {
                            self.cdata_bracket_run = 0;
                            State::CDataBody
                        } else {
                            State::BangCData(next)
                        };
                        return Ok(());
                    }
                    self.bang_depth = 1;
                    self.state = State::BangOther;
                    continue;
                }

                State::BangOther => {
                    if b == b'<' {
                        self.bang_depth += 1;
                    } else if b == b'>' {
                        self.bang_depth -= 1;
                        if self.bang_depth == 0 {
                            self.state = State::Text;
                        }
                    }
                    return Ok(());
                }

                State::CommentBody => {
                    if b == b'-' {
                        self.comment_dash_run += 1;
                    } else if b == b'>' && self.comment_dash_run >= 2 {
                        self.state = State::Text;
                        self.comment_dash_run = 0;
                    } else {
                        self.comment_dash_run = 0;
                    }
                    return Ok(());
                }

                State::CDataBody => {
                    if b == b']' {
                        self.cdata_bracket_run += 1;
                        if self.cdata_bracket_run > 2 {
                            self.push_text_bytes(b"]");
                            self.cdata_bracket_run = 2;
                        }
                        return Ok(());
                    }
                    if b == b'>' && self.cdata_bracket_run >= 2 {
                        self.cdata_bracket_run = 0;
                        self.state = State::Text;
                        return Ok(());
                    }
                    for _ in 0..self.cdata_bracket_run {
                        self.push_text_bytes(b"]");
                    }
                    self.cdata_bracket_run = 0;
                    self.push_text_bytes(&[b]);
                    return Ok(());
                }

                State::PiBody => {
                    if b == b'?' {
                        self.comment_dash_run = 1;
                    } else if b == b'>' && self.comment_dash_run >= 1 {
                        self.comment_dash_run = 0;
                        self.state = State::Text;
                    } else {
                        self.comment_dash_run = 0;
                    }
                    return Ok(());
                }

                State::OpenTagName => {
                    if is_name_char(b) {
                        self.tag_buf.push(b);
                        return Ok(());
                    }
                    self.state = State::NextAttribute;
                    continue;
                }

                State::NextAttribute => {
                    if Self::is_ws(b) && !self.self_closing_pending {
                        return Ok(());
                    }
                    match b {
                        b'/' if !self.self_closing_pending => {
                            self.self_closing_pending = true;
                            return Ok(());
                        }
                        b'>' => {
                            let self_closing = self.self_closing_pending;
                            self.self_closing_pending = false;
                            return self.finish_open_tag(self_closing).map(|_| ());
                        }
                        b if is_name_char(b) && !self.self_closing_pending => {
                            self.attr_name.clear();
                            self.attr_name.push(b);
                            self.state = State::AttributeName;
                            return Ok(());
                        }
                        _ => return Err(self.err("expected attribute, '/' or '>'")),
                    }
                }

                State::AttributeName => {
                    match b {
                        b'=' => {
                            self.state = State::AttributeQuote;
                            return Ok(());
                        }
                        b if Self::is_ws(b) => {
                            self.state = State::AttributeEquals;
                            return Ok(());
                        }
                        b if is_name_char(b) => {
                            self.attr_name.push(b);
                            return Ok(());
                        }
                        _ => return Err(self.err("malformed attribute name")),
                    }
                }

                State::AttributeEquals => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    if b == b'=' {
                        self.state = State::AttributeQuote;
                        return Ok(());
                    }
                    return Err(self.err("expected '=' after attribute name"));
                }

                State::AttributeQuote => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    match b {
                        b'"' | b'\'' => {
                            self.attr_value.clear();
                            self.state = State::AttributeValue(b);
                            return Ok(());
                        }
                        _ => return Err(self.err("expected quoted attribute value")),
                    }
                }

                State::AttributeValue(quote) => {
                    if self.entity.is_some() {
                        let handled = self.handle_entity_byte(b, true, true)?;
                        if !handled {
                            return Ok(());
                        }
                        return Ok(());
                    }
                    if b == quote {
                        let name = String::from_utf8(std::mem::take(&mut self.attr_name))
                            .map_err(|_| ParseError::new(self.line, "invalid UTF-8 in attribute name"))?;
                        let value = String::from_utf8(std::mem::take(&mut self.attr_value))
                            .map_err(|_| ParseError::new(self.line, "invalid UTF-8 in attribute value"))?;
                        self.pending_attrs.push((name, value));
                        self.state = State::NextAttribute;
                        return Ok(());
                    }
                    if b == b'<' {
                        return Err(self.err("'<' not allowed in attribute value"));
                    }
                    if b == b'&' {
                        self.entity = Some(Vec::new());
                        return Ok(());
                    }
                    self.attr_value.push(b);
                    return Ok(());
                }

                State::CloseTagName => {
                    if is_name_char(b) {
                        self.tag_buf.push(b);
                        return Ok(());
                    }
                    if Self::is_ws(b) {
                        self.state = State::CloseTagTrailingWs;
                        return Ok(());
                    }
                    if b == b'>' {
                        return self.finish_close_tag().map(|_| ());
                    }
                    return Err(self.err("malformed close tag"));
                }

                State::CloseTagTrailingWs => {
                    if Self::is_ws(b) {
                        return Ok(());
                    }
                    if b == b'>' {
                        return self.finish_close_tag().map(|_| ());
                    }
                    return Err(self.err("expected '>' to close end tag"));
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
        for &b in bytes {
            self.step(b)?;
            self.bump_line(b);
        }
        Ok(bytes.len())
    }

    fn parse_complete(&mut self) -> Result<(), ParseError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        match self.state {
            State::Done if self.scopes.is_empty() => Ok(()),
            State::Text if self.scopes.is_empty() => Err(self.err("no element found")),
            _ => Err(self.err("unexpected end of input")),
        }
    }

    fn parse_error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }
}

impl<V: fmt::Debug> fmt::Debug for Reader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("xml::Reader")
            .field("state", &self.state)
            .field("depth", &self.scopes.len())
            .field("visitor", &self.visitor)
            .finish()
    }
}
