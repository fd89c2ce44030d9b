//! The code-point cursor the parser reads from.
//!
//! A stack of frames models entity expansion: reading past the end of an
//! expansion pops back to the frame that referenced it. Look-ahead goes
//! through a small pushback ring, never unlimited rewind. Line endings are
//! normalized to LF when a frame is loaded, so downstream code only ever
//! sees `\n`.

use std::collections::VecDeque;

use crate::error::{Location, ParseError};

struct Frame {
    chars: Vec<char>,
    pos: usize,
    /// Entity name for recursion detection; `None` for the base input and
    /// for anonymous literal frames.
    entity: Option<String>,
    /// Only the base frame advances the reported line/column.
    track: bool,
}

pub struct Cursor {
    frames: Vec<Frame>,
    /// Pushback ring for peeked code points, with their `track` flags.
    peeked: VecDeque<(char, bool)>,
    line: u32,
    col: u32,
}

/// Replaces CRLF and bare CR with LF (XML 1.0 §2.11).
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

impl Cursor {
    pub fn new(text: &str) -> Cursor {
        Cursor {
            frames: vec![Frame {
                chars: normalize_newlines(text).chars().collect(),
                pos: 0,
                entity: None,
                track: true,
            }],
            peeked: VecDeque::new(),
            line: 1,
            col: 1,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            line: self.line,
            col: self.col,
        }
    }

    /// True while any expansion frame is still active.
    pub fn in_entity(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn entity_active(&self, name: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.entity.as_deref() == Some(name))
    }

    /// Begins reading the replacement text of `name`; fails on cycles.
    pub fn push_entity(&mut self, name: &str, replacement: &str) -> Result<(), ParseError> {
        if self.entity_active(name) {
            return Err(ParseError::RecursiveEntity {
                name: name.to_string(),
                location: self.location(),
            });
        }
        // Anything already peeked belongs after the expansion.
        self.unpeek_into_frame();
        self.frames.push(Frame {
            chars: normalize_newlines(replacement).chars().collect(),
            pos: 0,
            entity: Some(name.to_string()),
            track: false,
        });
        Ok(())
    }

    /// Pushes literal text to be read next, e.g. parameter-entity padding.
    pub fn push_literal(&mut self, text: &str) {
        self.unpeek_into_frame();
        self.frames.push(Frame {
            chars: normalize_newlines(text).chars().collect(),
            pos: 0,
            entity: None,
            track: false,
        });
    }

    /// Moves the pushback ring back into a frame so a new expansion can be
    /// stacked in front of it.
    fn unpeek_into_frame(&mut self) {
        if self.peeked.is_empty() {
            return;
        }
        let track = self.peeked.iter().all(|&(_, t)| t);
        let chars: Vec<char> = self.peeked.drain(..).map(|(c, _)| c).collect();
        self.frames.push(Frame {
            chars,
            pos: 0,
            entity: None,
            track,
        });
    }

    fn pull(&mut self) -> Option<(char, bool)> {
        loop {
            let frame = self.frames.last_mut()?;
            if frame.pos < frame.chars.len() {
                let c = frame.chars[frame.pos];
                let track = frame.track;
                frame.pos += 1;
                return Some((c, track));
            }
            if self.frames.len() == 1 {
                return None;
            }
            self.frames.pop();
        }
    }

    fn fill_peek(&mut self, n: usize) {
        while self.peeked.len() < n {
            match self.pull() {
                Some(entry) => self.peeked.push_back(entry),
                None => break,
            }
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        self.peek_at(0)
    }

    pub fn peek_at(&mut self, n: usize) -> Option<char> {
        self.fill_peek(n + 1);
        self.peeked.get(n).map(|&(c, _)| c)
    }

    pub fn next_char(&mut self) -> Option<char> {
        let (c, track) = match self.peeked.pop_front() {
            Some(entry) => entry,
            None => self.pull()?,
        };
        if track {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        Some(c)
    }

    pub fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Consumes the next code point, failing on end of input or on a code
    /// point outside the XML `Char` production.
    pub fn consume(&mut self) -> Result<char, ParseError> {
        let location = self.location();
        match self.next_char() {
            Some(c) if xylem_text::is_char(c) => Ok(c),
            Some(c) => Err(ParseError::InvalidCharacter {
                code: c as u32,
                location,
            }),
            None => Err(ParseError::not_well_formed("unexpected end of input", location)),
        }
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.next_char();
            true
        } else {
            false
        }
    }

    pub fn starts_with(&mut self, s: &str) -> bool {
        for (i, expected) in s.chars().enumerate() {
            if self.peek_at(i) != Some(expected) {
                return false;
            }
        }
        true
    }

    pub fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            for _ in s.chars() {
                self.next_char();
            }
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        let location = self.location();
        match self.next_char() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(ParseError::not_well_formed(
                format!("expected '{expected}', found '{c}'"),
                location,
            )),
            None => Err(ParseError::not_well_formed(
                format!("expected '{expected}', found end of input"),
                location,
            )),
        }
    }

    pub fn expect_str(&mut self, s: &str) -> Result<(), ParseError> {
        if self.eat_str(s) {
            Ok(())
        } else {
            Err(ParseError::not_well_formed(
                format!("expected '{s}'"),
                self.location(),
            ))
        }
    }

    /// Skips whitespace; reports whether any was present.
    pub fn skip_ws(&mut self) -> bool {
        let mut any = false;
        while matches!(self.peek(), Some(c) if xylem_text::is_space(c)) {
            self.next_char();
            any = true;
        }
        any
    }

    pub fn expect_ws(&mut self) -> Result<(), ParseError> {
        if self.skip_ws() {
            Ok(())
        } else {
            Err(ParseError::not_well_formed("expected whitespace", self.location()))
        }
    }

    /// `Name ::= NameStartChar (NameChar)*`
    pub fn read_name(&mut self) -> Result<String, ParseError> {
        let location = self.location();
        match self.peek() {
            Some(c) if xylem_text::is_name_start_char(c) => {}
            _ => return Err(ParseError::not_well_formed("expected a name", location)),
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if xylem_text::is_name_char(c) {
                name.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        Ok(name)
    }

    /// `Nmtoken ::= (NameChar)+`
    pub fn read_nmtoken(&mut self) -> Result<String, ParseError> {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if xylem_text::is_name_char(c) {
                token.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        if token.is_empty() {
            return Err(ParseError::not_well_formed("expected a name token", self.location()));
        }
        Ok(token)
    }

    /// Reads a quoted literal without any reference processing.
    pub fn read_quoted(&mut self) -> Result<String, ParseError> {
        let location = self.location();
        let quote = match self.next_char() {
            Some(c @ ('"' | '\'')) => c,
            _ => return Err(ParseError::not_well_formed("expected a quoted literal", location)),
        };
        let mut value = String::new();
        loop {
            let c = self.consume()?;
            if c == quote {
                return Ok(value);
            }
            value.push(c);
        }
    }
}
