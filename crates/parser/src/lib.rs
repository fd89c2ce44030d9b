//! The validating XML 1.0 parser.
//!
//! [`Parser`] walks the grammar productions recursive-descent style over a
//! decoded code-point [`cursor::Cursor`], expanding entities as it goes and
//! notifying a [`SaxHandler`] of everything it sees. [`DocumentBuilder`]
//! is the handler that materializes those events into a
//! [`xylem_dom::Document`]; the `parse_*` functions wire the two together.

pub mod builder;
pub mod cursor;
pub mod dtd_reader;
pub mod error;
pub mod events;
pub mod parser;

pub use builder::{DocumentBuilder, parse_bytes, parse_bytes_with, parse_str, parse_str_with};
pub use error::{Location, ParseError};
pub use events::{EntityResolver, Invalidation, SaxAttribute, SaxHandler};
pub use parser::{Parser, ParserOptions};
