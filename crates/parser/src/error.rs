use thiserror::Error;
use xylem_text::TextError;

/// A line/column pair, 1-based, pointing into the outermost input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("not well-formed ({location}): {message}")]
    NotWellFormed { message: String, location: Location },

    #[error("invalid document ({location}): {message}")]
    Invalid { message: String, location: Location },

    #[error("invalid content ({location}): {message}")]
    InvalidContent { message: String, location: Location },

    #[error("invalid encoding: {0}")]
    InvalidEncoding(#[from] TextError),

    #[error("code point U+{code:04X} is not an XML character ({location})")]
    InvalidCharacter { code: u32, location: Location },

    #[error("reference to undefined entity '{name}' ({location})")]
    UndefinedEntity { name: String, location: Location },

    #[error("entity '{name}' expands through itself ({location})")]
    RecursiveEntity { name: String, location: Location },

    #[error("duplicate ID value '{id}' ({location})")]
    DuplicateId { id: String, location: Location },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub fn not_well_formed(message: impl Into<String>, location: Location) -> ParseError {
        ParseError::NotWellFormed {
            message: message.into(),
            location,
        }
    }

    pub fn invalid(message: impl Into<String>, location: Location) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            location,
        }
    }
}
