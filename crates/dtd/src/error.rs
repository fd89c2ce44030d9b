use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DtdError {
    #[error("attribute value '{value}' is not a valid {expected}")]
    InvalidAttributeValue { value: String, expected: &'static str },

    #[error("value '{0}' is not one of the declared enumeration tokens")]
    NotInEnumeration(String),

    #[error("'{0}' does not name a declared unparsed entity")]
    NotAnUnparsedEntity(String),

    #[error("attribute is fixed to '{declared}', got '{got}'")]
    FixedMismatch { declared: String, got: String },

    #[error("element '{0}' is declared more than once")]
    DuplicateElementDecl(String),
}
