use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomError {
    #[error("ownership violation: {0}")]
    OwnershipViolation(String),

    #[error("document already has a root element")]
    MultipleRootElements,

    #[error("node kind not allowed here: {0}")]
    InvalidStructure(&'static str),

    #[error("code point U+{0:04X} is not a valid XML {1} character")]
    InvalidCharacter(u32, &'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
