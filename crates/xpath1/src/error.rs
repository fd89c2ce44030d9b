use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XPathError {
    #[error("XPath parse error in '{0}': {1}")]
    Parse(String, String),

    #[error("function '{function}' error: {message}")]
    Function { function: String, message: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("variable '${0}' is not bound")]
    UnknownVariable(String),
}
