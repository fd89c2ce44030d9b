use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextError {
    #[error("invalid byte sequence at offset {offset}: {message}")]
    InvalidEncoding { offset: usize, message: String },

    #[error("unsupported encoding label '{0}'")]
    UnsupportedEncoding(String),
}

impl TextError {
    pub(crate) fn invalid(offset: usize, message: impl Into<String>) -> Self {
        TextError::InvalidEncoding {
            offset,
            message: message.into(),
        }
    }
}
