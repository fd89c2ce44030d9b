use thiserror::Error;

use xylem_dom::DomError;
use xylem_dtd::DtdError;
use xylem_parser::ParseError;
use xylem_text::TextError;
use xylem_xpath1::XPathError;

/// Everything that can go wrong across the workspace, for callers that
/// want one error type end to end.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("document tree error: {0}")]
    Dom(#[from] DomError),

    #[error("DTD error: {0}")]
    Dtd(#[from] DtdError),

    #[error("encoding error: {0}")]
    Text(#[from] TextError),

    #[error("XPath error: {0}")]
    XPath(#[from] XPathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
