//! xylem: a validating XML 1.0 processor.
//!
//! Three cores, each its own crate, tied together by an arena document
//! tree:
//!
//! - [`xylem_parser`]: a recursive-descent XML 1.0 parser with DTDs,
//!   entity expansion, five input encodings and optional validation.
//! - [`xylem_dtd`]: the declaration model and the content-model state
//!   machines that validation runs on.
//! - [`xylem_xpath1`]: an XPath 1.0 compiler and evaluator.
//!
//! ```
//! let doc = xylem::parse_str(
//!     r#"<persons><person id="1"><firstname>John</firstname></person></persons>"#,
//! )?;
//! let person = xylem::find(doc.root(), "//person")?;
//! assert_eq!(person[0].get_attribute("id"), Some("1"));
//! # Ok::<(), xylem::XmlError>(())
//! ```

pub mod error;

pub use error::XmlError;

pub use xylem_dom::{
    Doctype, Document, DomError, Node, NodeId, NodeType, QName, WriteOptions, XmlVersion,
};
pub use xylem_dtd::{ContentSpec, ContentState, Dtd, DtdError};
pub use xylem_parser::{
    DocumentBuilder, EntityResolver, Location, ParseError, Parser, ParserOptions, SaxAttribute,
    SaxHandler,
};
pub use xylem_xpath1::{Value, XNode, XPathError, XPathExpr};

use std::collections::HashMap;

/// Parses a document from a string with default options.
pub fn parse_str(text: &str) -> Result<Document, XmlError> {
    Ok(xylem_parser::parse_str(text)?)
}

/// Parses a document from raw bytes, sniffing the encoding.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, XmlError> {
    Ok(xylem_parser::parse_bytes(bytes)?)
}

/// Parses with explicit options and an optional external-entity resolver.
pub fn parse_str_with(
    text: &str,
    options: ParserOptions,
    resolver: Option<Box<dyn EntityResolver + '_>>,
) -> Result<Document, XmlError> {
    Ok(xylem_parser::parse_str_with(text, options, resolver)?)
}

/// Compiles an XPath 1.0 expression for repeated evaluation.
pub fn compile(expr: &str) -> Result<XPathExpr, XmlError> {
    Ok(xylem_xpath1::compile(expr)?)
}

/// Evaluates an XPath expression and returns the matching elements and
/// other tree nodes in document order.
pub fn find<'a>(node: Node<'a>, expr: &str) -> Result<Vec<Node<'a>>, XmlError> {
    Ok(xylem_xpath1::find(node, expr)?)
}

/// Evaluates an XPath expression and returns the first match, if any.
pub fn find_first<'a>(node: Node<'a>, expr: &str) -> Result<Option<Node<'a>>, XmlError> {
    Ok(xylem_xpath1::find_first(node, expr)?)
}

/// Evaluates an XPath expression with variable bindings.
pub fn evaluate_with<'a>(
    node: Node<'a>,
    expr: &str,
    variables: &HashMap<String, Value<'a>>,
) -> Result<Value<'a>, XmlError> {
    Ok(xylem_xpath1::compile(expr)?.evaluate_with(node, variables)?)
}
