//! XPath 1.0 over the xylem document tree.
//!
//! Expressions compile once into an AST ([`compile`]) and evaluate many
//! times against any node of a document. Results are the four XPath value
//! types: node-set, string, number, boolean.

pub mod ast;
pub mod axes;
pub mod engine;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{Axis, BinOp, Expr, NodeTest, Path, PathOrigin, Step};
pub use engine::{EvaluationContext, Value, XNode, XPathExpr, compile, evaluate};
pub use error::XPathError;
pub use parser::parse_expression;

use xylem_dom::Node;

/// Compiles and evaluates `expr`, returning the matching tree nodes in
/// document order. Non-node results are an error.
pub fn find<'a>(node: Node<'a>, expr: &str) -> Result<Vec<Node<'a>>, XPathError> {
    match compile(expr)?.evaluate(node)? {
        Value::Nodes(nodes) => Ok(nodes
            .into_iter()
            .filter_map(|n| match n {
                XNode::Tree(node) => Some(node),
                XNode::Namespace { .. } => None,
            })
            .collect()),
        other => Err(XPathError::Type(format!(
            "expected a node-set, got {}",
            other.type_name()
        ))),
    }
}

/// Like [`find`], but returns only the first match.
pub fn find_first<'a>(node: Node<'a>, expr: &str) -> Result<Option<Node<'a>>, XPathError> {
    Ok(find(node, expr)?.into_iter().next())
}

/// Compiles and evaluates `expr`, coercing the result to a string.
pub fn evaluate_str(node: Node<'_>, expr: &str) -> Result<String, XPathError> {
    Ok(compile(expr)?.evaluate(node)?.into_string())
}
