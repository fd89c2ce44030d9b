//! The xylem document tree.
//!
//! A [`Document`] owns every node in a single arena; nodes are addressed by
//! [`NodeId`] and read through copyable [`Node`] handles. Mutation goes
//! through `&mut Document` methods so that parent/sibling links can never
//! dangle. The shape follows the classic DOM: one document node owning at
//! most one root element plus surrounding comments and processing
//! instructions, with attributes held out of the sibling chain in a
//! QName-keyed set per element.

pub mod document;
pub mod error;
pub mod node;
pub mod qname;
pub mod serialize;

pub use document::{Doctype, Document, NodeId, NodeKind, NodeType};
pub use error::DomError;
pub use node::{Ancestors, Attributes, ChildElements, Children, Descendants, Node};
pub use qname::QName;
pub use serialize::{WriteOptions, XmlVersion};
