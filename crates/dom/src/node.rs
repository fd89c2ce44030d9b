//! Read-only node handles and tree navigation.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::document::{Document, NodeId, NodeKind, NodeType};
use crate::qname::QName;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A copyable handle to one node of a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    pub(crate) fn new(doc: &'a Document, id: NodeId) -> Node<'a> {
        Node { doc, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn node_type(&self) -> NodeType {
        self.doc.node_type(self.id)
    }

    pub fn is_element(&self) -> bool {
        self.node_type() == NodeType::Element
    }

    /// The node's QName: element and attribute names, or the target of a
    /// processing instruction.
    pub fn name(&self) -> Option<&'a QName> {
        match self.doc.kind(self.id) {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn local_name(&self) -> &'a str {
        self.name().map(|q| q.local()).unwrap_or("")
    }

    pub fn prefix(&self) -> &'a str {
        self.name().map(|q| q.prefix()).unwrap_or("")
    }

    /// The target of a processing instruction.
    pub fn pi_target(&self) -> Option<&'a str> {
        match self.doc.kind(self.id) {
            NodeKind::ProcessingInstruction { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The textual payload of text, CDATA, comment and PI nodes and the
    /// value of attribute nodes.
    pub fn text(&self) -> Option<&'a str> {
        match self.doc.kind(self.id) {
            NodeKind::Text(s) | NodeKind::CData(s) | NodeKind::Comment(s) => Some(s),
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            NodeKind::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_id_attribute(&self) -> bool {
        matches!(self.doc.kind(self.id), NodeKind::Attribute { is_id: true, .. })
    }

    // --- navigation ---

    pub fn parent(&self) -> Option<Node<'a>> {
        self.doc.data(self.id).parent.map(|id| Node::new(self.doc, id))
    }

    pub fn prev_sibling(&self) -> Option<Node<'a>> {
        self.doc.data(self.id).prev.map(|id| Node::new(self.doc, id))
    }

    pub fn next_sibling(&self) -> Option<Node<'a>> {
        self.doc.data(self.id).next.map(|id| Node::new(self.doc, id))
    }

    pub fn first_child(&self) -> Option<Node<'a>> {
        self.doc.data(self.id).first_child.map(|id| Node::new(self.doc, id))
    }

    pub fn last_child(&self) -> Option<Node<'a>> {
        self.doc.data(self.id).last_child.map(|id| Node::new(self.doc, id))
    }

    pub fn has_children(&self) -> bool {
        self.doc.data(self.id).first_child.is_some()
    }

    /// Number of children, by walking the sibling chain.
    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Every child in insertion order.
    pub fn children(&self) -> Children<'a> {
        Children {
            doc: self.doc,
            next: self.doc.data(self.id).first_child,
        }
    }

    /// Only the element children.
    pub fn child_elements(&self) -> ChildElements<'a> {
        ChildElements(self.children())
    }

    /// The subtree below this node in pre-order, excluding attributes.
    pub fn descendants(&self) -> Descendants<'a> {
        Descendants {
            doc: self.doc,
            root: self.id,
            next: self.doc.data(self.id).first_child,
        }
    }

    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            doc: self.doc,
            next: self.doc.data(self.id).parent,
        }
    }

    pub fn attributes(&self) -> Attributes<'a> {
        let ids: &'a [NodeId] = match self.doc.kind(self.id) {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        };
        Attributes {
            doc: self.doc,
            ids: ids.iter(),
        }
    }

    /// Attribute value lookup by written name.
    pub fn get_attribute(&self, name: &str) -> Option<&'a str> {
        self.doc.attribute(self.id, &QName::parse(name))
    }

    // --- namespaces ---

    /// Resolves `prefix` against the declarations in scope at this node.
    /// `None` means undeclared; `Some("")` means explicitly declared empty.
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&'a str> {
        match prefix {
            "xml" => return Some(XML_NAMESPACE),
            "xmlns" => return Some(XMLNS_NAMESPACE),
            _ => {}
        }

        let start = if self.is_element() { Some(*self) } else { self.parent() };
        let mut cursor = start;
        while let Some(node) = cursor {
            if node.is_element() {
                for attr in node.attributes() {
                    if let Some(name) = attr.name() {
                        if name.declared_prefix() == Some(prefix) {
                            return attr.text();
                        }
                    }
                }
            }
            cursor = node.parent();
        }
        None
    }

    /// Finds the nearest enclosing prefix bound to `uri`. `Some("")` is
    /// the default namespace.
    pub fn prefix_for_namespace(&self, uri: &str) -> Option<&'a str> {
        if uri == XML_NAMESPACE {
            return Some("xml");
        }

        let start = if self.is_element() { Some(*self) } else { self.parent() };
        let mut cursor = start;
        while let Some(node) = cursor {
            if node.is_element() {
                for attr in node.attributes() {
                    if let Some(name) = attr.name() {
                        if let Some(declared) = name.declared_prefix() {
                            if attr.text() == Some(uri) {
                                return Some(if declared.is_empty() { "" } else { name.local() });
                            }
                        }
                    }
                }
            }
            cursor = node.parent();
        }
        None
    }

    /// The namespace URI of this element or attribute, per the lazy
    /// ancestor-walk contract. Unprefixed attributes are in no namespace.
    pub fn namespace_uri(&self) -> Option<&'a str> {
        let name = self.name()?;
        match self.node_type() {
            NodeType::Element => {
                let uri = self.namespace_for_prefix(name.prefix())?;
                if uri.is_empty() { None } else { Some(uri) }
            }
            NodeType::Attribute => {
                if name.prefix().is_empty() {
                    None
                } else {
                    let uri = self.namespace_for_prefix(name.prefix())?;
                    if uri.is_empty() { None } else { Some(uri) }
                }
            }
            _ => None,
        }
    }

    /// Prefix/URI pairs in scope at this element, nearest declaration
    /// winning, including the implicit `xml` binding. An empty default
    /// declaration removes the default namespace from scope.
    pub fn namespaces_in_scope(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        let start = if self.is_element() { Some(*self) } else { self.parent() };
        let mut cursor = start;
        while let Some(node) = cursor {
            if node.is_element() {
                for attr in node.attributes() {
                    let Some(name) = attr.name() else { continue };
                    let Some(prefix) = name.declared_prefix() else { continue };
                    if seen.iter().any(|s| s == prefix) {
                        continue;
                    }
                    seen.push(prefix.to_string());
                    let uri = attr.text().unwrap_or("");
                    if !uri.is_empty() {
                        out.push((prefix.to_string(), uri.to_string()));
                    }
                }
            }
            cursor = node.parent();
        }

        out.push(("xml".to_string(), XML_NAMESPACE.to_string()));
        out
    }

    // --- values and comparison ---

    /// The XPath string value: text content for text-ish nodes, the
    /// concatenated descendant text for elements and the document.
    pub fn string_value(&self) -> String {
        match self.doc.kind(self.id) {
            NodeKind::Text(s) | NodeKind::CData(s) | NodeKind::Comment(s) => s.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Element { .. } | NodeKind::Document { .. } => {
                let mut out = String::new();
                for node in self.descendants() {
                    if let NodeKind::Text(s) | NodeKind::CData(s) = self.doc.kind(node.id()) {
                        out.push_str(s);
                    }
                }
                out
            }
            NodeKind::Free => String::new(),
        }
    }

    /// Structural equality: same name, same attribute set (order
    /// ignored), children equal in document order. Whitespace-only text
    /// nodes are skipped and text is compared trimmed, so parsed and
    /// hand-built trees compare equal.
    pub fn deep_eq(&self, other: Node<'_>) -> bool {
        match (self.doc.kind(self.id), other.doc.kind(other.id)) {
            (
                NodeKind::Element { name: a, .. },
                NodeKind::Element { name: b, .. },
            ) => {
                if a != b {
                    return false;
                }
                if !attrs_eq(*self, other) {
                    return false;
                }
                children_eq(*self, other)
            }
            (NodeKind::Document { .. }, NodeKind::Document { .. }) => children_eq(*self, other),
            (NodeKind::Text(a), NodeKind::Text(b))
            | (NodeKind::CData(a), NodeKind::CData(b))
            | (NodeKind::Text(a), NodeKind::CData(b))
            | (NodeKind::CData(a), NodeKind::Text(b)) => a.trim() == b.trim(),
            (NodeKind::Comment(a), NodeKind::Comment(b)) => a == b,
            (
                NodeKind::ProcessingInstruction { target: t1, data: d1 },
                NodeKind::ProcessingInstruction { target: t2, data: d2 },
            ) => t1 == t2 && d1 == d2,
            (
                NodeKind::Attribute { name: n1, value: v1, .. },
                NodeKind::Attribute { name: n2, value: v2, .. },
            ) => n1 == n2 && v1 == v2,
            _ => false,
        }
    }
}

fn attrs_eq(a: Node<'_>, b: Node<'_>) -> bool {
    if a.attributes().count() != b.attributes().count() {
        return false;
    }
    a.attributes().all(|attr| {
        let Some(name) = attr.name() else { return false };
        b.document()
            .attribute(b.id(), name)
            .is_some_and(|v| Some(v) == attr.text())
    })
}

fn is_skippable_ws(n: &Node<'_>) -> bool {
    matches!(
        n.node_type(),
        NodeType::Text if n.text().is_some_and(|t| t.trim().is_empty())
    )
}

fn children_eq(a: Node<'_>, b: Node<'_>) -> bool {
    let mut left = a.children().filter(|n| !is_skippable_ws(n));
    let mut right = b.children().filter(|n| !is_skippable_ws(n));
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => {
                if !l.deep_eq(r) {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl Hash for Node<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.doc as *const Document).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.doc.kind(self.id) {
            NodeKind::Element { name, .. } => write!(f, "Element({name})"),
            NodeKind::Text(s) => write!(f, "Text({s:?})"),
            NodeKind::CData(s) => write!(f, "CData({s:?})"),
            NodeKind::Comment(s) => write!(f, "Comment({s:?})"),
            NodeKind::ProcessingInstruction { target, .. } => write!(f, "PI({target})"),
            NodeKind::Attribute { name, value, .. } => write!(f, "Attr({name}={value:?})"),
            NodeKind::Document { .. } => write!(f, "Document"),
            NodeKind::Free => write!(f, "Free"),
        }
    }
}

pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let id = self.next?;
        self.next = self.doc.data(id).next;
        Some(Node::new(self.doc, id))
    }
}

pub struct ChildElements<'a>(pub(crate) Children<'a>);

impl<'a> Iterator for ChildElements<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        self.0.by_ref().find(Node::is_element)
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let id = self.next?;
        let node = Node::new(self.doc, id);

        // Pre-order: first child, else next sibling, else climb.
        self.next = self.doc.data(id).first_child.or_else(|| {
            let mut cursor = Some(id);
            while let Some(c) = cursor {
                if c == self.root {
                    return None;
                }
                if let Some(sib) = self.doc.data(c).next {
                    return Some(sib);
                }
                cursor = self.doc.data(c).parent;
            }
            None
        });

        Some(node)
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let id = self.next?;
        self.next = self.doc.data(id).parent;
        Some(Node::new(self.doc, id))
    }
}

pub struct Attributes<'a> {
    doc: &'a Document,
    ids: std::slice::Iter<'a, NodeId>,
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        self.ids.next().map(|&id| Node::new(self.doc, id))
    }
}
