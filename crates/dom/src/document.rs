//! The arena that owns every node of one document.
//!
//! Parent, sibling and child links are arena indices; detaching a node is
//! an index unlink, destroying one is a subtree sweep onto a free list.

use crate::error::DomError;
use crate::node::Node;
use crate::qname::QName;

/// Index of a node inside its document's arena. Id 0 is always the
/// document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> NodeId {
        NodeId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The closed set of node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document { doctype: Option<Doctype> },
    Element { name: QName, attributes: Vec<NodeId> },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    Attribute { name: QName, value: String, is_id: bool },
    /// Slot on the free list; never reachable from the document node.
    Free,
}

/// Public node taxonomy, without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    Element,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
    Attribute,
}

/// A recorded `<!DOCTYPE ...>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    pub root_name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) parent: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl NodeData {
    fn new(kind: NodeKind) -> NodeData {
        NodeData {
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
            kind,
        }
    }

    fn is_detached(&self) -> bool {
        self.parent.is_none() && self.prev.is_none() && self.next.is_none()
    }
}

/// An XML document: one arena of nodes, rooted at the document node.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    free: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Document {
        Document {
            nodes: vec![NodeData::new(NodeKind::Document { doctype: None })],
            free: Vec::new(),
        }
    }

    /// The document node, id 0.
    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> Node<'_> {
        self.node(self.root_id())
    }

    /// The single element child of the document node, if any.
    pub fn root_element(&self) -> Option<Node<'_>> {
        self.root().child_elements().next()
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node::new(self, id)
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.data(id).kind
    }

    pub fn node_type(&self, id: NodeId) -> NodeType {
        match self.data(id).kind {
            NodeKind::Document { .. } => NodeType::Document,
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::CData(_) => NodeType::CData,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            NodeKind::Attribute { .. } => NodeType::Attribute,
            NodeKind::Free => unreachable!("free slot is never reachable from the document node"),
        }
    }

    pub fn doctype(&self) -> Option<&Doctype> {
        match &self.data(self.root_id()).kind {
            NodeKind::Document { doctype } => doctype.as_ref(),
            _ => None,
        }
    }

    pub fn set_doctype(&mut self, doctype: Doctype) {
        if let NodeKind::Document { doctype: slot } = &mut self.data_mut(self.root_id()).kind {
            *slot = Some(doctype);
        }
    }

    // --- node construction ---

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = NodeData::new(kind);
                id
            }
            None => {
                let id = NodeId::new(self.nodes.len());
                self.nodes.push(NodeData::new(kind));
                id
            }
        }
    }

    pub fn create_element(&mut self, name: impl Into<QName>) -> NodeId {
        self.alloc(NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_cdata(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::CData(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn create_pi(&mut self, target: impl Into<String>, data: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
        })
    }

    // --- container operations ---

    /// Appends `child` as the last child of `parent`. The child must be
    /// detached; anything else is an ownership violation.
    pub fn push_back(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.link(parent, child, None);
        Ok(())
    }

    /// Prepends `child` as the first child of `parent`.
    pub fn push_front(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        let first = self.data(parent).first_child;
        self.link(parent, child, first);
        Ok(())
    }

    /// Inserts `child` immediately before `before`, which must be a child
    /// of `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        before: NodeId,
        child: NodeId,
    ) -> Result<(), DomError> {
        if self.data(before).parent != Some(parent) {
            return Err(DomError::OwnershipViolation(format!(
                "position {:?} does not belong to container {:?}",
                before, parent
            )));
        }
        self.check_insert(parent, child)?;
        self.link(parent, child, Some(before));
        Ok(())
    }

    /// Unlinks `node` from its parent, leaving it detached but alive.
    pub fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        if node == self.root_id() {
            return Err(DomError::InvalidStructure("the document node cannot be detached"));
        }
        self.unlink(node);
        Ok(())
    }

    /// Removes `child` from `parent` and destroys its subtree.
    pub fn erase_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.data(child).parent != Some(parent) {
            return Err(DomError::OwnershipViolation(format!(
                "node {:?} is not a child of container {:?}",
                child, parent
            )));
        }
        self.erase(child)
    }

    /// Unlinks `node` and destroys it together with its whole subtree.
    pub fn erase(&mut self, node: NodeId) -> Result<(), DomError> {
        if node == self.root_id() {
            return Err(DomError::InvalidStructure("the document node cannot be erased"));
        }
        self.unlink(node);
        self.free_subtree(node);
        Ok(())
    }

    /// Destroys the first child of `parent`. Returns false on an empty
    /// container.
    pub fn pop_front(&mut self, parent: NodeId) -> bool {
        match self.data(parent).first_child {
            Some(first) => self.erase(first).is_ok(),
            None => false,
        }
    }

    /// Destroys the last child of `parent`.
    pub fn pop_back(&mut self, parent: NodeId) -> bool {
        match self.data(parent).last_child {
            Some(last) => self.erase(last).is_ok(),
            None => false,
        }
    }

    /// Destroys every child of `parent`.
    pub fn clear_children(&mut self, parent: NodeId) {
        while self.pop_front(parent) {}
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        match self.data(parent).kind {
            NodeKind::Element { .. } | NodeKind::Document { .. } => {}
            _ => return Err(DomError::InvalidStructure("container is not an element")),
        }

        match self.data(child).kind {
            NodeKind::Document { .. } => {
                return Err(DomError::InvalidStructure("a document cannot be a child"));
            }
            NodeKind::Attribute { .. } => {
                return Err(DomError::InvalidStructure(
                    "attributes live in the attribute set, not the child list",
                ));
            }
            NodeKind::Free => return Err(DomError::InvalidStructure("node was destroyed")),
            _ => {}
        }

        if !self.data(child).is_detached() {
            return Err(DomError::OwnershipViolation(format!(
                "node {:?} already has a parent or siblings",
                child
            )));
        }

        // The document node admits comments, PIs and exactly one element.
        if let NodeKind::Document { .. } = self.data(parent).kind {
            match self.data(child).kind {
                NodeKind::Element { .. } => {
                    if self.node(parent).child_elements().next().is_some() {
                        return Err(DomError::MultipleRootElements);
                    }
                }
                NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
                _ => {
                    return Err(DomError::InvalidStructure(
                        "only an element, comments and PIs may appear at document level",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Links a detached `child` under `parent`, before `before` (or last).
    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let prev = match before {
            Some(b) => self.data(b).prev,
            None => self.data(parent).last_child,
        };

        self.data_mut(child).parent = Some(parent);
        self.data_mut(child).prev = prev;
        self.data_mut(child).next = before;

        match prev {
            Some(p) => self.data_mut(p).next = Some(child),
            None => self.data_mut(parent).first_child = Some(child),
        }
        match before {
            Some(b) => self.data_mut(b).prev = Some(child),
            None => self.data_mut(parent).last_child = Some(child),
        }
    }

    fn unlink(&mut self, node: NodeId) {
        let (parent, prev, next) = {
            let data = self.data(node);
            (data.parent, data.prev, data.next)
        };

        if let Some(parent) = parent {
            // Attribute nodes are not in the sibling chain; drop them from
            // the element's attribute set instead.
            if matches!(self.data(node).kind, NodeKind::Attribute { .. }) {
                if let NodeKind::Element { attributes, .. } = &mut self.data_mut(parent).kind {
                    attributes.retain(|&a| a != node);
                }
            } else {
                match prev {
                    Some(p) => self.data_mut(p).next = next,
                    None => self.data_mut(parent).first_child = next,
                }
                match next {
                    Some(n) => self.data_mut(n).prev = prev,
                    None => self.data_mut(parent).last_child = prev,
                }
            }
        }

        let data = self.data_mut(node);
        data.parent = None;
        data.prev = None;
        data.next = None;
    }

    fn free_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let mut child = self.data(id).first_child;
            while let Some(c) = child {
                child = self.data(c).next;
                stack.push(c);
            }
            if let NodeKind::Element { attributes, .. } = &self.data(id).kind {
                stack.extend(attributes.iter().copied());
            }
            self.nodes[id.index()] = NodeData::new(NodeKind::Free);
            self.free.push(id);
        }
    }

    // --- attribute set ---

    /// Sets an attribute on an element, replacing the value silently when
    /// the QName already exists. Returns the attribute node id and whether
    /// a new attribute was inserted.
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        name: impl Into<QName>,
        value: impl Into<String>,
    ) -> Result<(NodeId, bool), DomError> {
        let name = name.into();
        let value = value.into();

        let existing = self.attribute_node(element, &name);
        if let Some(id) = existing {
            if let NodeKind::Attribute { value: slot, .. } = &mut self.data_mut(id).kind {
                *slot = value;
            }
            return Ok((id, false));
        }

        if !matches!(self.data(element).kind, NodeKind::Element { .. }) {
            return Err(DomError::InvalidStructure("attributes only attach to elements"));
        }

        let attr = self.alloc(NodeKind::Attribute {
            name,
            value,
            is_id: false,
        });
        self.data_mut(attr).parent = Some(element);
        if let NodeKind::Element { attributes, .. } = &mut self.data_mut(element).kind {
            attributes.push(attr);
        }
        Ok((attr, true))
    }

    pub fn attribute_node(&self, element: NodeId, name: &QName) -> Option<NodeId> {
        match &self.data(element).kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .copied()
                .find(|&a| match &self.data(a).kind {
                    NodeKind::Attribute { name: n, .. } => n == name,
                    _ => false,
                }),
            _ => None,
        }
    }

    pub fn attribute(&self, element: NodeId, name: &QName) -> Option<&str> {
        let id = self.attribute_node(element, name)?;
        match &self.data(id).kind {
            NodeKind::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn has_attribute(&self, element: NodeId, name: &QName) -> bool {
        self.attribute_node(element, name).is_some()
    }

    pub fn remove_attribute(&mut self, element: NodeId, name: &QName) -> bool {
        match self.attribute_node(element, name) {
            Some(id) => {
                self.unlink(id);
                self.nodes[id.index()] = NodeData::new(NodeKind::Free);
                self.free.push(id);
                true
            }
            None => false,
        }
    }

    /// Flags an attribute as ID-typed; the parser applies this from the
    /// DTD so that `id()` lookups and duplicate detection can see it.
    pub fn mark_id_attribute(&mut self, attr: NodeId) {
        if let NodeKind::Attribute { is_id, .. } = &mut self.data_mut(attr).kind {
            *is_id = true;
        }
    }

    // --- deep copy ---

    /// Deep-copies `node` (subtree and attributes) into a new detached
    /// node of this document.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let kind = self.data(node).kind.clone();
        match kind {
            NodeKind::Element { name, attributes } => {
                let copy = self.create_element(name);
                for attr in attributes {
                    if let NodeKind::Attribute { name, value, is_id } = self.data(attr).kind.clone()
                    {
                        // A fresh element cannot have the QName yet.
                        if let Ok((id, _)) = self.set_attribute(copy, name, value) {
                            if is_id {
                                self.mark_id_attribute(id);
                            }
                        }
                    }
                }
                let mut child = self.data(node).first_child;
                while let Some(c) = child {
                    child = self.data(c).next;
                    let child_copy = self.clone_subtree(c);
                    // Cannot fail: child_copy is freshly detached.
                    let _ = self.push_back(copy, child_copy);
                }
                copy
            }
            NodeKind::Attribute { name, value, .. } => self.alloc(NodeKind::Attribute {
                name,
                value,
                is_id: false,
            }),
            NodeKind::Document { .. } | NodeKind::Free => self.alloc(NodeKind::Free),
            other => self.alloc(other),
        }
    }
}
