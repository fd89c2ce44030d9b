//! Node collection along each XPath axis, in proximity order.

use xylem_dom::{Node, NodeType};

use crate::ast::Axis;
use crate::engine::XNode;

/// Collects the nodes `axis` reaches from `node`. Reverse axes come out
/// nearest-first, which is their proximity order.
pub fn collect<'a>(axis: Axis, node: &XNode<'a>) -> Vec<XNode<'a>> {
    match axis {
        Axis::SelfNode => vec![node.clone()],
        Axis::Child => children(node),
        Axis::Descendant => descendants(node),
        Axis::DescendantOrSelf => {
            let mut out = vec![node.clone()];
            out.extend(descendants(node));
            out
        }
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor => ancestors(node),
        Axis::AncestorOrSelf => {
            let mut out = vec![node.clone()];
            out.extend(ancestors(node));
            out
        }
        Axis::FollowingSibling => siblings(node, false),
        Axis::PrecedingSibling => siblings(node, true),
        Axis::Following => following(node, false),
        Axis::Preceding => following(node, true),
        Axis::Attribute => attributes(node),
        Axis::Namespace => namespaces(node),
    }
}

fn children<'a>(node: &XNode<'a>) -> Vec<XNode<'a>> {
    match node.tree() {
        Some(n) => n.children().map(XNode::Tree).collect(),
        None => Vec::new(),
    }
}

fn descendants<'a>(node: &XNode<'a>) -> Vec<XNode<'a>> {
    match node.tree() {
        Some(n) => n.descendants().map(XNode::Tree).collect(),
        None => Vec::new(),
    }
}

fn ancestors<'a>(node: &XNode<'a>) -> Vec<XNode<'a>> {
    let mut out = Vec::new();
    let mut current = node.parent();
    while let Some(n) = current {
        current = n.parent();
        out.push(n);
    }
    out
}

fn siblings<'a>(node: &XNode<'a>, preceding: bool) -> Vec<XNode<'a>> {
    // Attribute and namespace nodes have no siblings.
    let Some(n) = node.tree() else { return Vec::new() };
    if n.node_type() == NodeType::Attribute {
        return Vec::new();
    }

    let mut out = Vec::new();
    if preceding {
        let mut current = n.prev_sibling();
        while let Some(s) = current {
            current = s.prev_sibling();
            out.push(XNode::Tree(s));
        }
    } else {
        let mut current = n.next_sibling();
        while let Some(s) = current {
            current = s.next_sibling();
            out.push(XNode::Tree(s));
        }
    }
    out
}

/// `following`: everything after the context node in document order,
/// minus its own subtree. `preceding`: the mirror image, nearest-first.
fn following<'a>(node: &XNode<'a>, preceding: bool) -> Vec<XNode<'a>> {
    let base = match node {
        XNode::Tree(n) if n.node_type() == NodeType::Attribute => n.parent(),
        XNode::Tree(n) => Some(*n),
        XNode::Namespace { owner, .. } => Some(*owner),
    };
    let Some(base) = base else { return Vec::new() };

    if preceding {
        return preceding_nodes(base);
    }

    let mut out = Vec::new();
    let mut current = base;
    loop {
        let mut sibling = current.next_sibling();
        while let Some(s) = sibling {
            push_subtree(s, &mut out);
            sibling = s.next_sibling();
        }
        match current.parent() {
            Some(p) => current = p,
            None => break,
        }
    }
    out
}

/// Everything before `base` in document order, minus its ancestors,
/// reversed into proximity (nearest-first) order.
fn preceding_nodes<'a>(base: Node<'a>) -> Vec<XNode<'a>> {
    let doc_root = base.document().root();
    let ancestors: std::collections::HashSet<_> = base.ancestors().map(|a| a.id()).collect();

    let mut out = Vec::new();
    for n in std::iter::once(doc_root).chain(doc_root.descendants()) {
        if n == base {
            break;
        }
        if ancestors.contains(&n.id()) {
            continue;
        }
        out.push(XNode::Tree(n));
    }
    out.reverse();
    out
}

fn push_subtree<'a>(n: Node<'a>, out: &mut Vec<XNode<'a>>) {
    out.push(XNode::Tree(n));
    out.extend(n.descendants().map(XNode::Tree));
}

fn attributes<'a>(node: &XNode<'a>) -> Vec<XNode<'a>> {
    match node.tree() {
        Some(n) if n.node_type() == NodeType::Element => {
            n.attributes().map(XNode::Tree).collect()
        }
        _ => Vec::new(),
    }
}

fn namespaces<'a>(node: &XNode<'a>) -> Vec<XNode<'a>> {
    match node.tree() {
        Some(n) if n.node_type() == NodeType::Element => n
            .namespaces_in_scope()
            .into_iter()
            .map(|(prefix, uri)| XNode::Namespace {
                owner: n,
                prefix,
                uri,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_dom::Document;

    // <root><a><a1/><a2/></a><b/><c><c1/></c></root>
    fn build() -> Document {
        let mut doc = Document::new();
        let root = doc.create_element("root");
        doc.push_back(doc.root_id(), root).unwrap();
        let a = doc.create_element("a");
        doc.push_back(root, a).unwrap();
        let a1 = doc.create_element("a1");
        doc.push_back(a, a1).unwrap();
        let a2 = doc.create_element("a2");
        doc.push_back(a, a2).unwrap();
        let b = doc.create_element("b");
        doc.push_back(root, b).unwrap();
        let c = doc.create_element("c");
        doc.push_back(root, c).unwrap();
        let c1 = doc.create_element("c1");
        doc.push_back(c, c1).unwrap();
        doc
    }

    fn by_name<'a>(doc: &'a Document, name: &str) -> XNode<'a> {
        let node = doc
            .root()
            .descendants()
            .find(|n| n.local_name() == name)
            .unwrap();
        XNode::Tree(node)
    }

    fn names(nodes: &[XNode<'_>]) -> Vec<String> {
        nodes.iter().map(|n| n.local_name()).collect()
    }

    #[test]
    fn child_and_descendant() {
        let doc = build();
        let root = by_name(&doc, "root");
        assert_eq!(names(&collect(Axis::Child, &root)), vec!["a", "b", "c"]);
        assert_eq!(
            names(&collect(Axis::Descendant, &root)),
            vec!["a", "a1", "a2", "b", "c", "c1"]
        );
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let doc = build();
        let a1 = by_name(&doc, "a1");
        let collected = collect(Axis::Ancestor, &a1);
        assert_eq!(names(&collected[..2]), vec!["a", "root"]);
    }

    #[test]
    fn sibling_axes_run_outward() {
        let doc = build();
        let b = by_name(&doc, "b");
        assert_eq!(names(&collect(Axis::FollowingSibling, &b)), vec!["c"]);
        assert_eq!(names(&collect(Axis::PrecedingSibling, &b)), vec!["a"]);

        let a = by_name(&doc, "a");
        assert_eq!(names(&collect(Axis::FollowingSibling, &a)), vec!["b", "c"]);
    }

    #[test]
    fn following_skips_own_subtree() {
        let doc = build();
        let a = by_name(&doc, "a");
        assert_eq!(names(&collect(Axis::Following, &a)), vec!["b", "c", "c1"]);

        let a2 = by_name(&doc, "a2");
        assert_eq!(names(&collect(Axis::Following, &a2)), vec!["b", "c", "c1"]);
    }

    #[test]
    fn preceding_is_nearest_first_and_excludes_ancestors() {
        let doc = build();
        let c1 = by_name(&doc, "c1");
        assert_eq!(names(&collect(Axis::Preceding, &c1)), vec!["b", "a2", "a1", "a"]);
    }

    #[test]
    fn namespace_axis_synthesizes_bindings() {
        let mut doc = Document::new();
        let root = doc.create_element("r");
        doc.push_back(doc.root_id(), root).unwrap();
        doc.set_attribute(root, "xmlns:z", "u").unwrap();
        let child = doc.create_element("child");
        doc.push_back(root, child).unwrap();

        let child = by_name(&doc, "child");
        let collected = collect(Axis::Namespace, &child);
        let mut prefixes: Vec<String> = collected
            .iter()
            .map(|n| match n {
                XNode::Namespace { prefix, .. } => prefix.clone(),
                _ => panic!("expected namespace nodes"),
            })
            .collect();
        prefixes.sort();
        assert_eq!(prefixes, vec!["xml", "z"]);
    }
}
