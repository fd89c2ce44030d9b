//! The evaluation engine for executing a parsed XPath AST against a
//! document tree.

use std::collections::{HashMap, HashSet};
use std::fmt;

use xylem_dom::{Node, NodeId, NodeType};

use crate::ast::{Axis, Expr, NodeTest, Path, PathOrigin, Step};
use crate::error::XPathError;
use crate::parser::parse_expression;
use crate::{axes, functions, operators};

/// A node as XPath sees it: either a real tree node (element, attribute,
/// text, comment, PI, document) or a synthesized namespace node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XNode<'a> {
    Tree(Node<'a>),
    Namespace {
        owner: Node<'a>,
        prefix: String,
        uri: String,
    },
}

impl<'a> XNode<'a> {
    pub fn tree(&self) -> Option<Node<'a>> {
        match self {
            XNode::Tree(node) => Some(*node),
            XNode::Namespace { .. } => None,
        }
    }

    pub fn parent(&self) -> Option<XNode<'a>> {
        match self {
            XNode::Tree(node) => node.parent().map(XNode::Tree),
            XNode::Namespace { owner, .. } => Some(XNode::Tree(*owner)),
        }
    }

    /// The string value per the XPath data model; for a namespace node it
    /// is the bound URI.
    pub fn string_value(&self) -> String {
        match self {
            XNode::Tree(node) => node.string_value(),
            XNode::Namespace { uri, .. } => uri.clone(),
        }
    }

    /// The local part of the expanded name: the prefix for namespace
    /// nodes, the target for processing instructions.
    pub fn local_name(&self) -> String {
        match self {
            XNode::Tree(node) => match node.node_type() {
                NodeType::ProcessingInstruction => node.pi_target().unwrap_or("").to_string(),
                _ => node.local_name().to_string(),
            },
            XNode::Namespace { prefix, .. } => prefix.clone(),
        }
    }

    /// The qualified name as written.
    pub fn qualified_name(&self) -> String {
        match self {
            XNode::Tree(node) => match node.node_type() {
                NodeType::ProcessingInstruction => node.pi_target().unwrap_or("").to_string(),
                _ => node.name().map(|q| q.to_string()).unwrap_or_default(),
            },
            XNode::Namespace { prefix, .. } => prefix.clone(),
        }
    }

    pub fn namespace_uri(&self) -> Option<String> {
        match self {
            XNode::Tree(node) => node.namespace_uri().map(str::to_string),
            XNode::Namespace { .. } => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, XNode::Tree(n) if n.node_type() == NodeType::Element)
    }
}

/// The possible results of an XPath expression evaluation.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Nodes(Vec<XNode<'a>>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a> Value<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
        }
    }

    /// Boolean coercion per XPath 1.0.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    /// Number coercion per XPath 1.0.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Nodes(nodes) => {
                let s = nodes.first().map(|n| n.string_value()).unwrap_or_default();
                s.trim().parse().unwrap_or(f64::NAN)
            }
        }
    }

    /// String coercion per XPath 1.0: a node-set becomes the string value
    /// of its first node in document order.
    pub fn into_string(self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(|n| n.string_value()).unwrap_or_default(),
            Value::String(s) => s,
            Value::Number(n) => number_to_string(n),
            Value::Boolean(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().into_string())
    }
}

/// XPath number-to-string: integers print without a decimal point, the
/// specials print as NaN and Infinity.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// All state needed during expression evaluation. `'a` is the document's
/// lifetime, `'v` the variable map's.
pub struct EvaluationContext<'a, 'v> {
    pub context_node: XNode<'a>,
    /// The document node, where absolute paths restart.
    pub root: Node<'a>,
    /// 1-based proximity position.
    pub position: usize,
    pub size: usize,
    pub variables: &'v HashMap<String, Value<'a>>,
}

impl<'a, 'v> EvaluationContext<'a, 'v> {
    pub fn new(
        context_node: XNode<'a>,
        root: Node<'a>,
        position: usize,
        size: usize,
        variables: &'v HashMap<String, Value<'a>>,
    ) -> Self {
        EvaluationContext {
            context_node,
            root,
            position,
            size,
            variables,
        }
    }
}

/// A compiled expression, reusable across documents and evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct XPathExpr {
    ast: Expr,
}

impl XPathExpr {
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn evaluate<'a>(&self, node: Node<'a>) -> Result<Value<'a>, XPathError> {
        let variables = HashMap::new();
        self.evaluate_with(node, &variables)
    }

    /// Evaluates with variable bindings. An error here does not poison
    /// the compiled expression.
    pub fn evaluate_with<'a>(
        &self,
        node: Node<'a>,
        variables: &HashMap<String, Value<'a>>,
    ) -> Result<Value<'a>, XPathError> {
        let root = node.document().root();
        let e_ctx = EvaluationContext::new(XNode::Tree(node), root, 1, 1, variables);
        evaluate(&self.ast, &e_ctx)
    }
}

/// Compiles an expression string. [`XPathError::Parse`] is the only
/// failure mode.
pub fn compile(expr: &str) -> Result<XPathExpr, XPathError> {
    Ok(XPathExpr {
        ast: parse_expression(expr)?,
    })
}

/// Evaluates a compiled expression in an explicit context.
pub fn evaluate<'a>(
    expr: &Expr,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    match expr {
        Expr::Literal(s) => Ok(Value::String(s.clone())),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Path(path) => {
            let nodes = evaluate_path(path, e_ctx)?;
            Ok(Value::Nodes(nodes))
        }
        Expr::Variable(name) => match e_ctx.variables.get(name) {
            Some(value) => Ok(value.clone()),
            None => Err(XPathError::UnknownVariable(name.clone())),
        },
        Expr::Call { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::evaluate_function(name, evaluated_args, e_ctx)
        }
        Expr::Binary(op, left, right) => {
            let left_val = evaluate(left, e_ctx)?;
            let right_val = evaluate(right, e_ctx)?;
            operators::evaluate(*op, left_val, right_val)
        }
        Expr::Negate(inner) => {
            let val = evaluate(inner, e_ctx)?;
            Ok(Value::Number(-val.to_number()))
        }
    }
}

fn evaluate_path<'a>(
    path: &Path,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Vec<XNode<'a>>, XPathError> {
    let initial: Vec<XNode<'a>> = match &path.origin {
        PathOrigin::Context => vec![e_ctx.context_node.clone()],
        PathOrigin::Root => vec![XNode::Tree(e_ctx.root)],
        PathOrigin::Filter(start) => match evaluate(start, e_ctx)? {
            Value::Nodes(nodes) => nodes,
            other => {
                return Err(XPathError::Type(format!(
                    "a path can only start from a node-set, got {}",
                    other.type_name()
                )));
            }
        },
    };

    let mut current = initial;
    for step in &path.steps {
        current = evaluate_step(step, &current, e_ctx)?;
    }
    Ok(current)
}

/// One step: collect along the axis per context node (in proximity
/// order), filter by the node test, run the predicates, then merge the
/// per-node results into one duplicate-free document-ordered set.
fn evaluate_step<'a>(
    step: &Step,
    context_nodes: &[XNode<'a>],
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Vec<XNode<'a>>, XPathError> {
    let mut result: Vec<XNode<'a>> = Vec::new();
    let mut seen: HashSet<XNode<'a>> = HashSet::new();

    for node in context_nodes {
        let axis_nodes = axes::collect(step.axis, node);
        let tested: Vec<XNode<'a>> = axis_nodes
            .into_iter()
            .filter(|candidate| node_test_matches(step.axis, &step.test, candidate))
            .collect();
        let selected = apply_predicates(&tested, &step.predicates, e_ctx)?;
        for n in selected {
            if seen.insert(n.clone()) {
                result.push(n);
            }
        }
    }

    sort_document_order(&mut result);
    Ok(result)
}

/// The principal node type of an axis: attributes on the attribute axis,
/// namespace nodes on the namespace axis, elements everywhere else.
fn is_principal(axis: Axis, node: &XNode<'_>) -> bool {
    match axis {
        Axis::Attribute => {
            matches!(node, XNode::Tree(n) if n.node_type() == NodeType::Attribute)
        }
        Axis::Namespace => matches!(node, XNode::Namespace { .. }),
        _ => node.is_element(),
    }
}

fn node_test_matches(axis: Axis, test: &NodeTest, node: &XNode<'_>) -> bool {
    match test {
        NodeTest::AnyNode => true,
        NodeTest::Wildcard => is_principal(axis, node),
        NodeTest::PrefixWildcard(prefix) => {
            is_principal(axis, node)
                && matches!(node, XNode::Tree(n) if n.prefix() == prefix)
        }
        NodeTest::Name { prefix, local } => {
            if !is_principal(axis, node) {
                return false;
            }
            match node {
                XNode::Tree(n) => n
                    .name()
                    .is_some_and(|q| q.prefix() == prefix && q.local() == local),
                // A namespace node's name is its prefix.
                XNode::Namespace { prefix: bound, .. } => prefix.is_empty() && bound == local,
            }
        }
        NodeTest::Text => matches!(
            node,
            XNode::Tree(n) if matches!(n.node_type(), NodeType::Text | NodeType::CData)
        ),
        NodeTest::Comment => {
            matches!(node, XNode::Tree(n) if n.node_type() == NodeType::Comment)
        }
        NodeTest::Pi(target) => match node {
            XNode::Tree(n) if n.node_type() == NodeType::ProcessingInstruction => match target {
                Some(t) => n.pi_target() == Some(t.as_str()),
                None => true,
            },
            _ => false,
        },
    }
}

/// Predicates are 1-indexed over the proximity order the axis produced.
fn apply_predicates<'a>(
    nodes: &[XNode<'a>],
    predicates: &[Expr],
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Vec<XNode<'a>>, XPathError> {
    let mut current = nodes.to_vec();
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::new();
        for (i, node) in current.iter().enumerate() {
            let predicate_ctx = EvaluationContext::new(
                node.clone(),
                e_ctx.root,
                i + 1,
                size,
                e_ctx.variables,
            );
            let result = evaluate(predicate, &predicate_ctx)?;
            let keep = match result {
                // A bare number selects by position.
                Value::Number(n) => (n as usize) == i + 1 && n.fract() == 0.0,
                other => other.to_bool(),
            };
            if keep {
                kept.push(node.clone());
            }
        }
        current = kept;
    }
    Ok(current)
}

/// Sorts into document order: pre-order over the tree, with namespace
/// nodes before attribute nodes before children of the owning element.
pub(crate) fn sort_document_order<'a>(nodes: &mut [XNode<'a>]) {
    if nodes.len() < 2 {
        return;
    }
    let doc = match &nodes[0] {
        XNode::Tree(n) => n.document(),
        XNode::Namespace { owner, .. } => owner.document(),
    };

    let mut rank: HashMap<NodeId, usize> = HashMap::new();
    let root = doc.root();
    for (i, n) in std::iter::once(root).chain(root.descendants()).enumerate() {
        rank.insert(n.id(), i);
    }

    nodes.sort_by_key(|node| order_key(node, &rank));
}

fn order_key(node: &XNode<'_>, rank: &HashMap<NodeId, usize>) -> (usize, u8, usize) {
    match node {
        XNode::Tree(n) => {
            if n.node_type() == NodeType::Attribute {
                match n.parent() {
                    Some(owner) => {
                        let idx = owner.attributes().position(|a| a == *n).unwrap_or(0);
                        (owner_rank(&owner, rank), 2, idx)
                    }
                    None => (usize::MAX, 2, 0),
                }
            } else {
                (rank.get(&n.id()).copied().unwrap_or(usize::MAX), 0, 0)
            }
        }
        XNode::Namespace { owner, prefix, .. } => {
            let idx = owner
                .namespaces_in_scope()
                .iter()
                .position(|(p, _)| p == prefix)
                .unwrap_or(0);
            (owner_rank(owner, rank), 1, idx)
        }
    }
}

fn owner_rank(owner: &Node<'_>, rank: &HashMap<NodeId, usize>) -> usize {
    rank.get(&owner.id()).copied().unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use xylem_dom::Document;

    fn build() -> Document {
        // <root><para id="p1">Hello</para><!--c--><div/><?pi v?><para>World</para></root>
        let mut doc = Document::new();
        let root = doc.create_element("root");
        doc.push_back(doc.root_id(), root).unwrap();

        let para1 = doc.create_element("para");
        doc.push_back(root, para1).unwrap();
        doc.set_attribute(para1, "id", "p1").unwrap();
        let t1 = doc.create_text("Hello");
        doc.push_back(para1, t1).unwrap();

        let comment = doc.create_comment("c");
        doc.push_back(root, comment).unwrap();
        let div = doc.create_element("div");
        doc.push_back(root, div).unwrap();
        let pi = doc.create_pi("pi", "v");
        doc.push_back(root, pi).unwrap();

        let para2 = doc.create_element("para");
        doc.push_back(root, para2).unwrap();
        let t2 = doc.create_text("World");
        doc.push_back(para2, t2).unwrap();
        doc
    }

    fn names(value: &Value<'_>) -> Vec<String> {
        match value {
            Value::Nodes(nodes) => nodes.iter().map(|n| n.qualified_name()).collect(),
            _ => panic!("expected a node-set"),
        }
    }

    #[test]
    fn child_axis_with_name_test() {
        let doc = build();
        let value = compile("root/para").unwrap().evaluate(doc.root()).unwrap();
        assert_eq!(names(&value), vec!["para", "para"]);
    }

    #[test]
    fn descendant_abbreviation_finds_all() {
        let doc = build();
        let value = compile("//para").unwrap().evaluate(doc.root()).unwrap();
        assert_eq!(names(&value), vec!["para", "para"]);

        // Evaluation from a nested node still restarts at the root.
        let div = crate::find(doc.root(), "//div").unwrap()[0];
        let value = compile("//para").unwrap().evaluate(div).unwrap();
        assert_eq!(names(&value), vec!["para", "para"]);
    }

    #[test]
    fn attribute_axis_and_predicate() {
        let doc = build();
        let value = compile("//para[@id='p1']").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].string_value(), "Hello");

        let value = compile("//para/@id").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].string_value(), "p1");
    }

    #[test]
    fn positional_predicates() {
        let doc = build();
        let value = compile("root/para[1]").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes[0].string_value(), "Hello");

        let value = compile("root/para[position()=2]").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes[0].string_value(), "World");

        let value = compile("root/para[last()]").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].string_value(), "World");
    }

    #[test]
    fn reverse_axis_counts_proximity() {
        let doc = build();
        // preceding-sibling::* of the last para, position 1, is the
        // nearest one: the div.
        let value = compile("//para[2]/preceding-sibling::*[1]")
            .unwrap()
            .evaluate(doc.root())
            .unwrap();
        assert_eq!(names(&value), vec!["div"]);
    }

    #[test]
    fn union_is_document_ordered_and_deduped() {
        let doc = build();
        let value = compile("//div | //para | root/para")
            .unwrap()
            .evaluate(doc.root())
            .unwrap();
        assert_eq!(names(&value), vec!["para", "div", "para"]);
    }

    #[test]
    fn node_type_tests() {
        let doc = build();
        let value = compile("root/comment()").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 1);

        let value = compile("root/processing-instruction('pi')")
            .unwrap()
            .evaluate(doc.root())
            .unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 1);

        let value = compile("root/processing-instruction('other')")
            .unwrap()
            .evaluate(doc.root())
            .unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert!(nodes.is_empty());

        let value = compile("//para/text()").unwrap().evaluate(doc.root()).unwrap();
        let Value::Nodes(nodes) = &value else { panic!() };
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn parent_and_ancestor_axes() {
        let doc = build();
        let value = compile("//para/..").unwrap().evaluate(doc.root()).unwrap();
        assert_eq!(names(&value), vec!["root"]);

        let value = compile("//para/text()/ancestor::*")
            .unwrap()
            .evaluate(doc.root())
            .unwrap();
        assert_eq!(names(&value), vec!["root", "para", "para"]);
    }

    #[test]
    fn arithmetic_and_comparisons() {
        let doc = build();
        let expr = compile("count(//para) + 1").unwrap();
        let Value::Number(n) = expr.evaluate(doc.root()).unwrap() else { panic!() };
        assert_eq!(n, 3.0);

        let expr = compile("count(//para) > 1 and count(//div) = 1").unwrap();
        assert!(expr.evaluate(doc.root()).unwrap().to_bool());

        let expr = compile("6 mod 4").unwrap();
        let Value::Number(n) = expr.evaluate(doc.root()).unwrap() else { panic!() };
        assert_eq!(n, 2.0);

        let expr = compile("5 div 2").unwrap();
        let Value::Number(n) = expr.evaluate(doc.root()).unwrap() else { panic!() };
        assert_eq!(n, 2.5);
    }

    #[test]
    fn variables_resolve_or_error() {
        let doc = build();
        let mut vars = HashMap::new();
        vars.insert("min".to_string(), Value::Number(1.0));
        let expr = compile("count(//para) > $min").unwrap();
        assert!(expr.evaluate_with(doc.root(), &vars).unwrap().to_bool());

        let err = expr.evaluate(doc.root()).unwrap_err();
        assert_eq!(err, XPathError::UnknownVariable("min".to_string()));

        // The compiled expression survives the failed evaluation.
        assert!(expr.evaluate_with(doc.root(), &vars).unwrap().to_bool());
    }

    #[test]
    fn string_value_comparisons() {
        let doc = build();
        let expr = compile("//para[.='World']").unwrap();
        let Value::Nodes(nodes) = expr.evaluate(doc.root()).unwrap() else { panic!() };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].string_value(), "World");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(5.0), "5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }
}
