//! Compiled form of an XPath 1.0 expression.
//!
//! [`Expr`] is what the expression parser produces and what the engine
//! walks. Location paths keep the shape of the grammar: an origin (the
//! context node, the document root, or a filter expression) followed by a
//! list of steps, each step an axis, a node test and its predicates.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Path(Path),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Unary minus, the only prefix operator in the language.
    Negate(Box<Expr>),
}

/// Binary operators, named after their effect rather than their token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

/// Where a location path starts.
#[derive(Debug, Clone, PartialEq)]
pub enum PathOrigin {
    /// A relative path: evaluation starts at the context node.
    Context,
    /// An absolute path (`/...`): evaluation starts at the document root.
    Root,
    /// A filter start, as in `$var/item` or `id('a')/title`.
    Filter(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub origin: PathOrigin,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    /// The step `//` abbreviates: `descendant-or-self::node()`.
    pub(crate) fn any_descendant_or_self() -> Step {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

/// The thirteen axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    SelfNode,
    Child,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
}

impl Axis {
    /// Reverse axes order their proximity positions back-to-front
    /// through the document.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

/// What a step keeps of the nodes its axis produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `foo` or `z:foo`, matched against the written name.
    Name { prefix: String, local: String },
    /// `*`
    Wildcard,
    /// `z:*`
    PrefixWildcard(String),
    /// `node()`
    AnyNode,
    /// `text()`; CDATA sections count as text.
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`, optionally pinned to one target.
    Pi(Option<String>),
}

impl NodeTest {
    pub fn named(prefix: impl Into<String>, local: impl Into<String>) -> NodeTest {
        NodeTest::Name {
            prefix: prefix.into(),
            local: local.into(),
        }
    }
}
