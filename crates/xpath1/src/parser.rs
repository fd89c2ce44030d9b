//! Parses XPath 1.0 expression text into an [`Expr`] tree.
//!
//! Operator precedence runs through one table-driven level builder;
//! tokens and names are scanned by hand, with nom combinators covering
//! the bracketed parts (parentheses, predicates, argument lists).

use nom::{
    IResult, Parser,
    character::complete::{char, multispace0},
    multi::{many0, separated_list0},
    sequence::delimited,
};

use crate::ast::{Axis, BinOp, Expr, NodeTest, Path, PathOrigin, Step};
use crate::error::XPathError;

pub fn parse_expression(input: &str) -> Result<Expr, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => Err(XPathError::Parse(
            input.to_string(),
            format!("trailing input: '{rem}'"),
        )),
        Err(e) => Err(XPathError::Parse(input.to_string(), e.to_string())),
    }
}

fn fail<T>(input: &str, kind: nom::error::ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

// --- precedence levels, loosest binding first ---

const OR_OPS: &[(&str, BinOp)] = &[("or", BinOp::Or)];
const AND_OPS: &[(&str, BinOp)] = &[("and", BinOp::And)];
const EQUALITY_OPS: &[(&str, BinOp)] = &[("!=", BinOp::Ne), ("=", BinOp::Eq)];
// Two-character tokens before their one-character prefixes.
const RELATIONAL_OPS: &[(&str, BinOp)] = &[
    ("<=", BinOp::Le),
    (">=", BinOp::Ge),
    ("<", BinOp::Lt),
    (">", BinOp::Gt),
];
const ADDITIVE_OPS: &[(&str, BinOp)] = &[("+", BinOp::Add), ("-", BinOp::Sub)];
const MULTIPLICATIVE_OPS: &[(&str, BinOp)] = &[
    ("*", BinOp::Mul),
    ("div", BinOp::Div),
    ("mod", BinOp::Mod),
];
const UNION_OPS: &[(&str, BinOp)] = &[("|", BinOp::Union)];

/// Matches one operator token from a table. Word operators (`or`, `div`,
/// ...) must not run straight into a name character.
fn operator<'a>(input: &'a str, ops: &[(&str, BinOp)]) -> IResult<&'a str, BinOp> {
    for (token, op) in ops {
        let Some(rest) = input.strip_prefix(token) else {
            continue;
        };
        let word = token.chars().all(|c| c.is_ascii_alphabetic());
        if word && rest.starts_with(|c: char| xylem_text::is_name_char(c)) {
            continue;
        }
        return Ok((rest, *op));
    }
    fail(input, nom::error::ErrorKind::Tag)
}

/// One left-associative precedence level.
fn binary_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    ops: &[(&str, BinOp)],
) -> IResult<&'a str, Expr> {
    let (mut rest, mut left) = operand(input)?;
    loop {
        let Ok((after_op, op)) = operator(rest.trim_start(), ops) else {
            return Ok((rest, left));
        };
        let (after_rhs, right) = operand(after_op.trim_start())?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
        rest = after_rhs;
    }
}

fn expression(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, and_expr, OR_OPS)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, equality_expr, AND_OPS)
}

fn equality_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, relational_expr, EQUALITY_OPS)
}

fn relational_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, additive_expr, RELATIONAL_OPS)
}

fn additive_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, multiplicative_expr, ADDITIVE_OPS)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, unary_expr, MULTIPLICATIVE_OPS)
}

// UnaryExpr ::= UnionExpr | '-' UnaryExpr
fn unary_expr(input: &str) -> IResult<&str, Expr> {
    let trimmed = input.trim_start();
    if let Some(rest) = trimmed.strip_prefix('-') {
        let (rest, inner) = unary_expr(rest)?;
        return Ok((rest, Expr::Negate(Box::new(inner))));
    }
    union_expr(input)
}

fn union_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, path_expr, UNION_OPS)
}

// PathExpr ::= LocationPath | FilterExpr (('/' | '//') RelativeLocationPath)?
//
// Primary expressions go first: `position()` must reach the function-call
// parser before a location path could swallow `position` as a step name.
fn path_expr(input: &str) -> IResult<&str, Expr> {
    if let Ok((rest, expr)) = primary_expr(input) {
        let (rest, steps) = path_tail(rest)?;
        if steps.is_empty() {
            return Ok((rest, expr));
        }
        return Ok((
            rest,
            Expr::Path(Path {
                origin: PathOrigin::Filter(Box::new(expr)),
                steps,
            }),
        ));
    }
    let (rest, path) = location_path(input.trim_start())?;
    Ok((rest, Expr::Path(path)))
}

// LocationPath ::= RelativeLocationPath | AbsoluteLocationPath
fn location_path(input: &str) -> IResult<&str, Path> {
    let (rest, origin, mut steps) = if let Some(r) = input.strip_prefix("//") {
        let (r, s) = step(r)?;
        (r, PathOrigin::Root, vec![Step::any_descendant_or_self(), s])
    } else if let Some(r) = input.strip_prefix('/') {
        match step(r) {
            Ok((r, s)) => (r, PathOrigin::Root, vec![s]),
            // The whole path is just "/".
            Err(_) => (r, PathOrigin::Root, vec![]),
        }
    } else {
        let (r, s) = step(input)?;
        (r, PathOrigin::Context, vec![s])
    };

    let (rest, tail) = path_tail(rest)?;
    steps.extend(tail);
    Ok((rest, Path { origin, steps }))
}

/// `('/' | '//') Step` repetitions after a first step or filter.
fn path_tail(input: &str) -> IResult<&str, Vec<Step>> {
    let mut steps = Vec::new();
    let mut rest = input;
    loop {
        if let Some(r) = rest.strip_prefix("//") {
            let (r, s) = step(r)?;
            steps.push(Step::any_descendant_or_self());
            steps.push(s);
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            let (r, s) = step(r)?;
            steps.push(s);
            rest = r;
        } else {
            return Ok((rest, steps));
        }
    }
}

// Step ::= AxisSpecifier NodeTest Predicate* | AbbreviatedStep
fn step(input: &str) -> IResult<&str, Step> {
    let (rest, (axis, test)) = step_core(input)?;
    let (rest, predicates) = many0(predicate).parse(rest)?;
    Ok((
        rest,
        Step {
            axis,
            test,
            predicates,
        },
    ))
}

fn step_core(input: &str) -> IResult<&str, (Axis, NodeTest)> {
    // '..' and '.' abbreviate parent::node() and self::node().
    if let Some(rest) = input.strip_prefix("..") {
        return Ok((rest, (Axis::Parent, NodeTest::AnyNode)));
    }
    if let Some(rest) = input.strip_prefix('.') {
        return Ok((rest, (Axis::SelfNode, NodeTest::AnyNode)));
    }
    if let Some(rest) = input.strip_prefix('@') {
        let (rest, test) = node_test(rest)?;
        return Ok((rest, (Axis::Attribute, test)));
    }
    if let Ok((rest, axis)) = axis_specifier(input) {
        let (rest, test) = node_test(rest)?;
        return Ok((rest, (axis, test)));
    }
    let (rest, test) = node_test(input)?;
    Ok((rest, (Axis::Child, test)))
}

const AXES: &[(&str, Axis)] = &[
    ("ancestor-or-self", Axis::AncestorOrSelf),
    ("ancestor", Axis::Ancestor),
    ("attribute", Axis::Attribute),
    ("child", Axis::Child),
    ("descendant-or-self", Axis::DescendantOrSelf),
    ("descendant", Axis::Descendant),
    ("following-sibling", Axis::FollowingSibling),
    ("following", Axis::Following),
    ("namespace", Axis::Namespace),
    ("parent", Axis::Parent),
    ("preceding-sibling", Axis::PrecedingSibling),
    ("preceding", Axis::Preceding),
    ("self", Axis::SelfNode),
];

// AxisSpecifier ::= AxisName '::'
fn axis_specifier(input: &str) -> IResult<&str, Axis> {
    for (name, axis) in AXES {
        if let Some(rest) = input.strip_prefix(name) {
            if let Some(rest) = rest.strip_prefix("::") {
                return Ok((rest, *axis));
            }
        }
    }
    fail(input, nom::error::ErrorKind::Tag)
}

// NodeTest ::= NameTest | NodeType '(' ')' | 'processing-instruction' '(' Literal ')'
pub fn node_test(input: &str) -> IResult<&str, NodeTest> {
    if let Ok(parsed) = kind_test(input) {
        return Ok(parsed);
    }
    if let Some(rest) = input.strip_prefix('*') {
        return Ok((rest, NodeTest::Wildcard));
    }

    let (rest, first) = nc_name(input)?;
    if let Some(rest) = rest.strip_prefix(":*") {
        return Ok((rest, NodeTest::PrefixWildcard(first.to_string())));
    }
    if let Some(after_colon) = rest.strip_prefix(':') {
        let (rest, local) = nc_name(after_colon)?;
        return Ok((rest, NodeTest::named(first, local)));
    }
    Ok((rest, NodeTest::named("", first)))
}

/// `node()`, `text()`, `comment()` and the processing-instruction test.
/// A name is only a kind test when parentheses follow it.
fn kind_test(input: &str) -> IResult<&str, NodeTest> {
    let (rest, name) = nc_name(input)?;
    let Some(args) = rest.trim_start().strip_prefix('(') else {
        return fail(input, nom::error::ErrorKind::Tag);
    };
    let args = args.trim_start();

    match name {
        "node" | "text" | "comment" => {
            let Some(rest) = args.strip_prefix(')') else {
                return fail(input, nom::error::ErrorKind::Char);
            };
            let test = match name {
                "node" => NodeTest::AnyNode,
                "text" => NodeTest::Text,
                _ => NodeTest::Comment,
            };
            Ok((rest, test))
        }
        "processing-instruction" => {
            if let Some(rest) = args.strip_prefix(')') {
                return Ok((rest, NodeTest::Pi(None)));
            }
            let (rest, target) = string_literal(args)?;
            let Some(rest) = rest.trim_start().strip_prefix(')') else {
                return fail(input, nom::error::ErrorKind::Char);
            };
            Ok((rest, NodeTest::Pi(Some(target))))
        }
        _ => fail(input, nom::error::ErrorKind::Tag),
    }
}

// Predicate ::= '[' PredicateExpr ']'
fn predicate(input: &str) -> IResult<&str, Expr> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

// PrimaryExpr ::= VariableReference | '(' Expr ')' | Literal | Number | FunctionCall
fn primary_expr(input: &str) -> IResult<&str, Expr> {
    let trimmed = input.trim_start();

    if let Some(rest) = trimmed.strip_prefix('$') {
        let (rest, name) = q_name(rest)?;
        return Ok((rest, Expr::Variable(name)));
    }
    if trimmed.starts_with(['\'', '"']) {
        let (rest, value) = string_literal(trimmed)?;
        return Ok((rest, Expr::Literal(value)));
    }
    if trimmed.starts_with('(') {
        return delimited(ws(char('(')), expression, ws(char(')'))).parse(trimmed);
    }
    if let Ok((rest, value)) = number(trimmed) {
        return Ok((rest, Expr::Number(value)));
    }
    function_call(trimmed)
}

// FunctionCall ::= FunctionName '(' ( Argument ( ',' Argument )* )? ')'
fn function_call(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = q_name(input)?;
    // Parenthesized node tests belong to the step parser.
    if matches!(
        name.as_str(),
        "node" | "text" | "comment" | "processing-instruction"
    ) {
        return fail(input, nom::error::ErrorKind::Verify);
    }
    let Some(args_start) = rest.trim_start().strip_prefix('(') else {
        return fail(input, nom::error::ErrorKind::Char);
    };

    let (rest, args) = separated_list0(ws(char(',')), expression).parse(args_start)?;
    let Some(rest) = rest.trim_start().strip_prefix(')') else {
        return fail(input, nom::error::ErrorKind::Char);
    };
    Ok((rest, Expr::Call { name, args }))
}

// --- token scanners ---

// Number ::= Digits ('.' Digits?)? | '.' Digits
fn number(input: &str) -> IResult<&str, f64> {
    let bytes = input.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let int_digits = end;

    let mut frac_digits = 0;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut after = end + 1;
        while after < bytes.len() && bytes[after].is_ascii_digit() {
            after += 1;
        }
        frac_digits = after - end - 1;
        if int_digits > 0 || frac_digits > 0 {
            end = after;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return fail(input, nom::error::ErrorKind::Digit);
    }

    match input[..end].parse::<f64>() {
        Ok(value) => Ok((&input[end..], value)),
        Err(_) => fail(input, nom::error::ErrorKind::Float),
    }
}

// Literal ::= '"' [^"]* '"' | "'" [^']* "'"
fn string_literal(input: &str) -> IResult<&str, String> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return fail(input, nom::error::ErrorKind::Char),
    };
    let body = &input[1..];
    match body.find(quote) {
        Some(end) => Ok((&body[end + 1..], body[..end].to_string())),
        None => fail(input, nom::error::ErrorKind::Char),
    }
}

/// An XML Name without colons.
fn nc_name(input: &str) -> IResult<&str, &str> {
    match input.chars().next() {
        Some(c) if xylem_text::is_name_start_char(c) && c != ':' => {}
        _ => return fail(input, nom::error::ErrorKind::Alpha),
    }
    let end = input
        .char_indices()
        .find(|&(_, c)| !xylem_text::is_name_char(c) || c == ':')
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    Ok((&input[end..], &input[..end]))
}

/// A QName as written, for variable and function names.
fn q_name(input: &str) -> IResult<&str, String> {
    let (rest, first) = nc_name(input)?;
    if let Some(after_colon) = rest.strip_prefix(':') {
        if let Ok((rest, local)) = nc_name(after_colon) {
            return Ok((rest, format!("{first}:{local}")));
        }
    }
    Ok((rest, first.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_step(local: &str) -> Step {
        Step {
            axis: Axis::Child,
            test: NodeTest::named("", local),
            predicates: vec![],
        }
    }

    fn rel_path(steps: Vec<Step>) -> Expr {
        Expr::Path(Path {
            origin: PathOrigin::Context,
            steps,
        })
    }

    #[test]
    fn parses_simple_path() {
        let result = parse_expression("foo/bar").unwrap();
        assert_eq!(result, rel_path(vec![child_step("foo"), child_step("bar")]));
    }

    #[test]
    fn parses_prefixed_names_and_wildcards() {
        let result = parse_expression("z:foo/z:*/*").unwrap();
        let Expr::Path(path) = result else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].test, NodeTest::named("z", "foo"));
        assert_eq!(path.steps[1].test, NodeTest::PrefixWildcard("z".to_string()));
        assert_eq!(path.steps[2].test, NodeTest::Wildcard);
    }

    #[test]
    fn parses_unary_minus() {
        let result = parse_expression("-5").unwrap();
        assert_eq!(result, Expr::Negate(Box::new(Expr::Number(5.0))));

        let result = parse_expression("10 - -5").unwrap();
        assert_eq!(
            result,
            Expr::Binary(
                BinOp::Sub,
                Box::new(Expr::Number(10.0)),
                Box::new(Expr::Negate(Box::new(Expr::Number(5.0)))),
            )
        );
    }

    #[test]
    fn parses_number_forms() {
        assert_eq!(parse_expression("1.5").unwrap(), Expr::Number(1.5));
        assert_eq!(parse_expression(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse_expression("12.").unwrap(), Expr::Number(12.0));
    }

    #[test]
    fn parses_axes() {
        for (text, axis) in [
            ("following-sibling::foo", Axis::FollowingSibling),
            ("preceding::*", Axis::Preceding),
            ("ancestor-or-self::*", Axis::AncestorOrSelf),
            ("namespace::*", Axis::Namespace),
            ("self::node()", Axis::SelfNode),
        ] {
            let Expr::Path(path) = parse_expression(text).unwrap() else {
                panic!("expected a path for {text}");
            };
            assert_eq!(path.steps[0].axis, axis, "{text}");
        }
    }

    #[test]
    fn parses_path_starting_with_variable() {
        let result = parse_expression("$myVar/foo/bar").unwrap();
        assert_eq!(
            result,
            Expr::Path(Path {
                origin: PathOrigin::Filter(Box::new(Expr::Variable("myVar".to_string()))),
                steps: vec![child_step("foo"), child_step("bar")],
            })
        );
    }

    #[test]
    fn parses_variable_reference() {
        let result = parse_expression("$myVar").unwrap();
        assert_eq!(result, Expr::Variable("myVar".to_string()));

        let result = parse_expression("$myVar + 5").unwrap();
        assert_eq!(
            result,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Variable("myVar".to_string())),
                Box::new(Expr::Number(5.0)),
            )
        );
    }

    #[test]
    fn parses_attribute_predicate() {
        let result = parse_expression("foo[@id = 'a']").unwrap();
        let attr_path = rel_path(vec![Step {
            axis: Axis::Attribute,
            test: NodeTest::named("", "id"),
            predicates: vec![],
        }]);
        assert_eq!(
            result,
            rel_path(vec![Step {
                axis: Axis::Child,
                test: NodeTest::named("", "foo"),
                predicates: vec![Expr::Binary(
                    BinOp::Eq,
                    Box::new(attr_path),
                    Box::new(Expr::Literal("a".to_string())),
                )],
            }])
        );
    }

    #[test]
    fn parses_numeric_predicate() {
        let result = parse_expression("foo[1]").unwrap();
        assert_eq!(
            result,
            rel_path(vec![Step {
                axis: Axis::Child,
                test: NodeTest::named("", "foo"),
                predicates: vec![Expr::Number(1.0)],
            }])
        );
    }

    #[test]
    fn parses_function_in_predicate() {
        let result = parse_expression("para[position()=1]").unwrap();
        let Expr::Path(path) = result else {
            panic!("expected a path");
        };
        assert_eq!(path.steps.len(), 1);
        assert_eq!(path.steps[0].predicates.len(), 1);
        assert!(matches!(
            path.steps[0].predicates[0],
            Expr::Binary(BinOp::Eq, ..)
        ));
    }

    #[test]
    fn parses_node_type_tests() {
        let Expr::Path(path) = parse_expression("foo/text()").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[1].test, NodeTest::Text);

        let Expr::Path(path) = parse_expression("processing-instruction('target')").unwrap()
        else {
            panic!("expected a path");
        };
        assert_eq!(
            path.steps[0].test,
            NodeTest::Pi(Some("target".to_string()))
        );

        let Expr::Path(path) = parse_expression("comment()").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].test, NodeTest::Comment);
    }

    #[test]
    fn name_tests_shadowing_node_types_need_parentheses() {
        // An element named "text" is still addressable.
        let Expr::Path(path) = parse_expression("child::text").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].test, NodeTest::named("", "text"));
    }

    #[test]
    fn parses_abbreviated_steps() {
        let Expr::Path(path) = parse_expression(".").unwrap() else {
            panic!("expected a path for '.'");
        };
        assert_eq!(path.steps.len(), 1);
        assert_eq!(path.steps[0].axis, Axis::SelfNode);
        assert_eq!(path.steps[0].test, NodeTest::AnyNode);

        let Expr::Path(path) = parse_expression("../foo").unwrap() else {
            panic!("expected a path for '..'");
        };
        assert_eq!(path.steps[0].axis, Axis::Parent);
        assert_eq!(path.steps[1], child_step("foo"));
    }

    #[test]
    fn parses_operator_precedence() {
        let result = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            result,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Number(2.0)),
                    Box::new(Expr::Number(3.0)),
                )),
            )
        );
    }

    #[test]
    fn parses_boolean_precedence() {
        let result = parse_expression("a = b or c = d and e = f").unwrap();
        let Expr::Binary(BinOp::Or, _, right) = result else {
            panic!("expected or at the top");
        };
        assert!(matches!(*right, Expr::Binary(BinOp::And, ..)));
    }

    #[test]
    fn keyword_operators_require_a_break() {
        // "different" must not read as "div" plus a name.
        let result = parse_expression("different").unwrap();
        assert_eq!(result, rel_path(vec![child_step("different")]));

        let Expr::Binary(BinOp::Div, ..) = parse_expression("4 div 2").unwrap() else {
            panic!("expected div");
        };
    }

    #[test]
    fn parses_descendant_or_self_abbreviation() {
        let result = parse_expression("//foo").unwrap();
        assert_eq!(
            result,
            Expr::Path(Path {
                origin: PathOrigin::Root,
                steps: vec![Step::any_descendant_or_self(), child_step("foo")],
            })
        );
    }

    #[test]
    fn parses_union() {
        let result = parse_expression("a | b").unwrap();
        assert!(matches!(result, Expr::Binary(BinOp::Union, ..)));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_expression("foo bar").is_err());
        assert!(parse_expression("").is_err());
        assert!(parse_expression("foo[").is_err());
    }
}
