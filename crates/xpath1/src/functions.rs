//! The XPath 1.0 core function library.

use xylem_dom::NodeType;

use crate::engine::{EvaluationContext, Value, XNode, number_to_string};
use crate::error::XPathError;

/// Dispatches a function call to its implementation.
pub fn evaluate_function<'a>(
    name: &str,
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    match name {
        // Node-set
        "last" => func_last(args, e_ctx),
        "position" => func_position(args, e_ctx),
        "count" => func_count(args),
        "id" => func_id(args, e_ctx),
        "local-name" => func_local_name(args, e_ctx),
        "namespace-uri" => func_namespace_uri(args, e_ctx),
        "name" => func_name(args, e_ctx),

        // String
        "string" => func_string(args, e_ctx),
        "concat" => func_concat(args),
        "starts-with" => func_starts_with(args),
        "contains" => func_contains(args),
        "substring-before" => func_substring_before(args),
        "substring-after" => func_substring_after(args),
        "substring" => func_substring(args),
        "string-length" => func_string_length(args, e_ctx),
        "normalize-space" => func_normalize_space(args, e_ctx),
        "translate" => func_translate(args),

        // Boolean
        "boolean" => func_boolean(args),
        "not" => func_not(args),
        "true" => func_true(args),
        "false" => func_false(args),
        "lang" => func_lang(args, e_ctx),

        // Number
        "number" => func_number(args, e_ctx),
        "sum" => func_sum(args),
        "floor" => func_floor(args),
        "ceiling" => func_ceiling(args),
        "round" => func_round(args),

        _ => Err(XPathError::Function {
            function: name.to_string(),
            message: "unknown XPath function".to_string(),
        }),
    }
}

fn arity(function: &str, args: &[Value<'_>], expected: std::ops::RangeInclusive<usize>) -> Result<(), XPathError> {
    if expected.contains(&args.len()) {
        Ok(())
    } else {
        Err(XPathError::Function {
            function: function.to_string(),
            message: format!(
                "expected {} to {} arguments, got {}",
                expected.start(),
                expected.end(),
                args.len()
            ),
        })
    }
}

fn node_set_arg<'a>(function: &str, value: Value<'a>) -> Result<Vec<XNode<'a>>, XPathError> {
    match value {
        Value::Nodes(nodes) => Ok(nodes),
        other => Err(XPathError::Type(format!(
            "{function}() requires a node-set, got {}",
            other.type_name()
        ))),
    }
}

/// The node an optional node-set argument designates: the argument's
/// first node in document order, or the context node without arguments.
fn optional_node_arg<'a>(
    function: &str,
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Option<XNode<'a>>, XPathError> {
    arity(function, &args, 0..=1)?;
    if args.is_empty() {
        Ok(Some(e_ctx.context_node.clone()))
    } else {
        Ok(node_set_arg(function, args.remove(0))?.into_iter().next())
    }
}

/// `floor(x + 0.5)`, which is how XPath rounds everywhere.
fn xpath_round(x: f64) -> f64 {
    if x.is_nan() || x.is_infinite() {
        x
    } else {
        (x + 0.5).floor()
    }
}

// --- Node-set functions ---

fn func_last<'a>(
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("last", &args, 0..=0)?;
    Ok(Value::Number(e_ctx.size as f64))
}

fn func_position<'a>(
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("position", &args, 0..=0)?;
    Ok(Value::Number(e_ctx.position as f64))
}

fn func_count<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("count", &args, 1..=1)?;
    let nodes = node_set_arg("count", args.remove(0))?;
    Ok(Value::Number(nodes.len() as f64))
}

fn func_id<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("id", &args, 1..=1)?;

    let mut tokens: Vec<String> = Vec::new();
    match args.remove(0) {
        Value::Nodes(nodes) => {
            for node in nodes {
                tokens.extend(node.string_value().split_whitespace().map(str::to_string));
            }
        }
        other => {
            tokens.extend(other.into_string().split_whitespace().map(str::to_string));
        }
    }

    // ID-typed attributes come from the DTD; xml:id counts as well.
    let mut result = Vec::new();
    for node in std::iter::once(e_ctx.root).chain(e_ctx.root.descendants()) {
        if node.node_type() != NodeType::Element {
            continue;
        }
        let is_match = node.attributes().any(|attr| {
            let declared_id = attr.is_id_attribute()
                || attr.name().is_some_and(|q| q.prefix() == "xml" && q.local() == "id");
            declared_id && attr.text().is_some_and(|v| tokens.iter().any(|t| t == v))
        });
        if is_match {
            result.push(XNode::Tree(node));
        }
    }
    Ok(Value::Nodes(result))
}

fn func_local_name<'a>(
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    let node = optional_node_arg("local-name", args, e_ctx)?;
    Ok(Value::String(node.map(|n| n.local_name()).unwrap_or_default()))
}

fn func_namespace_uri<'a>(
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    let node = optional_node_arg("namespace-uri", args, e_ctx)?;
    Ok(Value::String(
        node.and_then(|n| n.namespace_uri()).unwrap_or_default(),
    ))
}

fn func_name<'a>(
    args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    let node = optional_node_arg("name", args, e_ctx)?;
    Ok(Value::String(
        node.map(|n| n.qualified_name()).unwrap_or_default(),
    ))
}

// --- String functions ---

fn func_string<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("string", &args, 0..=1)?;
    let s = if args.is_empty() {
        e_ctx.context_node.string_value()
    } else {
        args.remove(0).into_string()
    };
    Ok(Value::String(s))
}

fn func_concat<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    if args.len() < 2 {
        return Err(XPathError::Function {
            function: "concat".to_string(),
            message: "expected at least 2 arguments".to_string(),
        });
    }
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.into_string());
    }
    Ok(Value::String(out))
}

fn two_strings<'a>(
    function: &str,
    mut args: Vec<Value<'a>>,
) -> Result<(String, String), XPathError> {
    arity(function, &args, 2..=2)?;
    let second = args.remove(1).into_string();
    let first = args.remove(0).into_string();
    Ok((first, second))
}

fn func_starts_with<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    let (s, prefix) = two_strings("starts-with", args)?;
    Ok(Value::Boolean(s.starts_with(&prefix)))
}

fn func_contains<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    let (s, needle) = two_strings("contains", args)?;
    Ok(Value::Boolean(s.contains(&needle)))
}

fn func_substring_before<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    let (s, sep) = two_strings("substring-before", args)?;
    Ok(Value::String(
        s.find(&sep).map(|i| s[..i].to_string()).unwrap_or_default(),
    ))
}

fn func_substring_after<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    let (s, sep) = two_strings("substring-after", args)?;
    Ok(Value::String(
        s.find(&sep)
            .map(|i| s[i + sep.len()..].to_string())
            .unwrap_or_default(),
    ))
}

fn func_substring<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("substring", &args, 2..=3)?;
    let length = if args.len() == 3 {
        Some(args.remove(2).to_number())
    } else {
        None
    };
    let start = args.remove(1).to_number();
    let s = args.remove(0).into_string();

    let first = xpath_round(start);
    let last = length.map(|l| first + xpath_round(l));

    // 1-based character positions; NaN comparisons are false, which
    // yields the empty string the spec asks for.
    let out: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && last.map_or(true, |l| pos < l)
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Value::String(out))
}

fn func_string_length<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("string-length", &args, 0..=1)?;
    let s = if args.is_empty() {
        e_ctx.context_node.string_value()
    } else {
        args.remove(0).into_string()
    };
    Ok(Value::Number(s.chars().count() as f64))
}

fn func_normalize_space<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("normalize-space", &args, 0..=1)?;
    let s = if args.is_empty() {
        e_ctx.context_node.string_value()
    } else {
        args.remove(0).into_string()
    };
    Ok(Value::String(
        s.split_whitespace().collect::<Vec<_>>().join(" "),
    ))
}

fn func_translate<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("translate", &args, 3..=3)?;
    let to: Vec<char> = args.remove(2).into_string().chars().collect();
    let from: Vec<char> = args.remove(1).into_string().chars().collect();
    let s = args.remove(0).into_string();

    let out: String = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(Value::String(out))
}

// --- Boolean functions ---

fn func_boolean<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("boolean", &args, 1..=1)?;
    let b = args.remove(0).to_bool();
    Ok(Value::Boolean(b))
}

fn func_not<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("not", &args, 1..=1)?;
    let b = args.remove(0).to_bool();
    Ok(Value::Boolean(!b))
}

fn func_true<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("true", &args, 0..=0)?;
    Ok(Value::Boolean(true))
}

fn func_false<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("false", &args, 0..=0)?;
    Ok(Value::Boolean(false))
}

fn func_lang<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("lang", &args, 1..=1)?;
    let wanted = args.remove(0).into_string();

    // The nearest xml:lang on the ancestor-or-self chain decides.
    let mut current = match &e_ctx.context_node {
        XNode::Tree(n) => Some(*n),
        XNode::Namespace { owner, .. } => Some(*owner),
    };
    while let Some(node) = current {
        if node.node_type() == NodeType::Element {
            let lang = node.attributes().find_map(|attr| {
                attr.name()
                    .filter(|q| q.prefix() == "xml" && q.local() == "lang")
                    .and_then(|_| attr.text())
            });
            if let Some(lang) = lang {
                let matches = lang.eq_ignore_ascii_case(&wanted)
                    || (lang.len() > wanted.len()
                        && lang.as_bytes().get(wanted.len()) == Some(&b'-')
                        && lang[..wanted.len()].eq_ignore_ascii_case(&wanted));
                return Ok(Value::Boolean(matches));
            }
        }
        current = node.parent();
    }
    Ok(Value::Boolean(false))
}

// --- Number functions ---

fn func_number<'a>(
    mut args: Vec<Value<'a>>,
    e_ctx: &EvaluationContext<'a, '_>,
) -> Result<Value<'a>, XPathError> {
    arity("number", &args, 0..=1)?;
    let n = if args.is_empty() {
        Value::String(e_ctx.context_node.string_value()).to_number()
    } else {
        args.remove(0).to_number()
    };
    Ok(Value::Number(n))
}

fn func_sum<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("sum", &args, 1..=1)?;
    let nodes = node_set_arg("sum", args.remove(0))?;
    let total = nodes
        .iter()
        .map(|n| Value::String(n.string_value()).to_number())
        .sum();
    Ok(Value::Number(total))
}

fn func_floor<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("floor", &args, 1..=1)?;
    let n = args.remove(0).to_number();
    Ok(Value::Number(n.floor()))
}

fn func_ceiling<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("ceiling", &args, 1..=1)?;
    let n = args.remove(0).to_number();
    Ok(Value::Number(n.ceil()))
}

fn func_round<'a>(mut args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
    arity("round", &args, 1..=1)?;
    let n = args.remove(0).to_number();
    Ok(Value::Number(xpath_round(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use std::collections::HashMap;
    use xylem_dom::Document;

    fn build() -> Document {
        // <r xml:lang="en"><n>3</n><n>4.5</n><s>  a  b </s></r>
        let mut doc = Document::new();
        let r = doc.create_element("r");
        doc.push_back(doc.root_id(), r).unwrap();
        doc.set_attribute(r, "xml:lang", "en").unwrap();
        for value in ["3", "4.5"] {
            let n = doc.create_element("n");
            doc.push_back(r, n).unwrap();
            let t = doc.create_text(value);
            doc.push_back(n, t).unwrap();
        }
        let s = doc.create_element("s");
        doc.push_back(r, s).unwrap();
        let t = doc.create_text("  a  b ");
        doc.push_back(s, t).unwrap();
        doc
    }

    fn eval<'a>(doc: &'a Document, expr: &str) -> Value<'a> {
        compile(expr).unwrap().evaluate(doc.root()).unwrap()
    }

    fn eval_str(doc: &Document, expr: &str) -> String {
        eval(doc, expr).into_string()
    }

    fn eval_num(doc: &Document, expr: &str) -> f64 {
        match eval(doc, expr) {
            Value::Number(n) => n,
            other => panic!("expected a number, got {}", other.type_name()),
        }
    }

    #[test]
    fn string_functions() {
        let doc = build();
        assert_eq!(eval_str(&doc, "concat('a', 'b', 'c')"), "abc");
        assert_eq!(eval_str(&doc, "substring('12345', 2, 3)"), "234");
        assert_eq!(eval_str(&doc, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval_str(&doc, "substring('12345', 0)"), "12345");
        assert_eq!(eval_str(&doc, "substring('12345', 0 div 0, 3)"), "");
        assert_eq!(eval_str(&doc, "substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(eval_str(&doc, "substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(eval_str(&doc, "normalize-space('  a   b  ')"), "a b");
        assert_eq!(eval_str(&doc, "translate('bar', 'abc', 'ABC')"), "BAr");
        assert_eq!(eval_str(&doc, "translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert!(eval(&doc, "starts-with('xylem', 'xy')").to_bool());
        assert!(eval(&doc, "contains('xylem', 'le')").to_bool());
        assert_eq!(eval_num(&doc, "string-length('héllo')"), 5.0);
    }

    #[test]
    fn number_functions() {
        let doc = build();
        assert_eq!(eval_num(&doc, "sum(//n)"), 7.5);
        assert_eq!(eval_num(&doc, "floor(2.7)"), 2.0);
        assert_eq!(eval_num(&doc, "ceiling(2.1)"), 3.0);
        assert_eq!(eval_num(&doc, "round(2.5)"), 3.0);
        assert_eq!(eval_num(&doc, "round(-2.5)"), -2.0);
        assert_eq!(eval_num(&doc, "number('4.5')"), 4.5);
        assert!(eval_num(&doc, "number('abc')").is_nan());
    }

    #[test]
    fn boolean_functions() {
        let doc = build();
        assert!(eval(&doc, "true()").to_bool());
        assert!(!eval(&doc, "false()").to_bool());
        assert!(eval(&doc, "not(false())").to_bool());
        assert!(eval(&doc, "boolean(//n)").to_bool());
        assert!(!eval(&doc, "boolean(//missing)").to_bool());
    }

    #[test]
    fn lang_checks_ancestors_case_insensitively() {
        let doc = build();
        let n = crate::find(doc.root(), "//n").unwrap()[0];
        let vars = HashMap::new();
        let expr = compile("lang('EN')").unwrap();
        assert!(expr.evaluate_with(n, &vars).unwrap().to_bool());
        assert!(!compile("lang('de')").unwrap().evaluate(n).unwrap().to_bool());
    }

    #[test]
    fn name_functions_on_context() {
        let doc = build();
        let n = crate::find(doc.root(), "//s").unwrap()[0];
        assert_eq!(compile("local-name()").unwrap().evaluate(n).unwrap().into_string(), "s");
        assert_eq!(compile("name()").unwrap().evaluate(n).unwrap().into_string(), "s");
        assert_eq!(
            compile("namespace-uri()").unwrap().evaluate(n).unwrap().into_string(),
            ""
        );
        assert_eq!(
            compile("local-name(//missing)").unwrap().evaluate(n).unwrap().into_string(),
            ""
        );
    }

    #[test]
    fn count_rejects_non_node_sets() {
        let doc = build();
        let err = compile("count('x')").unwrap().evaluate(doc.root()).unwrap_err();
        assert!(matches!(err, XPathError::Type(_)));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let doc = build();
        let err = compile("nonesuch()").unwrap().evaluate(doc.root()).unwrap_err();
        assert!(matches!(err, XPathError::Function { .. }));
    }
}
