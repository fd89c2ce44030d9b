//! Binary operator evaluation, including the XPath 1.0 comparison rules
//! for node-sets (existential semantics).

use crate::ast::BinOp;
use crate::engine::{Value, XNode, sort_document_order};
use crate::error::XPathError;

pub fn evaluate<'a>(op: BinOp, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>, XPathError> {
    match op {
        BinOp::Or => Ok(Value::Boolean(left.to_bool() || right.to_bool())),
        BinOp::And => Ok(Value::Boolean(left.to_bool() && right.to_bool())),

        BinOp::Eq => Ok(Value::Boolean(compare_eq(&left, &right))),
        BinOp::Ne => Ok(Value::Boolean(compare_ne(&left, &right))),

        BinOp::Lt => Ok(Value::Boolean(compare_rel(&left, &right, |a, b| a < b))),
        BinOp::Le => Ok(Value::Boolean(compare_rel(&left, &right, |a, b| a <= b))),
        BinOp::Gt => Ok(Value::Boolean(compare_rel(&left, &right, |a, b| a > b))),
        BinOp::Ge => Ok(Value::Boolean(compare_rel(&left, &right, |a, b| a >= b))),

        BinOp::Add => Ok(Value::Number(left.to_number() + right.to_number())),
        BinOp::Sub => Ok(Value::Number(left.to_number() - right.to_number())),
        BinOp::Mul => Ok(Value::Number(left.to_number() * right.to_number())),
        BinOp::Div => Ok(Value::Number(left.to_number() / right.to_number())),
        BinOp::Mod => Ok(Value::Number(left.to_number() % right.to_number())),

        BinOp::Union => union(left, right),
    }
}

fn union<'a>(left: Value<'a>, right: Value<'a>) -> Result<Value<'a>, XPathError> {
    let (Value::Nodes(mut left), Value::Nodes(right)) = (left, right) else {
        return Err(XPathError::Type(
            "both operands of '|' must be node-sets".to_string(),
        ));
    };
    for node in right {
        if !left.contains(&node) {
            left.push(node);
        }
    }
    sort_document_order(&mut left);
    Ok(Value::Nodes(left))
}

/// `=` with node-set operands is existential: true when any pairing of
/// operand values compares equal.
fn compare_eq(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Nodes(l), Value::Nodes(r)) => {
            let right_values: Vec<String> = r.iter().map(XNode::string_value).collect();
            l.iter()
                .any(|n| right_values.iter().any(|v| *v == n.string_value()))
        }
        (Value::Nodes(nodes), other) | (other, Value::Nodes(nodes)) => match other {
            Value::Number(v) => nodes
                .iter()
                .any(|n| n.string_value().trim().parse::<f64>().is_ok_and(|x| x == *v)),
            Value::Boolean(b) => !nodes.is_empty() == *b,
            _ => {
                let s = other.clone().into_string();
                nodes.iter().any(|n| n.string_value() == s)
            }
        },
        (Value::Boolean(_), _) | (_, Value::Boolean(_)) => left.to_bool() == right.to_bool(),
        (Value::Number(_), _) | (_, Value::Number(_)) => left.to_number() == right.to_number(),
        (Value::String(l), Value::String(r)) => l == r,
    }
}

fn compare_ne(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        // Existential again: any pairing that differs.
        (Value::Nodes(l), Value::Nodes(r)) => {
            let right_values: Vec<String> = r.iter().map(XNode::string_value).collect();
            l.iter()
                .any(|n| right_values.iter().any(|v| *v != n.string_value()))
        }
        (Value::Nodes(nodes), other) | (other, Value::Nodes(nodes)) => match other {
            Value::Number(v) => nodes
                .iter()
                .any(|n| n.string_value().trim().parse::<f64>().map_or(true, |x| x != *v)),
            Value::Boolean(b) => !nodes.is_empty() != *b,
            _ => {
                let s = other.clone().into_string();
                nodes.iter().any(|n| n.string_value() != s)
            }
        },
        _ => !compare_eq(left, right),
    }
}

/// Relational comparison is numeric; node-set operands quantify
/// existentially.
fn compare_rel(left: &Value<'_>, right: &Value<'_>, cmp: fn(f64, f64) -> bool) -> bool {
    match (left, right) {
        (Value::Nodes(l), Value::Nodes(r)) => l.iter().any(|a| {
            let av = Value::String(a.string_value()).to_number();
            r.iter()
                .any(|b| cmp(av, Value::String(b.string_value()).to_number()))
        }),
        (Value::Nodes(nodes), other) => {
            let b = other.to_number();
            nodes
                .iter()
                .any(|n| cmp(Value::String(n.string_value()).to_number(), b))
        }
        (other, Value::Nodes(nodes)) => {
            let a = other.to_number();
            nodes
                .iter()
                .any(|n| cmp(a, Value::String(n.string_value()).to_number()))
        }
        _ => cmp(left.to_number(), right.to_number()),
    }
}
