//! End-to-end scenarios across the parser, validator and XPath engine.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use xylem::{ParseError, ParserOptions, Value, XmlError};

fn validating() -> ParserOptions {
    ParserOptions {
        validate: true,
        ..Default::default()
    }
}

#[test]
fn parse_query_and_serialize() {
    let input = r#"<persons><person id="1"><firstname>John</firstname></person></persons>"#;
    let doc = xylem::parse_str(input).unwrap();

    let persons = xylem::find(doc.root(), "//person").unwrap();
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].get_attribute("id"), Some("1"));

    assert_eq!(doc.to_string(), input);
}

#[test]
fn single_quoted_attributes_normalize_to_double() {
    let doc = xylem::parse_str("<person id='1'/>").unwrap();
    assert_eq!(doc.to_string(), r#"<person id="1"/>"#);
}

#[test]
fn namespace_uri_matching_with_a_variable() {
    let doc = xylem::parse_str(r#"<bar xmlns:z="u"><z:foo>x</z:foo></bar>"#).unwrap();

    let mut variables = HashMap::new();
    variables.insert("ns".to_string(), Value::String("u".to_string()));

    let result = xylem::evaluate_with(doc.root(), "//*[namespace-uri()=$ns]", &variables).unwrap();
    let Value::Nodes(nodes) = result else {
        panic!("expected a node-set");
    };
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].local_name(), "foo");
}

#[test]
fn dtd_validation_rejects_undeclared_children() {
    let input = "<!DOCTYPE foo [\
                 <!ELEMENT foo (bar)>\
                 <!ELEMENT bar (#PCDATA)>\
                 ]><foo><baz/></foo>";

    let err = xylem::parse_str_with(input, validating(), None).unwrap_err();
    assert!(matches!(err, XmlError::Parse(ParseError::Invalid { .. })));

    // With validation off the document parses and no InvalidContent is
    // raised.
    let doc = xylem::parse_str(input).unwrap();
    let baz = xylem::find(doc.root(), "/foo/baz").unwrap();
    assert_eq!(baz.len(), 1);
}

#[test]
fn internal_entities_expand_into_text() {
    let input = "<!DOCTYPE foo [<!ENTITY hello \"Hello, world!\">]>\
                 <foo><bar>&hello;</bar></foo>";
    let doc = xylem::parse_str(input).unwrap();

    let bar = xylem::find_first(doc.root(), "//bar").unwrap().unwrap();
    let text = bar.first_child().unwrap();
    assert_eq!(text.text(), Some("Hello, world!"));
}

#[test]
fn fixed_attribute_defaults_apply_and_bind() {
    let dtd = "<!DOCTYPE e [\
               <!ELEMENT e EMPTY>\
               <!ATTLIST e x CDATA #FIXED \"v\">\
               ]>";

    let doc = xylem::parse_str(&format!("{dtd}<e/>")).unwrap();
    let e = doc.root_element().unwrap();
    assert_eq!(e.get_attribute("x"), Some("v"));

    let err = xylem::parse_str_with(&format!("{dtd}<e x=\"w\"/>"), validating(), None).unwrap_err();
    assert!(matches!(err, XmlError::Parse(ParseError::Invalid { .. })));
}

#[test]
fn positional_predicates_and_count() {
    let doc = xylem::parse_str("<A><B/><B/><B/><B/><B/></A>").unwrap();

    let last = xylem::find(doc.root(), "//B[position()=last()]").unwrap();
    assert_eq!(last.len(), 1);

    let count = xylem::compile("count(//B)").unwrap().evaluate(doc.root()).unwrap();
    let Value::Number(n) = count else {
        panic!("expected a number");
    };
    assert_eq!(n, 5.0);

    let even = xylem::find(doc.root(), "//B[position() mod 2 = 0]").unwrap();
    assert_eq!(even.len(), 2);
}

#[test]
fn xpath_errors_do_not_abort_the_document() {
    let doc = xylem::parse_str("<a><b/></a>").unwrap();

    // A missing variable fails the evaluation only.
    let expr = xylem::compile("//b[@x=$missing]").unwrap();
    assert!(expr.evaluate(doc.root()).is_err());

    // The document and the compiled expression both remain usable.
    let mut variables = HashMap::new();
    variables.insert("missing".to_string(), Value::String("1".to_string()));
    assert!(expr.evaluate_with(doc.root(), &variables).is_ok());
    assert_eq!(xylem::find(doc.root(), "//b").unwrap().len(), 1);
}

#[test]
fn compile_errors_are_invalid_xpath() {
    let err = xylem::compile("//b[").unwrap_err();
    assert!(matches!(err, XmlError::XPath(xylem::XPathError::Parse(..))));
}
