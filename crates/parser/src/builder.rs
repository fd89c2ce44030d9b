//! Materializes parser events into a [`xylem_dom::Document`].

use xylem_dom::{Doctype, Document, NodeId, QName};

use crate::error::ParseError;
use crate::events::{EntityResolver, SaxAttribute, SaxHandler};
use crate::parser::{Parser, ParserOptions};

/// A [`SaxHandler`] that builds the DOM: a stack of open elements, with
/// adjacent character data coalesced into single text nodes.
pub struct DocumentBuilder {
    doc: Document,
    stack: Vec<NodeId>,
    text: String,
    preserve_cdata: bool,
}

impl DocumentBuilder {
    pub fn new(preserve_cdata: bool) -> DocumentBuilder {
        let doc = Document::new();
        let root = doc.root_id();
        DocumentBuilder {
            doc,
            stack: vec![root],
            text: String::new(),
            preserve_cdata,
        }
    }

    pub fn into_document(mut self) -> Document {
        self.flush_text();
        self.doc
    }

    fn top(&self) -> NodeId {
        *self.stack.last().unwrap_or(&self.doc.root_id())
    }

    fn append(&mut self, node: NodeId) {
        if let Err(e) = self.doc.push_back(self.top(), node) {
            // The parser enforces document structure before events fire.
            log::warn!("builder dropped a node: {e}");
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        // Stray whitespace between top-level constructs has no home in
        // the tree.
        if self.stack.len() == 1 && text.trim().is_empty() {
            return;
        }
        let node = self.doc.create_text(text);
        self.append(node);
    }
}

impl SaxHandler for DocumentBuilder {
    fn doctype_decl(&mut self, root: &str, public_id: Option<&str>, system_id: Option<&str>) {
        self.doc.set_doctype(Doctype {
            root_name: root.to_string(),
            public_id: public_id.map(str::to_string),
            system_id: system_id.map(str::to_string),
        });
    }

    fn start_element(
        &mut self,
        name: &QName,
        _namespace_uri: Option<&str>,
        attributes: &[SaxAttribute],
    ) {
        self.flush_text();
        let element = self.doc.create_element(name.clone());
        for attr in attributes {
            match self.doc.set_attribute(element, attr.name.clone(), attr.value.clone()) {
                Ok((id, _)) if attr.is_id => self.doc.mark_id_attribute(id),
                Ok(_) => {}
                Err(e) => log::warn!("builder dropped attribute '{}': {e}", attr.name),
            }
        }
        self.append(element);
        self.stack.push(element);
    }

    fn end_element(&mut self, _name: &QName) {
        self.flush_text();
        self.stack.pop();
    }

    fn characters(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn start_cdata(&mut self) {
        if self.preserve_cdata {
            self.flush_text();
        }
    }

    fn end_cdata(&mut self) {
        if self.preserve_cdata {
            let text = std::mem::take(&mut self.text);
            let node = self.doc.create_cdata(text);
            self.append(node);
        }
    }

    fn comment(&mut self, text: &str) {
        self.flush_text();
        let node = self.doc.create_comment(text);
        self.append(node);
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.flush_text();
        let node = self.doc.create_pi(target, data);
        self.append(node);
    }
}

/// Parses a string into a document with default options.
pub fn parse_str(text: &str) -> Result<Document, ParseError> {
    parse_str_with(text, ParserOptions::default(), None)
}

/// Parses a string with explicit options and an optional entity resolver.
/// A parse failure discards the partially built tree.
pub fn parse_str_with(
    text: &str,
    options: ParserOptions,
    resolver: Option<Box<dyn EntityResolver + '_>>,
) -> Result<Document, ParseError> {
    let mut builder = DocumentBuilder::new(options.preserve_cdata);
    let mut parser = Parser::with_options(text, &mut builder, options);
    if let Some(resolver) = resolver {
        parser.set_resolver(resolver);
    }
    parser.parse()?;
    Ok(builder.into_document())
}

/// Decodes raw bytes (BOM / declaration sniffing) and parses them.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, ParseError> {
    parse_bytes_with(bytes, ParserOptions::default(), None)
}

pub fn parse_bytes_with(
    bytes: &[u8],
    options: ParserOptions,
    resolver: Option<Box<dyn EntityResolver + '_>>,
) -> Result<Document, ParseError> {
    let text = xylem_text::decode(bytes)?;
    parse_str_with(&text, options, resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validating() -> ParserOptions {
        ParserOptions {
            validate: true,
            ..Default::default()
        }
    }

    #[test]
    fn builds_a_simple_tree() {
        let doc = parse_str(r#"<persons><person id="1"><firstname>John</firstname></person></persons>"#)
            .unwrap();
        let persons = doc.root_element().unwrap();
        assert_eq!(persons.local_name(), "persons");
        let person = persons.child_elements().next().unwrap();
        assert_eq!(person.get_attribute("id"), Some("1"));
        let first = person.child_elements().next().unwrap();
        assert_eq!(first.string_value(), "John");
    }

    #[test]
    fn normalizes_crlf_in_text() {
        let doc = parse_str("<a>line1\r\nline2\rline3</a>").unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "line1\nline2\nline3");
    }

    #[test]
    fn expands_predefined_entities_and_char_refs() {
        let doc = parse_str("<a>&lt;tag&gt; &amp; &#65;&#x42;</a>").unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "<tag> & AB");
    }

    #[test]
    fn expands_internal_entities_from_the_dtd() {
        let doc = parse_str(
            "<!DOCTYPE foo [<!ENTITY hello \"Hello, world!\">]>\
             <foo><bar>&hello;</bar></foo>",
        )
        .unwrap();
        let bar = doc.root_element().unwrap().child_elements().next().unwrap();
        assert_eq!(bar.string_value(), "Hello, world!");
    }

    #[test]
    fn entity_expansion_can_contain_markup() {
        let doc = parse_str(
            "<!DOCTYPE a [<!ENTITY wrapped \"<b>inner</b>\">]>\
             <a>&wrapped;</a>",
        )
        .unwrap();
        let b = doc.root_element().unwrap().child_elements().next().unwrap();
        assert_eq!(b.local_name(), "b");
        assert_eq!(b.string_value(), "inner");
    }

    #[test]
    fn rejects_recursive_entities() {
        let err = parse_str(
            "<!DOCTYPE a [<!ENTITY x \"&y;\"><!ENTITY y \"&x;\">]>\
             <a>&x;</a>",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::RecursiveEntity { .. }));
    }

    #[test]
    fn rejects_undefined_entities() {
        let err = parse_str("<a>&nope;</a>").unwrap_err();
        assert!(matches!(err, ParseError::UndefinedEntity { name, .. } if name == "nope"));
    }

    #[test]
    fn rejects_mismatched_tags() {
        let err = parse_str("<a><b></a></b>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));
    }

    #[test]
    fn rejects_duplicate_attributes() {
        let err = parse_str(r#"<a x="1" x="2"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { message, .. }
            if message.contains("duplicate attribute")));
    }

    #[test]
    fn rejects_second_root_and_stray_text() {
        let err = parse_str("<a/><b/>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { message, .. }
            if message.contains("more than one root")));

        let err = parse_str("<a/>junk").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));

        let err = parse_str("junk<a/>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));
    }

    #[test]
    fn rejects_cdata_end_in_text() {
        let err = parse_str("<a>bad ]]> text</a>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { message, .. }
            if message.contains("]]>")));

        // As character references it is fine.
        let doc = parse_str("<a>ok &#93;&#93;&#62; text</a>").unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "ok ]]> text");
    }

    #[test]
    fn cdata_sections_merge_into_text_by_default() {
        let doc = parse_str("<a>one <![CDATA[<raw> & ]]]> two</a>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.children().count(), 1);
        assert_eq!(root.string_value(), "one <raw> & ] two");
    }

    #[test]
    fn cdata_sections_survive_when_preserved() {
        let options = ParserOptions {
            preserve_cdata: true,
            ..Default::default()
        };
        let doc = parse_str_with("<a>one <![CDATA[<raw>]]> two</a>", options, None).unwrap();
        let root = doc.root_element().unwrap();
        let kinds: Vec<_> = root.children().map(|n| n.node_type()).collect();
        assert_eq!(
            kinds,
            vec![
                xylem_dom::NodeType::Text,
                xylem_dom::NodeType::CData,
                xylem_dom::NodeType::Text
            ]
        );
        assert_eq!(root.string_value(), "one <raw> two");
    }

    #[test]
    fn keeps_comments_and_pis_in_order() {
        let doc = parse_str("<?pi data?><!-- head --><a><!-- in --><?p q?></a><!-- tail -->").unwrap();
        let top: Vec<_> = doc.root().children().map(|n| n.node_type()).collect();
        assert_eq!(
            top,
            vec![
                xylem_dom::NodeType::ProcessingInstruction,
                xylem_dom::NodeType::Comment,
                xylem_dom::NodeType::Element,
                xylem_dom::NodeType::Comment
            ]
        );
        let a = doc.root_element().unwrap();
        assert_eq!(a.children().count(), 2);
    }

    #[test]
    fn attribute_values_normalize_whitespace_and_refs() {
        let doc = parse_str("<a x=\"one\ttwo&#9;three\"/>").unwrap();
        // Literal tab becomes a space, the character reference stays a tab.
        assert_eq!(
            doc.root_element().unwrap().get_attribute("x"),
            Some("one two\tthree")
        );
    }

    #[test]
    fn attribute_entities_cannot_introduce_lt() {
        let err = parse_str(
            "<!DOCTYPE a [<!ENTITY bad \"a < b\">]>\
             <a x=\"&bad;\"/>",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));
    }

    #[test]
    fn doctype_is_recorded() {
        let doc = parse_str(
            "<!DOCTYPE foo PUBLIC \"-//X//DTD foo//EN\" \"foo.dtd\"><foo/>",
        )
        .unwrap();
        let doctype = doc.doctype().unwrap();
        assert_eq!(doctype.root_name, "foo");
        assert_eq!(doctype.public_id.as_deref(), Some("-//X//DTD foo//EN"));
        assert_eq!(doctype.system_id.as_deref(), Some("foo.dtd"));
    }

    #[test]
    fn validation_rejects_wrong_content() {
        let text = "<!DOCTYPE foo [\
                    <!ELEMENT foo (bar)>\
                    <!ELEMENT bar (#PCDATA)>\
                    ]><foo><baz/></foo>";
        let err = parse_str_with(text, validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }));

        // Without validation the same input parses.
        let doc = parse_str(text).unwrap();
        assert_eq!(doc.root_element().unwrap().child_elements().count(), 1);
    }

    #[test]
    fn validation_accepts_matching_content() {
        let text = "<!DOCTYPE foo [\
                    <!ELEMENT foo (bar+)>\
                    <!ELEMENT bar (#PCDATA)>\
                    ]><foo><bar>x</bar><bar>y</bar></foo>";
        let doc = parse_str_with(text, validating(), None).unwrap();
        assert_eq!(doc.root_element().unwrap().child_elements().count(), 2);
    }

    #[test]
    fn validation_rejects_incomplete_content() {
        let text = "<!DOCTYPE foo [\
                    <!ELEMENT foo (bar, baz)>\
                    <!ELEMENT bar EMPTY>\
                    <!ELEMENT baz EMPTY>\
                    ]><foo><bar/></foo>";
        let err = parse_str_with(text, validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }));
    }

    #[test]
    fn validation_rejects_char_data_in_element_content() {
        let text = "<!DOCTYPE foo [\
                    <!ELEMENT foo (bar)>\
                    <!ELEMENT bar EMPTY>\
                    ]><foo>stray<bar/></foo>";
        let err = parse_str_with(text, validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::InvalidContent { .. }));

        // Whitespace between children is always fine.
        let ok = "<!DOCTYPE foo [\
                  <!ELEMENT foo (bar)>\
                  <!ELEMENT bar EMPTY>\
                  ]><foo>\n  <bar/>\n</foo>";
        parse_str_with(ok, validating(), None).unwrap();
    }

    #[test]
    fn fixed_defaults_inject_and_enforce() {
        let dtd = "<!DOCTYPE e [\
                   <!ELEMENT e EMPTY>\
                   <!ATTLIST e x CDATA #FIXED \"v\">\
                   ]>";

        let doc = parse_str(&format!("{dtd}<e/>")).unwrap();
        assert_eq!(doc.root_element().unwrap().get_attribute("x"), Some("v"));

        let err = parse_str_with(&format!("{dtd}<e x=\"w\"/>"), validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }));

        let doc = parse_str_with(&format!("{dtd}<e x=\"v\"/>"), validating(), None).unwrap();
        assert_eq!(doc.root_element().unwrap().get_attribute("x"), Some("v"));
    }

    #[test]
    fn duplicate_ids_are_caught() {
        let text = "<!DOCTYPE r [\
                    <!ELEMENT r (e*)>\
                    <!ELEMENT e EMPTY>\
                    <!ATTLIST e k ID #REQUIRED>\
                    ]><r><e k=\"a\"/><e k=\"a\"/></r>";
        let err = parse_str_with(text, validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateId { id, .. } if id == "a"));

        // Not validating: parses, and the id flag is still applied.
        let doc = parse_str(text).unwrap();
        let first = doc.root_element().unwrap().child_elements().next().unwrap();
        assert!(first.attributes().next().unwrap().is_id_attribute());
    }

    #[test]
    fn non_cdata_attribute_values_collapse() {
        let text = "<!DOCTYPE e [\
                    <!ELEMENT e EMPTY>\
                    <!ATTLIST e refs IDREFS #IMPLIED>\
                    ]><e refs=\"  a   b  \"/>";
        let doc = parse_str(text).unwrap();
        assert_eq!(doc.root_element().unwrap().get_attribute("refs"), Some("a b"));
    }

    #[test]
    fn enumerated_attributes_check_membership() {
        let dtd = "<!DOCTYPE e [\
                   <!ELEMENT e EMPTY>\
                   <!ATTLIST e s (on|off) \"on\">\
                   ]>";
        let doc = parse_str(&format!("{dtd}<e/>")).unwrap();
        assert_eq!(doc.root_element().unwrap().get_attribute("s"), Some("on"));

        let err = parse_str_with(&format!("{dtd}<e s=\"dim\"/>"), validating(), None).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }));
    }

    #[test]
    fn namespace_scopes_are_enforced_when_asked() {
        let options = ParserOptions {
            validate_ns: true,
            ..Default::default()
        };
        let err = parse_str_with("<z:a xmlns:y=\"u\"/>", options, None).unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { message, .. }
            if message.contains("undeclared namespace prefix")));

        parse_str_with("<z:a xmlns:z=\"u\"><z:b/></z:a>", options, None).unwrap();

        // Without the knob the prefix is tolerated.
        parse_str("<z:a/>").unwrap();
    }

    #[test]
    fn xml_and_xmlns_prefixes_cannot_be_rebound() {
        let err = parse_str("<a xmlns:xml=\"urn:other\"/>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));

        let err = parse_str("<a xmlns:xmlns=\"urn:other\"/>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));

        // The canonical xml binding is allowed.
        parse_str("<a xmlns:xml=\"http://www.w3.org/XML/1998/namespace\"/>").unwrap();
    }

    #[test]
    fn parses_utf16_bytes() {
        let text = "<?xml version=\"1.0\"?><a>héllo</a>";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let doc = parse_bytes(&bytes).unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "héllo");
    }

    #[test]
    fn rejects_undecodable_bytes() {
        let err = parse_bytes(&[b'<', b'a', 0xC0, 0x80, b'>']).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding(_)));
    }

    #[test]
    fn resolves_external_entities_through_the_loader() {
        let text = "<!DOCTYPE a [<!ENTITY ext SYSTEM \"chunk.xml\">]><a>&ext;</a>";
        let resolver = |_: &str, _: &str, system: &str| -> std::io::Result<Option<Vec<u8>>> {
            Ok(if system == "chunk.xml" {
                Some(b"from outside".to_vec())
            } else {
                None
            })
        };
        let doc = parse_str_with(text, ParserOptions::default(), Some(Box::new(resolver))).unwrap();
        assert_eq!(doc.root_element().unwrap().string_value(), "from outside");

        // No resolver: dereferencing the entity is fatal.
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, ParseError::UndefinedEntity { .. }));
    }

    #[test]
    fn loads_the_external_subset_for_defaults() {
        let text = "<!DOCTYPE e SYSTEM \"e.dtd\"><e/>";
        let resolver = |_: &str, _: &str, system: &str| -> std::io::Result<Option<Vec<u8>>> {
            Ok(if system == "e.dtd" {
                Some(b"<!ELEMENT e EMPTY><!ATTLIST e x CDATA \"dflt\">".to_vec())
            } else {
                None
            })
        };
        let doc = parse_str_with(text, ParserOptions::default(), Some(Box::new(resolver))).unwrap();
        assert_eq!(doc.root_element().unwrap().get_attribute("x"), Some("dflt"));
    }

    #[test]
    fn parameter_entities_expand_in_the_internal_subset() {
        let text = "<!DOCTYPE e [\
                    <!ENTITY % model \"(a)\">\
                    <!ELEMENT e %model;>\
                    <!ELEMENT a EMPTY>\
                    ]><e><a/></e>";
        let doc = parse_str_with(text, validating(), None).unwrap();
        assert_eq!(doc.root_element().unwrap().child_elements().count(), 1);
    }

    #[test]
    fn xml_declaration_is_validated() {
        parse_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><a/>").unwrap();

        let err = parse_str("<?xml version=\"1.1\"?><a/>").unwrap_err();
        assert!(matches!(err, ParseError::NotWellFormed { .. }));
    }

    #[test]
    fn reports_locations_on_errors() {
        let err = parse_str("<a>\n  <b>\n</a>").unwrap_err();
        let ParseError::NotWellFormed { location, .. } = err else {
            panic!("expected NotWellFormed");
        };
        assert_eq!(location.line, 3);
    }

    #[test]
    fn invalidation_reports_flow_when_not_validating() {
        struct Collector {
            builder: DocumentBuilder,
            reports: Vec<String>,
        }
        impl SaxHandler for Collector {
            fn start_element(
                &mut self,
                name: &QName,
                uri: Option<&str>,
                attrs: &[SaxAttribute],
            ) {
                self.builder.start_element(name, uri, attrs);
            }
            fn end_element(&mut self, name: &QName) {
                self.builder.end_element(name);
            }
            fn report_invalid(&mut self, diagnostic: &crate::events::Invalidation) {
                self.reports.push(diagnostic.message.clone());
            }
        }

        let text = "<!DOCTYPE foo [\
                    <!ELEMENT foo (bar)>\
                    <!ELEMENT bar (#PCDATA)>\
                    ]><foo><baz/></foo>";
        let mut collector = Collector {
            builder: DocumentBuilder::new(false),
            reports: Vec::new(),
        };
        let parser = Parser::new(text, &mut collector);
        parser.parse().unwrap();
        assert!(collector.reports.iter().any(|m| m.contains("baz")));
    }
}
