//! The SAX-style event surface of the parser.
//!
//! The parser itself is a "dumb driver": every significant construct is
//! reported to a [`SaxHandler`], whose methods all default to doing
//! nothing so listeners only implement what they care about.

use std::io;

use xylem_dom::QName;
use xylem_dtd::NotationDecl;

use crate::error::Location;

/// One attribute of a start-element event, after entity expansion,
/// normalization and default injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaxAttribute {
    pub name: QName,
    pub value: String,
    /// Declared of type ID by the DTD.
    pub is_id: bool,
    /// Injected from an attribute-list default rather than written.
    pub defaulted: bool,
}

/// A non-fatal validity diagnostic, reported when validation is off but a
/// listener still wants to hear about problems.
#[derive(Debug, Clone)]
pub struct Invalidation {
    pub message: String,
    pub location: Location,
}

pub trait SaxHandler {
    fn xml_decl(&mut self, _version: &str, _encoding: Option<&str>, _standalone: Option<bool>) {}

    fn doctype_decl(&mut self, _root: &str, _public_id: Option<&str>, _system_id: Option<&str>) {}

    fn start_element(
        &mut self,
        _name: &QName,
        _namespace_uri: Option<&str>,
        _attributes: &[SaxAttribute],
    ) {
    }

    fn end_element(&mut self, _name: &QName) {}

    /// Character data, already entity-expanded and newline-normalized.
    fn characters(&mut self, _text: &str) {}

    fn processing_instruction(&mut self, _target: &str, _data: &str) {}

    fn comment(&mut self, _text: &str) {}

    fn start_cdata(&mut self) {}

    fn end_cdata(&mut self) {}

    fn start_namespace_decl(&mut self, _prefix: &str, _uri: &str) {}

    fn end_namespace_decl(&mut self, _prefix: &str) {}

    fn notation_decl(&mut self, _notation: &NotationDecl) {}

    fn report_invalid(&mut self, _diagnostic: &Invalidation) {}
}

/// A handler that ignores every event; useful for well-formedness-only
/// scans.
#[derive(Debug, Default)]
pub struct NullHandler;

impl SaxHandler for NullHandler {}

/// Supplies the bytes of external entities and the external DTD subset.
///
/// Returning `Ok(None)` means "not available": the reference stays
/// unresolved and only becomes fatal when it is actually dereferenced.
pub trait EntityResolver {
    fn resolve(
        &mut self,
        base: &str,
        public_id: &str,
        system_id: &str,
    ) -> io::Result<Option<Vec<u8>>>;
}

impl<F> EntityResolver for F
where
    F: FnMut(&str, &str, &str) -> io::Result<Option<Vec<u8>>>,
{
    fn resolve(
        &mut self,
        base: &str,
        public_id: &str,
        system_id: &str,
    ) -> io::Result<Option<Vec<u8>>> {
        self(base, public_id, system_id)
    }
}
