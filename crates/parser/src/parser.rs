//! The recursive-descent XML 1.0 parser.
//!
//! One method per grammar production, reading code points off the
//! [`Cursor`] and firing [`SaxHandler`] events. DTD declarations are
//! handled by [`crate::dtd_reader`]; this module drives element content,
//! references, namespaces and validation.

use std::collections::HashSet;

use xylem_dom::QName;
use xylem_dom::node::{XML_NAMESPACE, XMLNS_NAMESPACE};
use xylem_dtd::{ContentState, Dtd, check_fixed, normalize_attribute};
use xylem_dtd::{AttType, DefaultDecl};

use crate::cursor::Cursor;
use crate::dtd_reader;
use crate::error::{Location, ParseError};
use crate::events::{EntityResolver, Invalidation, SaxAttribute, SaxHandler};

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    /// Enforce the DTD: validity violations become [`ParseError::Invalid`].
    pub validate: bool,
    /// Enforce namespace well-formedness: undeclared prefixes are fatal.
    pub validate_ns: bool,
    /// Keep CDATA sections as distinct nodes when building a document.
    pub preserve_cdata: bool,
}

enum Ref {
    Char(char),
    Entity(String),
}

pub struct Parser<'a> {
    pub(crate) cursor: Cursor,
    pub(crate) options: ParserOptions,
    pub(crate) handler: &'a mut dyn SaxHandler,
    pub(crate) resolver: Option<Box<dyn EntityResolver + 'a>>,
    pub(crate) dtd: Dtd,
    pub(crate) saw_doctype: bool,
    base: String,
    /// One namespace frame per open element: the prefixes it declared.
    ns_scopes: Vec<Vec<(String, String)>>,
    /// One content-model state per open element with a declared model.
    validators: Vec<Option<ContentState>>,
    ids: HashSet<String>,
    idrefs: Vec<(String, Location)>,
}

impl<'a> Parser<'a> {
    pub fn new(text: &str, handler: &'a mut dyn SaxHandler) -> Parser<'a> {
        Parser::with_options(text, handler, ParserOptions::default())
    }

    pub fn with_options(
        text: &str,
        handler: &'a mut dyn SaxHandler,
        options: ParserOptions,
    ) -> Parser<'a> {
        Parser {
            cursor: Cursor::new(text),
            options,
            handler,
            resolver: None,
            dtd: Dtd::new(),
            saw_doctype: false,
            base: String::new(),
            ns_scopes: Vec::new(),
            validators: Vec::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
        }
    }

    /// Installs the loader used for the external DTD subset and external
    /// entities.
    pub fn set_resolver(&mut self, resolver: Box<dyn EntityResolver + 'a>) {
        self.resolver = Some(resolver);
    }

    /// Base path handed to the resolver alongside the public/system ids.
    pub fn set_base(&mut self, base: impl Into<String>) {
        self.base = base.into();
    }

    /// Consumes the input. The DTD gathered along the way is returned so
    /// the caller can keep it with the document.
    pub fn parse(mut self) -> Result<Dtd, ParseError> {
        self.parse_prolog()?;

        if self.cursor.at_end() || !self.cursor.starts_with("<") {
            return Err(self.wf("expected the document element"));
        }
        self.parse_element()?;

        self.parse_misc()?;
        if !self.cursor.at_end() {
            let message = if self.cursor.starts_with("<") {
                "more than one root element"
            } else {
                "character data outside the root element"
            };
            return Err(self.wf(message));
        }

        if self.options.validate {
            let missing: Vec<(String, Location)> = self
                .idrefs
                .iter()
                .filter(|(id, _)| !self.ids.contains(id))
                .cloned()
                .collect();
            for (idref, location) in missing {
                self.validity_at(format!("IDREF '{idref}' matches no ID"), location)?;
            }
        }
        Ok(self.dtd)
    }

    // --- prolog ---

    fn parse_prolog(&mut self) -> Result<(), ParseError> {
        if self.cursor.starts_with("<?xml")
            && matches!(self.cursor.peek_at(5), Some(c) if xylem_text::is_space(c))
        {
            self.parse_xml_decl()?;
        }
        self.parse_misc()?;

        if self.cursor.starts_with("<!DOCTYPE") {
            dtd_reader::parse_doctype(self)?;
            self.saw_doctype = true;
            self.parse_misc()?;
        }
        Ok(())
    }

    // XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    fn parse_xml_decl(&mut self) -> Result<(), ParseError> {
        self.cursor.expect_str("<?xml")?;
        self.cursor.expect_ws()?;
        self.cursor.expect_str("version")?;
        let version = self.parse_pseudo_attr_value()?;
        if version != "1.0" {
            return Err(self.wf(format!("unsupported XML version '{version}'")));
        }

        let mut encoding = None;
        let mut standalone = None;

        let mut had_ws = self.cursor.skip_ws();
        if had_ws && self.cursor.eat_str("encoding") {
            encoding = Some(self.parse_pseudo_attr_value()?);
            had_ws = self.cursor.skip_ws();
        }
        if had_ws && self.cursor.eat_str("standalone") {
            standalone = Some(match self.parse_pseudo_attr_value()?.as_str() {
                "yes" => true,
                "no" => false,
                other => return Err(self.wf(format!("standalone must be yes or no, got '{other}'"))),
            });
            self.cursor.skip_ws();
        }

        self.cursor.expect_str("?>")?;
        self.handler.xml_decl("1.0", encoding.as_deref(), standalone);
        Ok(())
    }

    fn parse_pseudo_attr_value(&mut self) -> Result<String, ParseError> {
        self.cursor.skip_ws();
        self.cursor.expect('=')?;
        self.cursor.skip_ws();
        self.cursor.read_quoted()
    }

    // Misc ::= Comment | PI | S
    pub(crate) fn parse_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.cursor.skip_ws();
            if self.cursor.starts_with("<!--") {
                self.parse_comment()?;
            } else if self.cursor.starts_with("<?") {
                self.parse_pi()?;
            } else {
                return Ok(());
            }
        }
    }

    // Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
    pub(crate) fn parse_comment(&mut self) -> Result<(), ParseError> {
        self.cursor.expect_str("<!--")?;
        let mut text = String::new();
        loop {
            if self.cursor.starts_with("--") {
                self.cursor.expect_str("--")?;
                return if self.cursor.eat('>') {
                    self.handler.comment(&text);
                    Ok(())
                } else {
                    Err(self.wf("'--' is not allowed inside a comment"))
                };
            }
            text.push(self.cursor.consume()?);
        }
    }

    // PI ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
    pub(crate) fn parse_pi(&mut self) -> Result<(), ParseError> {
        self.cursor.expect_str("<?")?;
        let target = self.cursor.read_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.wf("'xml' is a reserved processing-instruction target"));
        }
        let mut data = String::new();
        if self.cursor.skip_ws() {
            while !self.cursor.starts_with("?>") {
                data.push(self.cursor.consume()?);
            }
        }
        self.cursor.expect_str("?>")?;
        self.handler.processing_instruction(&target, &data);
        Ok(())
    }

    // --- elements ---

    // element ::= EmptyElemTag | STag content ETag
    fn parse_element(&mut self) -> Result<(), ParseError> {
        self.cursor.expect('<')?;
        let name_str = self.cursor.read_name()?;
        let name = QName::parse(&name_str);

        if self.validators.is_empty() && self.saw_doctype {
            if let Some(root) = self.dtd.root_name.clone() {
                if root != name_str {
                    self.validity(format!(
                        "root element '{name_str}' does not match DOCTYPE '{root}'"
                    ))?;
                }
            }
        }

        let mut attrs: Vec<SaxAttribute> = Vec::new();
        let empty;
        loop {
            let had_ws = self.cursor.skip_ws();
            if self.cursor.eat_str("/>") {
                empty = true;
                break;
            }
            if self.cursor.eat('>') {
                empty = false;
                break;
            }
            if !had_ws {
                return Err(self.wf("expected whitespace before an attribute"));
            }

            let attr_name = QName::parse(&self.cursor.read_name()?);
            self.cursor.skip_ws();
            self.cursor.expect('=')?;
            self.cursor.skip_ws();
            let value = self.parse_attr_value()?;

            if attrs.iter().any(|a| a.name == attr_name) {
                return Err(self.wf(format!("duplicate attribute '{attr_name}'")));
            }
            attrs.push(SaxAttribute {
                name: attr_name,
                value,
                is_id: false,
                defaulted: false,
            });
        }

        self.apply_dtd_to_attributes(&name_str, &mut attrs)?;
        let declared = self.open_namespace_scope(&attrs)?;
        let uri = self.resolve_element_namespaces(&name, &attrs)?;

        // Tell the enclosing content model about this child, then arm a
        // model for our own children.
        self.notify_parent_validator(&name_str)?;
        self.push_validator(&name_str)?;

        self.handler.start_element(&name, uri.as_deref(), &attrs);

        if !empty {
            self.parse_content(&name_str)?;
            // parse_content stops at '</'.
            self.cursor.expect_str("</")?;
            let close = self.cursor.read_name()?;
            if close != name_str {
                return Err(self.wf(format!(
                    "closing tag '</{close}>' does not match '<{name_str}>'"
                )));
            }
            self.cursor.skip_ws();
            self.cursor.expect('>')?;
        }

        self.check_element_complete(&name_str)?;
        self.handler.end_element(&name);
        self.close_namespace_scope(declared);
        Ok(())
    }

    // content ::= CharData? ((element | Reference | CDSect | PI | Comment) CharData?)*
    fn parse_content(&mut self, element_name: &str) -> Result<(), ParseError> {
        loop {
            match self.cursor.peek() {
                None => {
                    return Err(self.wf(format!("element '{element_name}' is never closed")));
                }
                Some('<') => {
                    if self.cursor.starts_with("</") {
                        return Ok(());
                    } else if self.cursor.starts_with("<!--") {
                        self.check_empty_model("a comment")?;
                        self.parse_comment()?;
                    } else if self.cursor.starts_with("<![CDATA[") {
                        self.parse_cdata()?;
                    } else if self.cursor.starts_with("<?") {
                        self.check_empty_model("a processing instruction")?;
                        self.parse_pi()?;
                    } else {
                        self.parse_element()?;
                    }
                }
                Some(_) => self.parse_text()?,
            }
        }
    }

    // CDSect ::= '<![CDATA[' (Char* - (Char* ']]>' Char*)) ']]>'
    fn parse_cdata(&mut self) -> Result<(), ParseError> {
        self.cursor.expect_str("<![CDATA[")?;
        let mut text = String::new();
        while !self.cursor.starts_with("]]>") {
            text.push(self.cursor.consume()?);
        }
        self.cursor.expect_str("]]>")?;

        self.check_char_data(&text)?;
        self.handler.start_cdata();
        self.handler.characters(&text);
        self.handler.end_cdata();
        Ok(())
    }

    /// Character data up to the next markup, with references expanded.
    fn parse_text(&mut self) -> Result<(), ParseError> {
        let mut text = String::new();
        // Literal ']]' run, for catching the forbidden ']]>' sequence.
        let mut brackets = 0usize;

        loop {
            match self.cursor.peek() {
                None | Some('<') => break,
                Some('&') => {
                    match self.parse_reference()? {
                        Ref::Char(c) => {
                            // A character reference never participates in
                            // the ']]>' or markup checks.
                            text.push(c);
                            brackets = 0;
                        }
                        Ref::Entity(name) => self.expand_entity_in_content(&name)?,
                    }
                }
                Some(_) => {
                    let c = self.cursor.consume()?;
                    if c == ']' {
                        brackets += 1;
                    } else {
                        if c == '>' && brackets >= 2 {
                            return Err(self.wf("']]>' is not allowed in character data"));
                        }
                        brackets = 0;
                    }
                    text.push(c);
                }
            }
        }

        if !text.is_empty() {
            self.check_char_data(&text)?;
            self.handler.characters(&text);
        }
        Ok(())
    }

    // --- references ---

    /// At '&': either a character reference or an entity name.
    fn parse_reference(&mut self) -> Result<Ref, ParseError> {
        self.cursor.expect('&')?;
        if self.cursor.eat('#') {
            return Ok(Ref::Char(self.parse_char_ref()?));
        }
        let name = self.cursor.read_name()?;
        self.cursor.expect(';')?;
        Ok(match name.as_str() {
            "lt" => Ref::Char('<'),
            "gt" => Ref::Char('>'),
            "amp" => Ref::Char('&'),
            "apos" => Ref::Char('\''),
            "quot" => Ref::Char('"'),
            _ => Ref::Entity(name),
        })
    }

    // CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'
    pub(crate) fn parse_char_ref(&mut self) -> Result<char, ParseError> {
        let location = self.cursor.location();
        let hex = self.cursor.eat('x');
        let mut digits = String::new();
        while let Some(c) = self.cursor.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                self.cursor.next_char();
            } else {
                break;
            }
        }
        self.cursor.expect(';')?;

        let radix = if hex { 16 } else { 10 };
        let code = u32::from_str_radix(&digits, radix)
            .map_err(|_| ParseError::not_well_formed("malformed character reference", location))?;
        match char::from_u32(code) {
            Some(c) if xylem_text::is_char(c) => Ok(c),
            _ => Err(ParseError::InvalidCharacter { code, location }),
        }
    }

    /// Expands a general entity reference found in element content by
    /// stacking its replacement text in front of the input.
    fn expand_entity_in_content(&mut self, name: &str) -> Result<(), ParseError> {
        let Some(decl) = self.dtd.entity(name) else {
            return Err(ParseError::UndefinedEntity {
                name: name.to_string(),
                location: self.cursor.location(),
            });
        };
        if !decl.parsed {
            return Err(self.wf(format!("reference to unparsed entity '{name}'")));
        }

        if decl.external {
            let (public_id, system_id) =
                (decl.public_id.clone(), decl.system_id.clone());
            let text = self.load_external(name, public_id.as_deref(), system_id.as_deref())?;
            log::debug!("expanding external entity '{name}' ({} chars)", text.len());
            self.cursor.push_entity(name, &text)
        } else {
            let replacement = decl.replacement.clone();
            self.cursor.push_entity(name, &replacement)
        }
    }

    /// Pulls the bytes of an external entity through the resolver and
    /// strips the optional text declaration.
    pub(crate) fn load_external(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<String, ParseError> {
        let undefined = |location| ParseError::UndefinedEntity {
            name: name.to_string(),
            location,
        };

        let location = self.cursor.location();
        let Some(resolver) = self.resolver.as_mut() else {
            return Err(undefined(location));
        };
        let bytes = resolver
            .resolve(&self.base, public_id.unwrap_or(""), system_id.unwrap_or(""))?
            .ok_or_else(|| undefined(location))?;
        let text = xylem_text::decode(&bytes)?;
        Ok(strip_text_decl(text))
    }

    // --- attribute values ---

    // AttValue ::= '"' ([^<&"] | Reference)* '"' | "'" ([^<&'] | Reference)* "'"
    pub(crate) fn parse_attr_value(&mut self) -> Result<String, ParseError> {
        let location = self.cursor.location();
        let quote = match self.cursor.next_char() {
            Some(c @ ('"' | '\'')) => c,
            _ => {
                return Err(ParseError::not_well_formed(
                    "expected a quoted attribute value",
                    location,
                ));
            }
        };

        let mut value = String::new();
        loop {
            match self.cursor.peek() {
                None => return Err(self.wf("unterminated attribute value")),
                Some(c) if c == quote => {
                    self.cursor.next_char();
                    return Ok(value);
                }
                Some('<') => return Err(self.wf("'<' is not allowed in attribute values")),
                Some('&') => match self.parse_reference()? {
                    Ref::Char(c) => value.push(c),
                    Ref::Entity(name) => {
                        let mut active = Vec::new();
                        self.expand_entity_in_attr(&name, &mut value, &mut active)?;
                    }
                },
                Some(c) if xylem_text::is_space(c) => {
                    // Literal whitespace normalizes to a plain space.
                    self.cursor.next_char();
                    value.push(' ');
                }
                Some(_) => value.push(self.cursor.consume()?),
            }
        }
    }

    /// Recursive expansion of a general entity inside an attribute value,
    /// applying the same whitespace normalization to the replacement.
    fn expand_entity_in_attr(
        &mut self,
        name: &str,
        out: &mut String,
        active: &mut Vec<String>,
    ) -> Result<(), ParseError> {
        if active.iter().any(|n| n == name) {
            return Err(ParseError::RecursiveEntity {
                name: name.to_string(),
                location: self.cursor.location(),
            });
        }
        let Some(decl) = self.dtd.entity(name) else {
            return Err(ParseError::UndefinedEntity {
                name: name.to_string(),
                location: self.cursor.location(),
            });
        };
        if decl.external {
            return Err(self.wf(format!(
                "external entity '{name}' is not allowed in an attribute value"
            )));
        }
        if !decl.parsed {
            return Err(self.wf(format!("reference to unparsed entity '{name}'")));
        }

        active.push(name.to_string());
        let replacement = decl.replacement.clone();
        let mut chars = replacement.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '<' => {
                    return Err(self.wf(format!(
                        "entity '{name}' would put '<' into an attribute value"
                    )));
                }
                '&' => {
                    let mut entity = String::new();
                    if chars.peek() == Some(&'#') {
                        chars.next();
                        let mut digits = String::new();
                        for d in chars.by_ref() {
                            if d == ';' {
                                break;
                            }
                            digits.push(d);
                        }
                        out.push(decode_char_ref(&digits, self.cursor.location())?);
                        continue;
                    }
                    for d in chars.by_ref() {
                        if d == ';' {
                            break;
                        }
                        entity.push(d);
                    }
                    match entity.as_str() {
                        "lt" => out.push('<'),
                        "gt" => out.push('>'),
                        "amp" => out.push('&'),
                        "apos" => out.push('\''),
                        "quot" => out.push('"'),
                        _ => self.expand_entity_in_attr(&entity, out, active)?,
                    }
                }
                c if xylem_text::is_space(c) => out.push(' '),
                c => out.push(c),
            }
        }
        active.pop();
        Ok(())
    }

    // --- DTD-driven attribute fixup ---

    fn apply_dtd_to_attributes(
        &mut self,
        element: &str,
        attrs: &mut Vec<SaxAttribute>,
    ) -> Result<(), ParseError> {
        if self.dtd.element(element).is_none() {
            return Ok(());
        }

        // Normalize and validate what the instance supplied.
        for i in 0..attrs.len() {
            let attr_name = attrs[i].name.to_string();
            let Some(decl) = self.dtd.attribute_for(element, &attr_name) else {
                if !attrs[i].name.is_namespace_decl() {
                    let message =
                        format!("attribute '{attr_name}' is not declared for element '{element}'");
                    self.validity(message)?;
                }
                continue;
            };
            let decl = decl.clone();

            if decl.att_type != AttType::CData {
                match normalize_attribute(&decl, &attrs[i].value, &self.dtd) {
                    Ok(normalized) => attrs[i].value = normalized,
                    Err(e) => self.validity(e.to_string())?,
                }
            }
            if let Err(e) = check_fixed(&decl, &attrs[i].value) {
                self.validity(e.to_string())?;
            }

            match decl.att_type {
                AttType::Id => {
                    attrs[i].is_id = true;
                    let id = attrs[i].value.clone();
                    if !self.ids.insert(id.clone()) {
                        let location = self.cursor.location();
                        if self.options.validate {
                            return Err(ParseError::DuplicateId { id, location });
                        }
                        self.report(format!("duplicate ID value '{id}'"));
                    }
                }
                AttType::IdRef => {
                    self.idrefs.push((attrs[i].value.clone(), self.cursor.location()));
                }
                AttType::IdRefs => {
                    for token in attrs[i].value.split(' ') {
                        self.idrefs.push((token.to_string(), self.cursor.location()));
                    }
                }
                _ => {}
            }
        }

        // Inject declared defaults and check #REQUIRED.
        let decls: Vec<_> = self
            .dtd
            .element(element)
            .map(|d| d.attributes.clone())
            .unwrap_or_default();
        for decl in decls {
            let present = attrs.iter().any(|a| a.name.to_string() == decl.name);
            if present {
                continue;
            }
            match &decl.default {
                DefaultDecl::Required => {
                    let message =
                        format!("required attribute '{}' is missing on '{element}'", decl.name);
                    self.validity(message)?;
                }
                DefaultDecl::Default(value) | DefaultDecl::Fixed(value) => {
                    attrs.push(SaxAttribute {
                        name: QName::parse(&decl.name),
                        value: value.clone(),
                        is_id: decl.att_type == AttType::Id,
                        defaulted: true,
                    });
                }
                DefaultDecl::None | DefaultDecl::Implied => {}
            }
        }
        Ok(())
    }

    // --- namespace scopes ---

    /// Collects the namespace declarations of a start tag, checks them,
    /// pushes a scope and fires the scope-open events.
    fn open_namespace_scope(
        &mut self,
        attrs: &[SaxAttribute],
    ) -> Result<Vec<(String, String)>, ParseError> {
        let mut declared: Vec<(String, String)> = Vec::new();
        for attr in attrs {
            let Some(prefix) = attr.name.declared_prefix() else {
                continue;
            };
            match prefix {
                "xml" => {
                    if attr.value != XML_NAMESPACE {
                        return Err(self.wf("the 'xml' prefix cannot be rebound"));
                    }
                }
                "xmlns" => return Err(self.wf("the 'xmlns' prefix cannot be declared")),
                _ => {
                    if attr.value == XML_NAMESPACE || attr.value == XMLNS_NAMESPACE {
                        return Err(self.wf("reserved namespace URI bound to the wrong prefix"));
                    }
                    if !prefix.is_empty() && attr.value.is_empty() {
                        return Err(self.wf(format!(
                            "prefix '{prefix}' cannot be bound to the empty URI"
                        )));
                    }
                    declared.push((prefix.to_string(), attr.value.clone()));
                }
            }
        }

        for (prefix, uri) in &declared {
            self.handler.start_namespace_decl(prefix, uri);
        }
        self.ns_scopes.push(declared.clone());
        Ok(declared)
    }

    fn close_namespace_scope(&mut self, declared: Vec<(String, String)>) {
        self.ns_scopes.pop();
        for (prefix, _) in declared.iter().rev() {
            self.handler.end_namespace_decl(prefix);
        }
    }

    fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        if prefix == "xmlns" {
            return Some(XMLNS_NAMESPACE);
        }
        for scope in self.ns_scopes.iter().rev() {
            if let Some((_, uri)) = scope.iter().rev().find(|(p, _)| p == prefix) {
                return Some(uri);
            }
        }
        None
    }

    /// Resolves the element's own namespace and, under `validate_ns`,
    /// insists every prefix in sight is declared.
    fn resolve_element_namespaces(
        &mut self,
        name: &QName,
        attrs: &[SaxAttribute],
    ) -> Result<Option<String>, ParseError> {
        let uri = self
            .lookup_namespace(name.prefix())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        if self.options.validate_ns {
            if !name.prefix().is_empty() && self.lookup_namespace(name.prefix()).is_none() {
                return Err(self.wf(format!("undeclared namespace prefix '{}'", name.prefix())));
            }
            for attr in attrs {
                let prefix = attr.name.prefix();
                if !prefix.is_empty()
                    && prefix != "xmlns"
                    && self.lookup_namespace(prefix).is_none()
                {
                    return Err(self.wf(format!("undeclared namespace prefix '{prefix}'")));
                }
            }
        }
        Ok(uri)
    }

    // --- validation plumbing ---

    fn notify_parent_validator(&mut self, child: &str) -> Result<(), ParseError> {
        let rejected = match self.validators.last_mut() {
            Some(Some(state)) => !state.allow(child).0,
            _ => false,
        };
        if rejected {
            let message = format!("element '{child}' is not allowed here");
            self.validity(message)?;
        }
        Ok(())
    }

    fn push_validator(&mut self, element: &str) -> Result<(), ParseError> {
        let state = self
            .dtd
            .element(element)
            .filter(|decl| decl.declared)
            .map(|decl| decl.content.create_state());
        if state.is_none() && self.saw_doctype {
            self.validity(format!("element '{element}' is not declared"))?;
        }
        self.validators.push(state);
        Ok(())
    }

    fn check_element_complete(&mut self, element: &str) -> Result<(), ParseError> {
        let complete = match self.validators.pop() {
            Some(Some(state)) => state.done() || state.allow_empty(),
            _ => true,
        };
        if !complete {
            self.validity(format!("content of element '{element}' is incomplete"))?;
        }
        Ok(())
    }

    /// Non-whitespace character data must be sanctioned by the model.
    fn check_char_data(&mut self, text: &str) -> Result<(), ParseError> {
        if text.chars().all(xylem_text::is_space) {
            return Ok(());
        }
        let rejected = matches!(
            self.validators.last(),
            Some(Some(state)) if !state.allow_char_data()
        );
        if rejected {
            let message = "character data is not allowed in element content".to_string();
            let location = self.cursor.location();
            if self.options.validate {
                return Err(ParseError::InvalidContent { message, location });
            }
            self.report(message);
        }
        Ok(())
    }

    fn check_empty_model(&mut self, what: &str) -> Result<(), ParseError> {
        let empty = matches!(
            self.validators.last(),
            Some(Some(state)) if state.must_be_empty()
        );
        if empty {
            self.validity(format!("EMPTY element must have no content, found {what}"))?;
        }
        Ok(())
    }

    // --- error helpers ---

    pub(crate) fn wf(&self, message: impl Into<String>) -> ParseError {
        ParseError::not_well_formed(message, self.cursor.location())
    }

    /// Raises a validity error when validating, otherwise reports it.
    pub(crate) fn validity(&mut self, message: String) -> Result<(), ParseError> {
        let location = self.cursor.location();
        self.validity_at(message, location)
    }

    fn validity_at(&mut self, message: String, location: Location) -> Result<(), ParseError> {
        if self.options.validate {
            return Err(ParseError::Invalid { message, location });
        }
        log::debug!("validity: {message} ({location})");
        self.handler.report_invalid(&Invalidation { message, location });
        Ok(())
    }

    fn report(&mut self, message: String) {
        let location = self.cursor.location();
        log::debug!("validity: {message} ({location})");
        self.handler.report_invalid(&Invalidation { message, location });
    }
}

/// Strips the `<?xml ...?>` text declaration external entities may start
/// with.
fn strip_text_decl(text: String) -> String {
    if let Some(rest) = text.strip_prefix("<?xml") {
        if rest.starts_with(|c: char| xylem_text::is_space(c)) {
            if let Some(end) = rest.find("?>") {
                return rest[end + 2..].to_string();
            }
        }
    }
    text
}

fn decode_char_ref(digits: &str, location: Location) -> Result<char, ParseError> {
    let (digits, radix) = match digits.strip_prefix('x') {
        Some(hex) => (hex, 16),
        None => (digits, 10),
    };
    let code = u32::from_str_radix(digits, radix)
        .map_err(|_| ParseError::not_well_formed("malformed character reference", location))?;
    match char::from_u32(code) {
        Some(c) if xylem_text::is_char(c) => Ok(c),
        _ => Err(ParseError::InvalidCharacter { code, location }),
    }
}
