//! `<!DOCTYPE ...>` and the markup declarations of both DTD subsets.
//!
//! Grammar productions are annotated the way the XML 1.0 recommendation
//! numbers them. Parameter entities are expanded at declaration
//! boundaries, padded with one space on each side in the internal subset
//! and unpadded in the external subset.

use xylem_dtd::{
    AttType, AttributeDecl, ContentSpec, DefaultDecl, EntityDecl, NotationDecl, Repetition,
};

use crate::cursor::Cursor;
use crate::error::ParseError;
use crate::parser::Parser;

/// What terminates the subset currently being read.
#[derive(Clone, Copy, PartialEq)]
enum SubsetEnd {
    /// `]` closing the internal subset.
    Bracket,
    /// End of the external subset input.
    Eof,
    /// `]]>` closing an INCLUDE conditional section.
    CondSect,
}

// doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
pub(crate) fn parse_doctype(p: &mut Parser) -> Result<(), ParseError> {
    p.cursor.expect_str("<!DOCTYPE")?;
    p.cursor.expect_ws()?;
    let root = p.cursor.read_name()?;
    p.cursor.skip_ws();
    let (public_id, system_id) = parse_external_id(p, false)?;

    p.dtd.root_name = Some(root.clone());
    p.dtd.public_id = public_id.clone();
    p.dtd.system_id = system_id.clone();
    p.handler
        .doctype_decl(&root, public_id.as_deref(), system_id.as_deref());

    p.cursor.skip_ws();
    if p.cursor.eat('[') {
        parse_subset(p, false, SubsetEnd::Bracket)?;
        p.cursor.expect(']')?;
        p.cursor.skip_ws();
    }
    p.cursor.expect('>')?;

    if let Some(system) = &system_id {
        if p.resolver.is_some() {
            match p.load_external("[dtd]", public_id.as_deref(), Some(system)) {
                Ok(text) => parse_external_subset(p, &text)?,
                Err(ParseError::UndefinedEntity { .. }) => {
                    log::debug!("external DTD subset '{system}' not available, skipping");
                }
                Err(e) => return Err(e),
            }
        } else {
            log::debug!("no entity resolver installed, external subset '{system}' ignored");
        }
    }
    Ok(())
}

/// Runs the declaration loop over the loaded external subset by swapping
/// the parser's cursor for the duration.
fn parse_external_subset(p: &mut Parser, text: &str) -> Result<(), ParseError> {
    let saved = std::mem::replace(&mut p.cursor, Cursor::new(text));
    let result = parse_subset(p, true, SubsetEnd::Eof);
    p.cursor = saved;
    result
}

// intSubset ::= (markupdecl | DeclSep)*
// markupdecl ::= elementdecl | AttlistDecl | EntityDecl | NotationDecl | PI | Comment
fn parse_subset(p: &mut Parser, external: bool, end: SubsetEnd) -> Result<(), ParseError> {
    loop {
        skip_dtd_ws(p, external)?;

        match end {
            SubsetEnd::Bracket => {
                if p.cursor.peek() == Some(']') {
                    return Ok(());
                }
            }
            SubsetEnd::CondSect => {
                if p.cursor.eat_str("]]>") {
                    return Ok(());
                }
            }
            SubsetEnd::Eof => {}
        }
        if p.cursor.at_end() {
            return if end == SubsetEnd::Eof {
                Ok(())
            } else {
                Err(p.wf("unterminated DTD subset"))
            };
        }

        if p.cursor.starts_with("<!ELEMENT") {
            parse_element_decl(p, external)?;
        } else if p.cursor.starts_with("<!ATTLIST") {
            parse_attlist_decl(p, external)?;
        } else if p.cursor.starts_with("<!ENTITY") {
            parse_entity_decl(p, external)?;
        } else if p.cursor.starts_with("<!NOTATION") {
            parse_notation_decl(p)?;
        } else if p.cursor.starts_with("<!--") {
            consume_comment(p)?;
        } else if external && p.cursor.starts_with("<![") {
            parse_conditional_section(p)?;
        } else if p.cursor.starts_with("<?") {
            consume_pi(p)?;
        } else {
            return Err(p.wf("unrecognized markup declaration"));
        }
    }
}

// conditionalSect ::= includeSect | ignoreSect
fn parse_conditional_section(p: &mut Parser) -> Result<(), ParseError> {
    p.cursor.expect_str("<![")?;
    skip_dtd_ws(p, true)?;
    let keyword = p.cursor.read_name()?;
    skip_dtd_ws(p, true)?;
    p.cursor.expect('[')?;

    match keyword.as_str() {
        "INCLUDE" => parse_subset(p, true, SubsetEnd::CondSect),
        "IGNORE" => {
            let mut depth = 1usize;
            while depth > 0 {
                if p.cursor.starts_with("<![") {
                    p.cursor.expect_str("<![")?;
                    depth += 1;
                } else if p.cursor.starts_with("]]>") {
                    p.cursor.expect_str("]]>")?;
                    depth -= 1;
                } else {
                    p.cursor.consume()?;
                }
            }
            Ok(())
        }
        other => Err(p.wf(format!("expected INCLUDE or IGNORE, found '{other}'"))),
    }
}

// elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
fn parse_element_decl(p: &mut Parser, external: bool) -> Result<(), ParseError> {
    p.cursor.expect_str("<!ELEMENT")?;
    expect_dtd_ws(p, external)?;
    let name = p.cursor.read_name()?;
    expect_dtd_ws(p, external)?;
    let spec = parse_content_spec(p, external)?;
    skip_dtd_ws(p, external)?;
    p.cursor.expect('>')?;

    if let Err(e) = p.dtd.declare_element(&name, spec, external).map(|_| ()) {
        p.validity(e.to_string())?;
    }
    Ok(())
}

// contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
fn parse_content_spec(p: &mut Parser, external: bool) -> Result<ContentSpec, ParseError> {
    if p.cursor.eat_str("EMPTY") {
        return Ok(ContentSpec::Empty);
    }
    if p.cursor.eat_str("ANY") {
        return Ok(ContentSpec::Any);
    }
    p.cursor.expect('(')?;
    skip_dtd_ws(p, external)?;

    // Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*' | '(' S? '#PCDATA' S? ')'
    if p.cursor.eat_str("#PCDATA") {
        let mut options = Vec::new();
        loop {
            skip_dtd_ws(p, external)?;
            if p.cursor.eat('|') {
                skip_dtd_ws(p, external)?;
                options.push(ContentSpec::Element(p.cursor.read_name()?));
            } else {
                break;
            }
        }
        p.cursor.expect(')')?;
        let starred = p.cursor.eat('*');
        if !options.is_empty() && !starred {
            return Err(p.wf("mixed content with element names must end in ')*'"));
        }
        let choice = ContentSpec::Choice { options, mixed: true };
        return Ok(if starred {
            ContentSpec::Repeated {
                inner: Box::new(choice),
                rep: Repetition::ZeroOrMore,
            }
        } else {
            choice
        });
    }

    // children ::= (choice | seq) ('?' | '*' | '+')?
    let group = parse_group_body(p, external)?;
    Ok(parse_repetition_suffix(p, group))
}

// choice ::= '(' S? cp ( S? '|' S? cp )+ S? ')'
// seq    ::= '(' S? cp ( S? ',' S? cp )* S? ')'
// The opening '(' has already been consumed.
fn parse_group_body(p: &mut Parser, external: bool) -> Result<ContentSpec, ParseError> {
    let first = parse_cp(p, external)?;
    skip_dtd_ws(p, external)?;

    match p.cursor.peek() {
        Some(')') => {
            p.cursor.expect(')')?;
            Ok(first)
        }
        Some(sep @ (',' | '|')) => {
            let mut items = vec![first];
            while p.cursor.eat(sep) {
                skip_dtd_ws(p, external)?;
                items.push(parse_cp(p, external)?);
                skip_dtd_ws(p, external)?;
            }
            p.cursor.expect(')')?;
            Ok(if sep == ',' {
                ContentSpec::Seq(items)
            } else {
                ContentSpec::Choice {
                    options: items,
                    mixed: false,
                }
            })
        }
        _ => Err(p.wf("expected ',', '|' or ')' in a content model")),
    }
}

// cp ::= (Name | choice | seq) ('?' | '*' | '+')?
fn parse_cp(p: &mut Parser, external: bool) -> Result<ContentSpec, ParseError> {
    let base = if p.cursor.eat('(') {
        skip_dtd_ws(p, external)?;
        parse_group_body(p, external)?
    } else {
        ContentSpec::Element(p.cursor.read_name()?)
    };
    Ok(parse_repetition_suffix(p, base))
}

fn parse_repetition_suffix(p: &mut Parser, inner: ContentSpec) -> ContentSpec {
    let rep = if p.cursor.eat('?') {
        Repetition::ZeroOrOne
    } else if p.cursor.eat('*') {
        Repetition::ZeroOrMore
    } else if p.cursor.eat('+') {
        Repetition::OneOrMore
    } else {
        return inner;
    };
    ContentSpec::Repeated {
        inner: Box::new(inner),
        rep,
    }
}

// AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
// AttDef      ::= S Name S AttType S DefaultDecl
fn parse_attlist_decl(p: &mut Parser, external: bool) -> Result<(), ParseError> {
    p.cursor.expect_str("<!ATTLIST")?;
    expect_dtd_ws(p, external)?;
    let element = p.cursor.read_name()?;

    loop {
        skip_dtd_ws(p, external)?;
        if p.cursor.eat('>') {
            return Ok(());
        }
        let name = p.cursor.read_name()?;
        expect_dtd_ws(p, external)?;
        let (att_type, enumeration) = parse_att_type(p, external)?;
        expect_dtd_ws(p, external)?;
        let default = parse_default_decl(p, external)?;

        p.dtd.declare_attribute(
            &element,
            AttributeDecl {
                name,
                att_type,
                default,
                enumeration,
                external,
            },
        );
    }
}

// AttType ::= StringType | TokenizedType | EnumeratedType
fn parse_att_type(p: &mut Parser, external: bool) -> Result<(AttType, Vec<String>), ParseError> {
    // Keyword order matters: ID is a prefix of IDREF and IDREFS.
    let keywords: &[(&str, AttType)] = &[
        ("CDATA", AttType::CData),
        ("IDREFS", AttType::IdRefs),
        ("IDREF", AttType::IdRef),
        ("ID", AttType::Id),
        ("ENTITIES", AttType::Entities),
        ("ENTITY", AttType::Entity),
        ("NMTOKENS", AttType::NmTokens),
        ("NMTOKEN", AttType::NmToken),
    ];
    for (keyword, att_type) in keywords {
        if p.cursor.eat_str(keyword) {
            return Ok((*att_type, Vec::new()));
        }
    }

    // NotationType ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
    if p.cursor.eat_str("NOTATION") {
        expect_dtd_ws(p, external)?;
        p.cursor.expect('(')?;
        let names = parse_token_list(p, external, true)?;
        return Ok((AttType::Notation, names));
    }

    // Enumeration ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
    if p.cursor.eat('(') {
        let tokens = parse_token_list(p, external, false)?;
        return Ok((AttType::Enumerated, tokens));
    }

    Err(p.wf("expected an attribute type"))
}

fn parse_token_list(
    p: &mut Parser,
    external: bool,
    names_only: bool,
) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    loop {
        skip_dtd_ws(p, external)?;
        tokens.push(if names_only {
            p.cursor.read_name()?
        } else {
            p.cursor.read_nmtoken()?
        });
        skip_dtd_ws(p, external)?;
        if p.cursor.eat(')') {
            return Ok(tokens);
        }
        p.cursor.expect('|')?;
    }
}

// DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
fn parse_default_decl(p: &mut Parser, external: bool) -> Result<DefaultDecl, ParseError> {
    if p.cursor.eat_str("#REQUIRED") {
        return Ok(DefaultDecl::Required);
    }
    if p.cursor.eat_str("#IMPLIED") {
        return Ok(DefaultDecl::Implied);
    }
    if p.cursor.eat_str("#FIXED") {
        expect_dtd_ws(p, external)?;
        return Ok(DefaultDecl::Fixed(p.parse_attr_value()?));
    }
    Ok(DefaultDecl::Default(p.parse_attr_value()?))
}

// EntityDecl ::= GEDecl | PEDecl
// GEDecl ::= '<!ENTITY' S Name S EntityDef S? '>'
// PEDecl ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
fn parse_entity_decl(p: &mut Parser, external: bool) -> Result<(), ParseError> {
    p.cursor.expect_str("<!ENTITY")?;
    expect_dtd_ws(p, external)?;

    let parameter = p.cursor.eat('%');
    if parameter {
        expect_dtd_ws(p, external)?;
    }
    let name = p.cursor.read_name()?;
    expect_dtd_ws(p, external)?;

    let mut replacement = String::new();
    let mut public_id = None;
    let mut system_id = None;
    let mut ndata = None;
    let external_def = !matches!(p.cursor.peek(), Some('"' | '\''));

    if external_def {
        let (public, system) = parse_external_id(p, true)?;
        public_id = public;
        system_id = system;
        // NDataDecl ::= S 'NDATA' S Name
        if !parameter {
            let had_ws = skip_dtd_ws(p, external)?;
            if had_ws && p.cursor.eat_str("NDATA") {
                expect_dtd_ws(p, external)?;
                ndata = Some(p.cursor.read_name()?);
            }
        }
    } else {
        replacement = parse_entity_value(p, external)?;
    }

    skip_dtd_ws(p, external)?;
    p.cursor.expect('>')?;

    let decl = EntityDecl {
        name,
        replacement,
        parsed: ndata.is_none(),
        external: external_def,
        ndata,
        public_id,
        system_id,
    };
    if parameter {
        p.dtd.declare_parameter_entity(decl);
    } else {
        p.dtd.declare_entity(decl);
    }
    Ok(())
}

// EntityValue ::= '"' ([^%&"] | PEReference | Reference)* '"'
//               | "'" ([^%&'] | PEReference | Reference)* "'"
//
// Character references expand now; general entity references are kept
// literal for later expansion; parameter entities expand now, which the
// internal subset does not permit inside a declaration.
fn parse_entity_value(p: &mut Parser, external: bool) -> Result<String, ParseError> {
    let location = p.cursor.location();
    let quote = match p.cursor.next_char() {
        Some(c @ ('"' | '\'')) => c,
        _ => return Err(ParseError::not_well_formed("expected an entity value", location)),
    };

    let mut value = String::new();
    loop {
        match p.cursor.peek() {
            None => return Err(p.wf("unterminated entity value")),
            Some(c) if c == quote => {
                p.cursor.next_char();
                return Ok(value);
            }
            Some('&') => {
                p.cursor.expect('&')?;
                if p.cursor.eat('#') {
                    value.push(p.parse_char_ref()?);
                } else {
                    let name = p.cursor.read_name()?;
                    p.cursor.expect(';')?;
                    value.push('&');
                    value.push_str(&name);
                    value.push(';');
                }
            }
            Some('%') => {
                p.cursor.expect('%')?;
                let name = p.cursor.read_name()?;
                p.cursor.expect(';')?;
                if !external {
                    return Err(p.wf(
                        "parameter-entity reference inside a declaration in the internal subset",
                    ));
                }
                append_pe_replacement(p, &name, &mut value, 0)?;
            }
            Some(_) => value.push(p.cursor.consume()?),
        }
    }
}

/// Inlines a parameter entity's replacement text into a literal,
/// expanding nested parameter references as it goes.
fn append_pe_replacement(
    p: &mut Parser,
    name: &str,
    out: &mut String,
    depth: usize,
) -> Result<(), ParseError> {
    if depth > 32 {
        return Err(ParseError::RecursiveEntity {
            name: name.to_string(),
            location: p.cursor.location(),
        });
    }
    let Some(decl) = p.dtd.parameter_entity(name) else {
        return Err(p.wf(format!("undeclared parameter entity '%{name};'")));
    };
    let text = if decl.external {
        let (public, system) = (decl.public_id.clone(), decl.system_id.clone());
        p.load_external(name, public.as_deref(), system.as_deref())?
    } else {
        decl.replacement.clone()
    };

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek().is_some_and(|&n| xylem_text::is_name_start_char(n)) {
            let mut nested = String::new();
            for d in chars.by_ref() {
                if d == ';' {
                    break;
                }
                nested.push(d);
            }
            append_pe_replacement(p, &nested, out, depth + 1)?;
        } else {
            out.push(c);
        }
    }
    Ok(())
}

// NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
fn parse_notation_decl(p: &mut Parser) -> Result<(), ParseError> {
    p.cursor.expect_str("<!NOTATION")?;
    p.cursor.expect_ws()?;
    let name = p.cursor.read_name()?;
    p.cursor.expect_ws()?;

    let mut public_id = None;
    let mut system_id = None;
    if p.cursor.eat_str("PUBLIC") {
        p.cursor.expect_ws()?;
        public_id = Some(read_pubid_literal(p)?);
        let had_ws = p.cursor.skip_ws();
        if had_ws && matches!(p.cursor.peek(), Some('"' | '\'')) {
            system_id = Some(p.cursor.read_quoted()?);
        }
    } else if p.cursor.eat_str("SYSTEM") {
        p.cursor.expect_ws()?;
        system_id = Some(p.cursor.read_quoted()?);
    } else {
        return Err(p.wf("expected PUBLIC or SYSTEM in a notation declaration"));
    }

    p.cursor.skip_ws();
    p.cursor.expect('>')?;

    let decl = NotationDecl {
        name,
        public_id,
        system_id,
    };
    p.handler.notation_decl(&decl);
    p.dtd.declare_notation(decl);
    Ok(())
}

// ExternalID ::= 'SYSTEM' S SystemLiteral | 'PUBLIC' S PubidLiteral S SystemLiteral
fn parse_external_id(
    p: &mut Parser,
    required: bool,
) -> Result<(Option<String>, Option<String>), ParseError> {
    if p.cursor.eat_str("SYSTEM") {
        p.cursor.expect_ws()?;
        Ok((None, Some(p.cursor.read_quoted()?)))
    } else if p.cursor.eat_str("PUBLIC") {
        p.cursor.expect_ws()?;
        let public = read_pubid_literal(p)?;
        p.cursor.expect_ws()?;
        Ok((Some(public), Some(p.cursor.read_quoted()?)))
    } else if required {
        Err(p.wf("expected SYSTEM or PUBLIC"))
    } else {
        Ok((None, None))
    }
}

fn read_pubid_literal(p: &mut Parser) -> Result<String, ParseError> {
    let literal = p.cursor.read_quoted()?;
    if let Some(bad) = literal.chars().find(|&c| !xylem_text::is_pubid_char(c)) {
        return Err(p.wf(format!("'{bad}' is not allowed in a public identifier")));
    }
    Ok(literal)
}

// --- parameter-entity plumbing ---

/// Skips whitespace, expanding any `%name;` reference it runs into.
/// Internal-subset expansions are padded with one space on each side.
fn skip_dtd_ws(p: &mut Parser, external: bool) -> Result<bool, ParseError> {
    let mut any = false;
    loop {
        if p.cursor.skip_ws() {
            any = true;
        }
        let is_pe = p.cursor.peek() == Some('%')
            && matches!(p.cursor.peek_at(1), Some(c) if xylem_text::is_name_start_char(c));
        if !is_pe {
            return Ok(any);
        }
        expand_pe_reference(p, external)?;
        any = true;
    }
}

fn expect_dtd_ws(p: &mut Parser, external: bool) -> Result<(), ParseError> {
    if skip_dtd_ws(p, external)? {
        Ok(())
    } else {
        Err(p.wf("expected whitespace"))
    }
}

/// `PEReference ::= '%' Name ';'` — stacks the replacement text onto the
/// cursor, with the subset-dependent padding.
fn expand_pe_reference(p: &mut Parser, external: bool) -> Result<(), ParseError> {
    p.cursor.expect('%')?;
    let name = p.cursor.read_name()?;
    p.cursor.expect(';')?;

    let Some(decl) = p.dtd.parameter_entity(&name) else {
        return Err(p.wf(format!("undeclared parameter entity '%{name};'")));
    };
    let text = if decl.external {
        let (public, system) = (decl.public_id.clone(), decl.system_id.clone());
        p.load_external(&name, public.as_deref(), system.as_deref())?
    } else {
        decl.replacement.clone()
    };

    log::debug!("expanding parameter entity '%{name};' ({} chars)", text.len());
    let frame_name = format!("%{name}");
    if external {
        p.cursor.push_entity(&frame_name, &text)?;
    } else {
        p.cursor.push_literal(" ");
        p.cursor.push_entity(&frame_name, &text)?;
        p.cursor.push_literal(" ");
    }
    Ok(())
}

// Comments and PIs inside a DTD are consumed without surfacing as
// document events.
fn consume_comment(p: &mut Parser) -> Result<(), ParseError> {
    p.cursor.expect_str("<!--")?;
    loop {
        if p.cursor.eat_str("--") {
            return p.cursor.expect('>');
        }
        p.cursor.consume()?;
    }
}

fn consume_pi(p: &mut Parser) -> Result<(), ParseError> {
    p.cursor.expect_str("<?")?;
    while !p.cursor.eat_str("?>") {
        p.cursor.consume()?;
    }
    Ok(())
}
