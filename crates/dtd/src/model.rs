//! The declaration model parsed out of internal and external DTD subsets.

use std::collections::HashMap;

use crate::content::ContentState;
use crate::error::DtdError;

/// Occurrence indicator on a content particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

/// `contentspec ::= 'EMPTY' | 'ANY' | Mixed | children`, as an algebraic
/// tree over element names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSpec {
    Empty,
    Any,
    Element(String),
    Seq(Vec<ContentSpec>),
    Choice {
        options: Vec<ContentSpec>,
        /// `(#PCDATA | ...)`: character data is allowed anywhere.
        mixed: bool,
    },
    Repeated {
        inner: Box<ContentSpec>,
        rep: Repetition,
    },
}

impl ContentSpec {
    /// Compiles this spec into a fresh validation state machine.
    pub fn create_state(&self) -> ContentState {
        ContentState::new(self)
    }

    /// Shorthand for `(#PCDATA)`.
    pub fn pcdata() -> ContentSpec {
        ContentSpec::Choice {
            options: Vec::new(),
            mixed: true,
        }
    }
}

/// Declared attribute types (XML 1.0 §3.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation,
    Enumerated,
}

/// Default-value behavior of a declared attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultDecl {
    None,
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub att_type: AttType,
    pub default: DefaultDecl,
    /// Allowed tokens for `Notation` and `Enumerated` types.
    pub enumeration: Vec<String>,
    /// Declared in the external subset.
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: String,
    pub content: ContentSpec,
    pub attributes: Vec<AttributeDecl>,
    /// False while the element is only referenced (say, by an ATTLIST
    /// that precedes its ELEMENT declaration).
    pub declared: bool,
    pub external: bool,
}

impl ElementDecl {
    fn placeholder(name: &str) -> ElementDecl {
        ElementDecl {
            name: name.to_string(),
            content: ContentSpec::Any,
            attributes: Vec::new(),
            declared: false,
            external: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    pub replacement: String,
    /// False for NDATA (unparsed) entities.
    pub parsed: bool,
    pub external: bool,
    pub ndata: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

impl EntityDecl {
    pub fn internal(name: impl Into<String>, replacement: impl Into<String>) -> EntityDecl {
        EntityDecl {
            name: name.into(),
            replacement: replacement.into(),
            parsed: true,
            external: false,
            ndata: None,
            public_id: None,
            system_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// Everything one document type declaration contributes. A `Dtd` belongs
/// to the document whose parse produced it and is not shared.
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    pub root_name: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    elements: HashMap<String, ElementDecl>,
    entities: HashMap<String, EntityDecl>,
    parameter_entities: HashMap<String, EntityDecl>,
    notations: HashMap<String, NotationDecl>,
}

impl Dtd {
    pub fn new() -> Dtd {
        Dtd::default()
    }

    pub fn element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    pub fn parameter_entity(&self, name: &str) -> Option<&EntityDecl> {
        self.parameter_entities.get(name)
    }

    pub fn notation(&self, name: &str) -> Option<&NotationDecl> {
        self.notations.get(name)
    }

    pub fn attribute_for(&self, element: &str, attribute: &str) -> Option<&AttributeDecl> {
        self.elements.get(element)?.attribute(attribute)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementDecl> {
        self.elements.values()
    }

    /// Records an `<!ELEMENT ...>` declaration. Declaring the same
    /// element twice is a validity error.
    pub fn declare_element(
        &mut self,
        name: &str,
        content: ContentSpec,
        external: bool,
    ) -> Result<&ElementDecl, DtdError> {
        let entry = self
            .elements
            .entry(name.to_string())
            .or_insert_with(|| ElementDecl::placeholder(name));
        if entry.declared {
            return Err(DtdError::DuplicateElementDecl(name.to_string()));
        }
        entry.content = content;
        entry.declared = true;
        entry.external = external;
        Ok(entry)
    }

    /// Records one attribute definition from an `<!ATTLIST ...>`. The
    /// element entry is created as merely-referenced when its ELEMENT
    /// declaration has not been seen yet. A repeated definition for the
    /// same attribute is ignored: the first one is binding.
    pub fn declare_attribute(&mut self, element: &str, decl: AttributeDecl) {
        let entry = self
            .elements
            .entry(element.to_string())
            .or_insert_with(|| ElementDecl::placeholder(element));
        if entry.attribute(&decl.name).is_some() {
            log::debug!("ignoring repeated attribute definition {}/{}", element, decl.name);
            return;
        }
        entry.attributes.push(decl);
    }

    /// Records a general entity. The first declaration of a name binds.
    pub fn declare_entity(&mut self, decl: EntityDecl) {
        if self.entities.contains_key(&decl.name) {
            log::debug!("ignoring repeated entity declaration '{}'", decl.name);
            return;
        }
        self.entities.insert(decl.name.clone(), decl);
    }

    pub fn declare_parameter_entity(&mut self, decl: EntityDecl) {
        if self.parameter_entities.contains_key(&decl.name) {
            log::debug!("ignoring repeated parameter entity declaration '{}'", decl.name);
            return;
        }
        self.parameter_entities.insert(decl.name.clone(), decl);
    }

    pub fn declare_notation(&mut self, decl: NotationDecl) {
        self.notations.entry(decl.name.clone()).or_insert(decl);
    }
}
