//! Qualified names: `prefix:local` or plain `local`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QName {
    prefix: String,
    local: String,
}

impl QName {
    /// Splits a written name at the first colon. `"p:l"` yields prefix
    /// `"p"`, `"l"` yields an empty prefix.
    pub fn parse(qname: &str) -> QName {
        match qname.split_once(':') {
            Some((prefix, local)) => QName {
                prefix: prefix.to_string(),
                local: local.to_string(),
            },
            None => QName {
                prefix: String::new(),
                local: qname.to_string(),
            },
        }
    }

    pub fn from_parts(prefix: impl Into<String>, local: impl Into<String>) -> QName {
        QName {
            prefix: prefix.into(),
            local: local.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// True for `xmlns` and `xmlns:p` attribute names, which declare
    /// namespaces rather than carry element data.
    pub fn is_namespace_decl(&self) -> bool {
        self.prefix == "xmlns" || (self.prefix.is_empty() && self.local == "xmlns")
    }

    /// The prefix a namespace declaration binds: empty for the default
    /// namespace, `p` for `xmlns:p`.
    pub fn declared_prefix(&self) -> Option<&str> {
        if self.prefix == "xmlns" {
            Some(&self.local)
        } else if self.prefix.is_empty() && self.local == "xmlns" {
            Some("")
        } else {
            None
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

impl From<&str> for QName {
    fn from(s: &str) -> QName {
        QName::parse(s)
    }
}

impl From<String> for QName {
    fn from(s: String) -> QName {
        QName::parse(&s)
    }
}
