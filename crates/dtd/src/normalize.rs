//! Attribute-value normalization and per-type validation (XML 1.0 §3.3.3).

use xylem_text::{is_name, is_nmtoken};

use crate::error::DtdError;
use crate::model::{AttType, AttributeDecl, DefaultDecl, Dtd};

/// Normalizes `value` according to the declared attribute type and
/// validates the result. CDATA passes through untouched; every other
/// type is tokenized: surrounding whitespace is trimmed and interior
/// runs collapse to single spaces.
pub fn normalize_attribute(
    decl: &AttributeDecl,
    value: &str,
    dtd: &Dtd,
) -> Result<String, DtdError> {
    match decl.att_type {
        AttType::CData => Ok(value.to_string()),

        AttType::Id | AttType::IdRef => {
            let trimmed = value.trim();
            check_name(trimmed, "Name")?;
            Ok(trimmed.to_string())
        }

        AttType::Entity => {
            let trimmed = value.trim();
            check_name(trimmed, "Name")?;
            check_unparsed(trimmed, dtd)?;
            Ok(trimmed.to_string())
        }

        AttType::IdRefs => normalize_list(value, |token| check_name(token, "Name")),

        AttType::Entities => normalize_list(value, |token| {
            check_name(token, "Name")?;
            check_unparsed(token, dtd)
        }),

        AttType::NmToken => {
            let trimmed = value.trim();
            check_nmtoken(trimmed)?;
            Ok(trimmed.to_string())
        }

        AttType::NmTokens => normalize_list(value, check_nmtoken),

        AttType::Notation | AttType::Enumerated => {
            let trimmed = value.trim();
            if decl.enumeration.iter().any(|t| t == trimmed) {
                Ok(trimmed.to_string())
            } else {
                Err(DtdError::NotInEnumeration(trimmed.to_string()))
            }
        }
    }
}

/// `#FIXED` attributes must carry exactly their declared value.
pub fn check_fixed(decl: &AttributeDecl, value: &str) -> Result<(), DtdError> {
    if let DefaultDecl::Fixed(declared) = &decl.default {
        if declared != value {
            return Err(DtdError::FixedMismatch {
                declared: declared.clone(),
                got: value.to_string(),
            });
        }
    }
    Ok(())
}

fn normalize_list(
    value: &str,
    check: impl Fn(&str) -> Result<(), DtdError>,
) -> Result<String, DtdError> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(DtdError::InvalidAttributeValue {
            value: value.to_string(),
            expected: "non-empty token list",
        });
    }
    for token in &tokens {
        check(token)?;
    }
    Ok(tokens.join(" "))
}

fn check_name(s: &str, expected: &'static str) -> Result<(), DtdError> {
    if is_name(s) {
        Ok(())
    } else {
        Err(DtdError::InvalidAttributeValue {
            value: s.to_string(),
            expected,
        })
    }
}

fn check_nmtoken(s: &str) -> Result<(), DtdError> {
    if is_nmtoken(s) {
        Ok(())
    } else {
        Err(DtdError::InvalidAttributeValue {
            value: s.to_string(),
            expected: "Nmtoken",
        })
    }
}

fn check_unparsed(token: &str, dtd: &Dtd) -> Result<(), DtdError> {
    match dtd.entity(token) {
        Some(decl) if !decl.parsed => Ok(()),
        _ => Err(DtdError::NotAnUnparsedEntity(token.to_string())),
    }
}
