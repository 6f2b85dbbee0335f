use std::borrow::Cow;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("unknown NeXus element type {0:?}")]
    UnknownType(String),
    #[error("value {value:?} is not a valid {expected} literal")]
    InvalidLiteral { value: String, expected: &'static str },
}

pub enum Whitespace {
    Preserve,
    Replace,
    Collapse,
}

/// Normalizes text content read from NXDL documents (enumeration items, dimension values).
pub fn normalized_value(value: &str, whitespace: Whitespace) -> Cow<str> {
    match whitespace {
        Whitespace::Preserve => Cow::Borrowed(value),
        Whitespace::Replace => {
            if value.contains(['\t', '\n', '\r']) {
                Cow::Owned(value.replace(['\t', '\n', '\r'], " "))
            } else {
                Cow::Borrowed(value)
            }
        }
        Whitespace::Collapse => {
            let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed == value {
                Cow::Borrowed(value)
            } else {
                Cow::Owned(collapsed)
            }
        }
    }
}

/// Reads a boolean the way readers commonly hand them over: `true`/`false` in any case.
pub fn bool_from_literal(literal: &str) -> Result<bool, LiteralError> {
    let trimmed = literal.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(LiteralError::InvalidLiteral {
            value: literal.to_string(),
            expected: "boolean",
        })
    }
}

pub fn int_from_literal(literal: &str) -> Result<i64, LiteralError> {
    literal
        .trim()
        .parse()
        .map_err(|_| LiteralError::InvalidLiteral {
            value: literal.to_string(),
            expected: "integer",
        })
}

pub fn float_from_literal(literal: &str) -> Result<f64, LiteralError> {
    literal
        .trim()
        .parse()
        .map_err(|_| LiteralError::InvalidLiteral {
            value: literal.to_string(),
            expected: "float",
        })
}
