//! Built-in NeXus element types (`NX_CHAR`, `NX_INT`, ...) and the conformance checks that
//! decide whether a concrete value is a valid instance of one of them.

pub mod meta;

use std::fmt;

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

pub use meta::LiteralError;

/// The closed set of element types a field or attribute can declare.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ElementType {
    Binary,
    Boolean,
    #[default]
    Char,
    DateTime,
    Float,
    Int,
    Uint,
    Number,
    PosInt,
    Complex,
}

impl ElementType {
    pub const ALL: [ElementType; 10] = [
        Self::Binary,
        Self::Boolean,
        Self::Char,
        Self::DateTime,
        Self::Float,
        Self::Int,
        Self::Uint,
        Self::Number,
        Self::PosInt,
        Self::Complex,
    ];

    /// Maps the `type` attribute of an NXDL field or attribute to an element type.
    pub fn from_nx_name(name: &str) -> Result<Self, LiteralError> {
        Ok(match name {
            "NX_BINARY" => Self::Binary,
            "NX_BOOLEAN" => Self::Boolean,
            "NX_CHAR" => Self::Char,
            "NX_DATE_TIME" | "ISO8601" => Self::DateTime,
            "NX_FLOAT" => Self::Float,
            "NX_INT" => Self::Int,
            "NX_UINT" => Self::Uint,
            "NX_NUMBER" => Self::Number,
            "NX_POSINT" => Self::PosInt,
            "NX_COMPLEX" => Self::Complex,
            _ => return Err(LiteralError::UnknownType(name.to_string())),
        })
    }

    pub fn nx_name(self) -> &'static str {
        match self {
            Self::Binary => "NX_BINARY",
            Self::Boolean => "NX_BOOLEAN",
            Self::Char => "NX_CHAR",
            Self::DateTime => "NX_DATE_TIME",
            Self::Float => "NX_FLOAT",
            Self::Int => "NX_INT",
            Self::Uint => "NX_UINT",
            Self::Number => "NX_NUMBER",
            Self::PosInt => "NX_POSINT",
            Self::Complex => "NX_COMPLEX",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nx_name())
    }
}

/// Why a value does not conform to an [`ElementType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Nonconformance {
    /// The value (or one of its elements) is not of the declared type, even after the single
    /// implicit conversion attempt.
    InvalidType,
    /// An `NX_POSINT` element is zero or negative.
    NotPositive,
    /// An `NX_DATE_TIME` string is not ISO 8601 with an explicit time zone.
    InvalidDateTime,
}

/// Checks `value` element-wise against `element_type`.
///
/// Arrays (nested to any depth) are checked element by element. Strings get one conversion
/// attempt: numeric strings count as numbers and `"true"`/`"false"` count as booleans.
pub fn check_value(element_type: ElementType, value: &Value) -> Result<(), Nonconformance> {
    if element_type == ElementType::Binary {
        return Ok(());
    }

    let mut not_positive = false;
    for leaf in leaves(value) {
        match check_scalar(element_type, leaf) {
            Ok(()) => {}
            Err(Nonconformance::NotPositive) => not_positive = true,
            Err(other) => return Err(other),
        }
    }

    if not_positive {
        Err(Nonconformance::NotPositive)
    } else {
        Ok(())
    }
}

fn check_scalar(element_type: ElementType, value: &Value) -> Result<(), Nonconformance> {
    use ElementType::*;

    match element_type {
        Binary => Ok(()),
        Boolean => match value {
            Value::Bool(_) => Ok(()),
            Value::String(s) if meta::bool_from_literal(s).is_ok() => Ok(()),
            _ => Err(Nonconformance::InvalidType),
        },
        Char => match value {
            Value::String(_) => Ok(()),
            _ => Err(Nonconformance::InvalidType),
        },
        DateTime => match value {
            Value::String(s) if is_valid_datetime(s) => Ok(()),
            Value::String(_) => Err(Nonconformance::InvalidDateTime),
            _ => Err(Nonconformance::InvalidType),
        },
        Float | Number => match value {
            // ints are widened to floats
            Value::Number(_) => Ok(()),
            Value::String(s) if meta::float_from_literal(s).is_ok() => Ok(()),
            _ => Err(Nonconformance::InvalidType),
        },
        Int => integer_of(value).map(|_| ()),
        Uint => match integer_of(value)? {
            i if i >= 0 => Ok(()),
            _ => Err(Nonconformance::InvalidType),
        },
        PosInt => match integer_of(value)? {
            i if i > 0 => Ok(()),
            _ => Err(Nonconformance::NotPositive),
        },
        Complex => match value {
            Value::Number(_) => Ok(()),
            Value::Object(parts)
                if parts.len() == 2
                    && parts.get("real").map_or(false, Value::is_number)
                    && parts.get("imag").map_or(false, Value::is_number) =>
            {
                Ok(())
            }
            _ => Err(Nonconformance::InvalidType),
        },
    }
}

/// Integers are compared as `i128` so that the whole `u64` range stays representable.
fn integer_of(value: &Value) -> Result<i128, Nonconformance> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into())
            } else if let Some(u) = n.as_u64() {
                Ok(u.into())
            } else {
                Err(Nonconformance::InvalidType)
            }
        }
        Value::String(s) => meta::int_from_literal(s)
            .map(Into::into)
            .map_err(|_| Nonconformance::InvalidType),
        _ => Err(Nonconformance::InvalidType),
    }
}

/// Flattens nested arrays into their scalar elements.
pub fn leaves(value: &Value) -> Vec<&Value> {
    fn walk<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
        match value {
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            other => out.push(other),
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

/// The shape of a (possibly nested) array: the length along each axis, following the first
/// element at every level. Scalars have an empty shape.
pub fn shape_of(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = value;
    while let Value::Array(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

lazy_static! {
    static ref ISO8601: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|([+-])(\d{2})(?::?(\d{2}))?)$"
    )
    .unwrap();
}

/// An ISO 8601 timestamp with date, time and an explicit time zone designator.
///
/// Accepted designators are `Z`, `±HH:MM`, `±HHMM` and `±HH`. The "unknown local offset"
/// designator `-00:00` (RFC 3339 §4.3) is rejected.
pub fn is_valid_datetime(literal: &str) -> bool {
    let Some(captures) = ISO8601.captures(literal) else {
        return false;
    };
    let number = |i: usize| -> u32 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    if NaiveDate::from_ymd_opt(number(1) as i32, number(2), number(3)).is_none() {
        return false;
    }
    if NaiveTime::from_hms_opt(number(4), number(5), number(6)).is_none() {
        return false;
    }

    if let Some(sign) = captures.get(9) {
        let seconds = (number(10) * 3600 + number(11) * 60) as i32;
        if sign.as_str() == "-" && seconds == 0 {
            return false;
        }
        if FixedOffset::east_opt(seconds).is_none() {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_names_round_trip() {
        for element_type in ElementType::ALL {
            assert_eq!(
                ElementType::from_nx_name(element_type.nx_name()),
                Ok(element_type)
            );
        }
        assert_eq!(
            ElementType::from_nx_name("ISO8601"),
            Ok(ElementType::DateTime)
        );
        assert!(ElementType::from_nx_name("NX_WHATEVER").is_err());
    }

    #[test]
    fn integers_accept_numeric_strings_once() {
        assert_eq!(check_value(ElementType::Int, &json!(2)), Ok(()));
        assert_eq!(check_value(ElementType::Int, &json!("2")), Ok(()));
        assert_eq!(
            check_value(ElementType::Int, &json!(2.5)),
            Err(Nonconformance::InvalidType)
        );
        assert_eq!(
            check_value(ElementType::Uint, &json!(-1)),
            Err(Nonconformance::InvalidType)
        );
    }

    #[test]
    fn posint_is_checked_element_wise() {
        assert_eq!(check_value(ElementType::PosInt, &json!([1, 2, 3])), Ok(()));
        assert_eq!(
            check_value(ElementType::PosInt, &json!([1, 0, 3])),
            Err(Nonconformance::NotPositive)
        );
        assert_eq!(
            check_value(ElementType::PosInt, &json!([1, "x"])),
            Err(Nonconformance::InvalidType)
        );
    }

    #[test]
    fn floats_widen_integers() {
        assert_eq!(check_value(ElementType::Float, &json!(2)), Ok(()));
        assert_eq!(check_value(ElementType::Float, &json!([[1.0, 2.0]])), Ok(()));
        assert_eq!(
            check_value(ElementType::Float, &json!("abc")),
            Err(Nonconformance::InvalidType)
        );
    }

    #[test]
    fn booleans_and_chars() {
        assert_eq!(check_value(ElementType::Boolean, &json!(true)), Ok(()));
        assert_eq!(check_value(ElementType::Boolean, &json!("False")), Ok(()));
        assert_eq!(
            check_value(ElementType::Boolean, &json!(1)),
            Err(Nonconformance::InvalidType)
        );
        assert_eq!(check_value(ElementType::Char, &json!(["a", "b"])), Ok(()));
        assert_eq!(
            check_value(ElementType::Char, &json!(3)),
            Err(Nonconformance::InvalidType)
        );
    }

    #[test]
    fn complex_values() {
        assert_eq!(
            check_value(ElementType::Complex, &json!({"real": 1.0, "imag": -2})),
            Ok(())
        );
        assert_eq!(
            check_value(ElementType::Complex, &json!({"real": 1.0})),
            Err(Nonconformance::InvalidType)
        );
    }

    #[test]
    fn datetimes_need_a_zone() {
        assert!(is_valid_datetime("2022-01-22T12:14:12.05018+00:00"));
        assert!(is_valid_datetime("2022-01-22T12:14:12Z"));
        assert!(is_valid_datetime("2022-01-22 12:14:12+0130"));
        assert!(!is_valid_datetime("2022-01-22T12:14:12.05018-00:00"));
        assert!(!is_valid_datetime("2022-01-22T12:14:12"));
        assert!(!is_valid_datetime("2022-13-22T12:14:12Z"));
        assert_eq!(
            check_value(ElementType::DateTime, &json!("2022-01-22T12:14:12-00:00")),
            Err(Nonconformance::InvalidDateTime)
        );
    }

    #[test]
    fn shapes_follow_the_first_element() {
        assert_eq!(shape_of(&json!(1)), Vec::<usize>::new());
        assert_eq!(shape_of(&json!([1, 2, 3])), vec![3]);
        assert_eq!(shape_of(&json!([[1, 2], [3, 4], [5, 6]])), vec![3, 2]);
    }
}
