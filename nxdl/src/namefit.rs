//! Namefitting: how well a concrete name (as found in data) matches a name pattern from the
//! schema.
//!
//! Uppercase runs in a schema name are placeholders which can be replaced by any string; the
//! lowercase parts around them must appear literally. `DATA` fits any name, `DATA_mean` fits
//! `signal_mean`, and `data` only fits itself.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;
use regex::Regex;

/// How a schema name is to be matched (`nameType` attribute of NXDL elements).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum NameType {
    /// The name must be used literally.
    #[default]
    Specified,
    /// Uppercase parts of the name are placeholders, lowercase parts are literal.
    Partial,
    /// The whole name is a placeholder.
    Any,
}

impl NameType {
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value {
            "specified" => Some(Self::Specified),
            "partial" => Some(Self::Partial),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// The name type implied by the spelling of a name when none is declared.
    pub fn infer(name: &str) -> Self {
        let has_upper = name.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = name.chars().any(|c| c.is_ascii_lowercase());
        match (has_upper, has_lower) {
            (false, _) => Self::Specified,
            (true, false) => Self::Any,
            (true, true) => Self::Partial,
        }
    }
}

lazy_static! {
    static ref UPPERCASE_RUN: Regex = Regex::new(r"[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)*").unwrap();
    static ref CONCRETE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_.\-]+$").unwrap();
    /// Compiled fit patterns, keyed by pattern source.
    static ref FIT_PATTERNS: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

fn fit_regex(pattern: String) -> Option<Regex> {
    let mut patterns = FIT_PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(regex) = patterns.get(&pattern) {
        return Some(regex.clone());
    }
    let regex = Regex::new(&pattern).ok()?;
    patterns.insert(pattern, regex.clone());
    Some(regex)
}

const PLACEHOLDER: &str = r"([a-zA-Z0-9_.\-]*)";

/// Scores how well `concrete` fits the schema name `schema_name`.
///
/// An exact match scores twice the name length; otherwise each placeholder contributes the
/// number of positions at which its uppercase text and the (uppercased) replacement agree, so a
/// case-insensitive match scores the name length and an arbitrary replacement scores zero. A
/// negative score means the name does not fit at all.
pub fn namefit(concrete: &str, schema_name: &str, name_type: NameType) -> i32 {
    if concrete == schema_name {
        return 2 * schema_name.chars().count() as i32;
    }
    if name_type == NameType::Specified || !CONCRETE_NAME.is_match(concrete) {
        return -1;
    }

    let placeholders: Vec<&str> = if name_type == NameType::Any
        && !UPPERCASE_RUN.is_match(schema_name)
    {
        vec![schema_name]
    } else {
        UPPERCASE_RUN
            .find_iter(schema_name)
            .map(|m| m.as_str())
            .collect()
    };
    if placeholders.is_empty() {
        return -1;
    }

    let mut pattern = String::from("^");
    let mut rest = schema_name;
    for placeholder in &placeholders {
        let Some(at) = rest.find(placeholder) else {
            return -1;
        };
        pattern.push_str(&regex::escape(&rest[..at]));
        pattern.push_str(PLACEHOLDER);
        rest = &rest[at + placeholder.len()..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let Some(regex) = fit_regex(pattern) else {
        return -1;
    };
    let Some(captures) = regex.captures(concrete) else {
        return -1;
    };

    placeholders
        .iter()
        .zip(captures.iter().skip(1))
        .map(|(placeholder, replacement)| {
            let replacement = replacement.map_or("", |m| m.as_str());
            placeholder
                .chars()
                .zip(replacement.chars())
                .filter(|(p, r)| p.eq_ignore_ascii_case(r))
                .count() as i32
        })
        .sum()
}

/// Returns the candidate `concrete` fits best, or `None` if it fits none of them. Ties go to
/// the earliest candidate.
pub fn best_namefit_of<T, S, I>(concrete: &str, candidates: I) -> Option<T>
where
    S: AsRef<str>,
    I: IntoIterator<Item = (T, S, NameType)>,
{
    let mut best: Option<(T, i32)> = None;
    for (candidate, name, name_type) in candidates {
        let score = namefit(concrete, name.as_ref(), name_type);
        if score < 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// The placeholder name of an unnamed group: its class without the `NX` prefix, uppercased.
pub fn class_to_caps(nx_class: &str) -> String {
    nx_class
        .strip_prefix("NX")
        .unwrap_or(nx_class)
        .to_ascii_uppercase()
}
