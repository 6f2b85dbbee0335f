//! Data-converter paths such as `/ENTRY[entry]/DATA[data]/@signal`.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One `/`-separated component of a [`DataPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `CONCEPT[instance]` or a bare `name`.
    Named {
        concept: Option<String>,
        instance: String,
    },
    /// `@name`
    Attribute(String),
}

impl Segment {
    pub fn named(instance: impl Into<String>) -> Self {
        Self::Named {
            concept: None,
            instance: instance.into(),
        }
    }

    pub fn qualified(concept: impl Into<String>, instance: impl Into<String>) -> Self {
        Self::Named {
            concept: Some(concept.into()),
            instance: instance.into(),
        }
    }

    /// The name as it appears in data.
    pub fn instance(&self) -> &str {
        match self {
            Self::Named { instance, .. } => instance,
            Self::Attribute(name) => name,
        }
    }

    /// The schema name this segment refers to: the concept if qualified, else the instance.
    pub fn concept(&self) -> &str {
        match self {
            Self::Named {
                concept: Some(concept),
                ..
            } => concept,
            other => other.instance(),
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named {
                concept: Some(concept),
                instance,
            } => write!(f, "{concept}[{instance}]"),
            Self::Named {
                concept: None,
                instance,
            } => f.write_str(instance),
            Self::Attribute(name) => write!(f, "@{name}"),
        }
    }
}

fn is_name_char(c: char) -> bool {
    !c.is_control() && !matches!(c, '/' | '[' | ']' | '@')
}

fn is_concept_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidPath(s.to_string());

        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(invalid());
            }
            return Ok(Self::Attribute(name.to_string()));
        }

        match s.find('[') {
            Some(open) => {
                let concept = &s[..open];
                let instance = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
                if concept.is_empty()
                    || !concept.chars().all(is_concept_char)
                    || instance.is_empty()
                    || !instance.chars().all(is_name_char)
                {
                    return Err(invalid());
                }
                Ok(Self::qualified(concept, instance))
            }
            None if !s.is_empty() && s.chars().all(is_name_char) => Ok(Self::named(s)),
            None => Err(invalid()),
        }
    }
}

/// A parsed path: `("/" segment)+`. Attribute segments may only appear last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataPath {
    segments: Vec<Segment>,
}

impl DataPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn is_attribute(&self) -> bool {
        self.last().map_or(false, Segment::is_attribute)
    }

    pub fn parent(&self) -> Option<DataPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn join(&self, segment: Segment) -> DataPath {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// The path of schema names, e.g. `/ENTRY[entry]/DATA[x]/@units` becomes
    /// `/ENTRY/DATA/units`.
    pub fn concept_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("/{}", s.concept()))
            .collect()
    }
}

impl FromStr for DataPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| Error::InvalidPath(s.to_string()))?;
        let segments = rest
            .split('/')
            .map(str::parse)
            .collect::<Result<Vec<Segment>, _>>()
            .map_err(|_| Error::InvalidPath(s.to_string()))?;

        let attribute_before_end = segments
            .iter()
            .rev()
            .skip(1)
            .any(Segment::is_attribute);
        if attribute_before_end {
            return Err(Error::InvalidPath(s.to_string()));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_named_and_attribute_segments() {
        let path: DataPath = "/ENTRY[entry]/title/@units".parse().unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::qualified("ENTRY", "entry"),
                Segment::named("title"),
                Segment::Attribute("units".into()),
            ]
        );
        assert!(path.is_attribute());
        assert_eq!(path.to_string(), "/ENTRY[entry]/title/@units");
        assert_eq!(path.concept_path(), "/ENTRY/title/units");
    }

    #[test]
    fn partial_concepts_are_accepted() {
        let path: DataPath = "/ENTRY[e]/DATA[d]/AXISNAME_indices[x_indices]"
            .parse()
            .unwrap();
        assert_eq!(path.last().unwrap().concept(), "AXISNAME_indices");
        assert_eq!(path.last().unwrap().instance(), "x_indices");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in [
            "",
            "entry",
            "/",
            "/ENTRY[entry",
            "/ENTRY[]",
            "/[entry]",
            "/a//b",
            "/@units/x",
            "/a@b",
        ] {
            assert!(bad.parse::<DataPath>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn parent_drops_the_last_segment() {
        let path: DataPath = "/ENTRY[entry]/DATA[data]".parse().unwrap();
        assert_eq!(
            path.parent().unwrap().to_string(),
            "/ENTRY[entry]"
        );
    }
}
