use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// What is wrong with a piece of data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    UnitWithoutDocumentation,
    InvalidEnum,
    MissingRequiredGroup,
    MissingRequiredField,
    MissingRequiredAttribute,
    InvalidType,
    InvalidDatetime,
    NotPositiveInt,
    ExpectedGroup,
    MissingDocumentation,
    MissingUnit,
    InvalidUnit,
    ChoiceValidationError,
    UnitWithoutField,
    AttributeForNonExistingField,
    BrokenLink,
    FailedNamefitting,
    NxdataMissingSignal,
    NxdataMissingAxis,
    NxdataAxisMismatch,
    InvalidTransformationType,
    InvalidShape,
    TooMany,
    FieldWithChildren,
}

impl ProblemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnitWithoutDocumentation => "unit-without-documentation",
            Self::InvalidEnum => "invalid-enum",
            Self::MissingRequiredGroup => "missing-required-group",
            Self::MissingRequiredField => "missing-required-field",
            Self::MissingRequiredAttribute => "missing-required-attribute",
            Self::InvalidType => "invalid-type",
            Self::InvalidDatetime => "invalid-datetime",
            Self::NotPositiveInt => "not-positive-int",
            Self::ExpectedGroup => "expected-group",
            Self::MissingDocumentation => "missing-documentation",
            Self::MissingUnit => "missing-unit",
            Self::InvalidUnit => "invalid-unit",
            Self::ChoiceValidationError => "choice-validation-error",
            Self::UnitWithoutField => "unit-without-field",
            Self::AttributeForNonExistingField => "attribute-for-non-existing-field",
            Self::BrokenLink => "broken-link",
            Self::FailedNamefitting => "failed-namefitting",
            Self::NxdataMissingSignal => "nxdata-missing-signal",
            Self::NxdataMissingAxis => "nxdata-missing-axis",
            Self::NxdataAxisMismatch => "nxdata-axis-mismatch",
            Self::InvalidTransformationType => "invalid-transformation-type",
            Self::InvalidShape => "invalid-shape",
            Self::TooMany => "too-many",
            Self::FieldWithChildren => "field-with-children",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single issue found in data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Problem {
    pub path: String,
    pub kind: ProblemKind,
    /// The offending value, or for `invalid-enum` the list of allowed items.
    pub value: Value,
    pub extras: Vec<String>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProblemKind::*;

        let path = &self.path;
        let value = &self.value;
        let extra = |i: usize| self.extras.get(i).map(String::as_str).unwrap_or("");
        match self.kind {
            UnitWithoutDocumentation => write!(
                f,
                "the unit {value} at {path} is not allowed: the field is documented without units"
            ),
            InvalidEnum => write!(
                f,
                "the value at {path} should be one of the following: {value}"
            ),
            MissingRequiredGroup => write!(f, "the required group {path} hasn't been supplied"),
            MissingRequiredField => write!(f, "the data entry corresponding to {path} is required and hasn't been supplied"),
            MissingRequiredAttribute => {
                write!(f, "the required attribute {path} hasn't been supplied")
            }
            InvalidType => write!(
                f,
                "the value at {path} should be one of {}, as defined in the NXDL as {}",
                extra(1),
                extra(0)
            ),
            InvalidDatetime => write!(
                f,
                "the value at {path} = {value} should be a timezone aware ISO8601 formatted str; for example, 2022-01-22T12:14:12.05018Z or 2022-01-22T12:14:12.05018+00:00"
            ),
            NotPositiveInt => write!(f, "the value at {path} should be a positive int, but is {value}"),
            ExpectedGroup => write!(f, "expected a group at {path} but found a field or attribute"),
            MissingDocumentation => write!(f, "no documentation found for {path}"),
            MissingUnit => write!(f, "missing or unparseable unit for {path} of category {}", extra(0)),
            InvalidUnit => write!(
                f,
                "the unit {value} at {path} does not match the unit category {}",
                extra(0)
            ),
            ChoiceValidationError => write!(
                f,
                "no valid alternative of the choice at {path}; candidates: {}",
                self.extras.join(", ")
            ),
            UnitWithoutField => write!(f, "unit {path} in dataset without its field {}", extra(0)),
            AttributeForNonExistingField => write!(
                f,
                "there were attributes set for the field {path}, but the field does not exist"
            ),
            BrokenLink => write!(f, "broken link at {path} to {value}"),
            FailedNamefitting => write!(f, "found no namefit of {path} in {}", extra(0)),
            NxdataMissingSignal => write!(f, "the NXdata group {path} has no valid signal"),
            NxdataMissingAxis => write!(f, "the axis {value} referenced at {path} is missing"),
            NxdataAxisMismatch => write!(
                f,
                "length of axis {path} does not match the signal {} in dimension {}",
                extra(0),
                extra(1)
            ),
            InvalidTransformationType => write!(
                f,
                "invalid transformation type {value} at {path}, should be one of: translation, rotation"
            ),
            InvalidShape => write!(
                f,
                "the value at {path} has rank {value}, expected rank {}",
                extra(0)
            ),
            TooMany => write!(
                f,
                "the group {path} occurs {value} times, at most {} allowed",
                extra(0)
            ),
            FieldWithChildren => write!(
                f,
                "{path} is below the field {}, which cannot have children",
                extra(0)
            ),
        }
    }
}

/// Accumulates the problems of one validation run.
///
/// Problems are deduplicated on their path: the first problem reported for a path wins.
/// Unless silenced, every new problem is also emitted as a `WARN` event under the
/// `nxdl::problems` target.
#[derive(Clone, Debug, Default)]
pub struct ProblemCollector {
    problems: Vec<Problem>,
    silenced: bool,
}

impl ProblemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector for speculative validation: records problems without logging them.
    pub fn silenced() -> Self {
        Self {
            problems: Vec::new(),
            silenced: true,
        }
    }

    pub fn is_silenced(&self) -> bool {
        self.silenced
    }

    pub fn collect_and_log(
        &mut self,
        path: impl Into<String>,
        kind: ProblemKind,
        value: Value,
        extras: Vec<String>,
    ) {
        let path = path.into();
        if self.problems.iter().any(|p| p.path == path) {
            return;
        }
        let problem = Problem {
            path,
            kind,
            value,
            extras,
        };
        if !self.silenced {
            tracing::warn!(
                target: "nxdl::problems",
                path = %problem.path,
                kind = %problem.kind,
                "{problem}"
            );
        }
        self.problems.push(problem);
    }

    /// Takes over the problems of another (typically silenced) collector, logging them as if
    /// they had been reported here.
    pub fn absorb(&mut self, other: ProblemCollector) {
        for problem in other.problems {
            self.collect_and_log(problem.path, problem.kind, problem.value, problem.extras);
        }
    }

    pub fn has_validation_problems(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn into_problems(self) -> Vec<Problem> {
        self.problems
    }

    pub fn clear(&mut self) {
        self.problems.clear();
    }

    /// One line per problem, sorted by path and kind.
    pub fn report(&self) -> String {
        render_report(&self.problems)
    }
}

pub(crate) fn render_report(problems: &[Problem]) -> String {
    let mut sorted: Vec<&Problem> = problems.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
    sorted
        .iter()
        .map(|p| format!("{}: {p}\n", p.kind))
        .collect()
}
