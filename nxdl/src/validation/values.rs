use nx_builtins::{check_value, leaves, shape_of, ElementType, Nonconformance};
use serde_json::{json, Value};

use crate::problems::{ProblemCollector, ProblemKind};
use crate::tree::FieldSpec;

/// What a value of `element_type` may look like, for messages.
fn accepted(element_type: ElementType) -> &'static str {
    match element_type {
        ElementType::Binary => "bytes",
        ElementType::Boolean => "bool or \"true\"/\"false\"",
        ElementType::Char => "str",
        ElementType::DateTime => "ISO 8601 str with time zone",
        ElementType::Float | ElementType::Number => "number or numeric str",
        ElementType::Int => "int or integer str",
        ElementType::Uint => "non-negative int",
        ElementType::PosInt => "positive int",
        ElementType::Complex => "number or {\"real\", \"imag\"}",
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Checks a field or attribute value against type, enumeration and rank, stopping at the first
/// failure.
pub(crate) fn check_field_value(
    collector: &mut ProblemCollector,
    path: &str,
    spec: &FieldSpec,
    value: &Value,
) {
    let element_type = spec.element_type;
    match check_value(element_type, value) {
        Ok(()) => {}
        Err(Nonconformance::InvalidType) => {
            collector.collect_and_log(
                path,
                ProblemKind::InvalidType,
                value.clone(),
                vec![
                    element_type.nx_name().to_string(),
                    accepted(element_type).to_string(),
                ],
            );
            return;
        }
        Err(Nonconformance::NotPositive) => {
            collector.collect_and_log(path, ProblemKind::NotPositiveInt, value.clone(), vec![]);
            return;
        }
        Err(Nonconformance::InvalidDateTime) => {
            collector.collect_and_log(path, ProblemKind::InvalidDatetime, value.clone(), vec![]);
            return;
        }
    }

    if let Some(enumeration) = &spec.enumeration {
        let outside = leaves(value)
            .into_iter()
            .map(literal)
            .find(|item| !enumeration.items.contains(item));
        if let Some(item) = outside {
            if enumeration.open {
                tracing::debug!(path, item = %item, "value outside open enumeration");
            } else {
                collector.collect_and_log(
                    path,
                    ProblemKind::InvalidEnum,
                    json!(enumeration.items),
                    vec![item],
                );
                return;
            }
        }
    }

    if let Some(rank) = spec.dimensions.as_ref().and_then(|d| d.rank) {
        let shape = shape_of(value);
        if value.is_array() && shape.len() != rank {
            collector.collect_and_log(
                path,
                ProblemKind::InvalidShape,
                json!(shape),
                vec![rank.to_string()],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Dimensions, Enumeration, Occurrence};

    fn spec(element_type: ElementType) -> FieldSpec {
        FieldSpec {
            element_type,
            unit: None,
            enumeration: None,
            dimensions: None,
            link_target: None,
            occurrence: Occurrence { min: 0, max: None },
        }
    }

    #[test]
    fn type_failures_carry_the_expected_type() {
        let mut collector = ProblemCollector::silenced();
        check_field_value(&mut collector, "/a", &spec(ElementType::Int), &json!("x"));
        let problem = &collector.problems()[0];
        assert_eq!(problem.kind, ProblemKind::InvalidType);
        assert_eq!(problem.extras[0], "NX_INT");

        check_field_value(&mut collector, "/b", &spec(ElementType::PosInt), &json!(0));
        check_field_value(
            &mut collector,
            "/c",
            &spec(ElementType::DateTime),
            &json!("yesterday"),
        );
        let kinds: Vec<_> = collector.problems().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                ProblemKind::InvalidType,
                ProblemKind::NotPositiveInt,
                ProblemKind::InvalidDatetime
            ]
        );
    }

    #[test]
    fn type_failures_take_precedence_over_enumerations() {
        let mut strict = spec(ElementType::Int);
        strict.enumeration = Some(Enumeration {
            items: vec!["1".into()],
            open: false,
        });
        let mut collector = ProblemCollector::silenced();
        check_field_value(&mut collector, "/a", &strict, &json!("x"));
        check_field_value(&mut collector, "/b", &strict, &json!(2));
        let kinds: Vec<_> = collector.problems().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, [ProblemKind::InvalidType, ProblemKind::InvalidEnum]);
    }

    #[test]
    fn closed_enumerations_reject_other_values() {
        let mut closed = spec(ElementType::Char);
        closed.enumeration = Some(Enumeration {
            items: vec!["a".into(), "b".into()],
            open: false,
        });
        let mut collector = ProblemCollector::silenced();
        check_field_value(&mut collector, "/x", &closed, &json!("a"));
        check_field_value(&mut collector, "/x", &closed, &json!(["a", "b"]));
        assert!(collector.is_empty());
        check_field_value(&mut collector, "/x", &closed, &json!("c"));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.problems()[0].kind, ProblemKind::InvalidEnum);
        assert_eq!(collector.problems()[0].value, json!(["a", "b"]));

        let mut open = closed.clone();
        open.enumeration.as_mut().unwrap().open = true;
        let mut collector = ProblemCollector::silenced();
        check_field_value(&mut collector, "/x", &open, &json!("c"));
        assert!(collector.is_empty());
    }

    #[test]
    fn rank_is_checked_for_arrays() {
        let mut ranked = spec(ElementType::Float);
        ranked.dimensions = Some(Dimensions {
            rank: Some(2),
            dims: vec![],
        });
        let mut collector = ProblemCollector::silenced();
        check_field_value(&mut collector, "/x", &ranked, &json!([[1.0], [2.0]]));
        check_field_value(&mut collector, "/x", &ranked, &json!(1.0));
        assert!(collector.is_empty());
        check_field_value(&mut collector, "/y", &ranked, &json!([1.0, 2.0]));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.problems()[0].kind, ProblemKind::InvalidShape);
    }
}
