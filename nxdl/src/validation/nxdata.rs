//! Plottable data: `NXdata` groups name their signal and axes in attributes.

use std::collections::HashSet;

use nx_builtins::shape_of;
use serde_json::{json, Value};

use super::nested::{DataEntry, DataGroup};
use super::{Resolved, Run};
use crate::error::Result;
use crate::problems::ProblemKind;
use crate::tree::builder::Want;
use crate::tree::NodeId;

/// Attributes consumed here rather than by the generic walk.
const CONSUMED_ATTRIBUTES: [&str; 3] = ["@signal", "@axes", "@auxiliary_signals"];

/// `@axes` may be a list or a single name.
fn axis_names(axes: Option<&Value>) -> Vec<&str> {
    match axes {
        Some(Value::String(axis)) => vec![axis.as_str()],
        Some(Value::Array(axes)) => axes.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn index_of(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => items.first().and_then(index_of),
        other => other.as_u64().and_then(|i| usize::try_from(i).ok()),
    }
}

impl<'a> Run<'a> {
    /// Checks signal, axes and their uncertainties. Returns the keys of the group that were
    /// handled here.
    pub(super) fn validate_nxdata(
        &mut self,
        node: NodeId,
        group: &'a DataGroup,
    ) -> Result<HashSet<&'a str>> {
        let mut handled: HashSet<&'a str> = HashSet::new();
        for entry in &group.entries {
            let consumed = CONSUMED_ATTRIBUTES.contains(&entry.key.as_str())
                || (entry.key.starts_with('@') && entry.key.ends_with("_indices"));
            if consumed {
                self.visit(&entry.path);
                handled.insert(entry.key.as_str());
            }
        }

        let Some(signal) = group.attribute("signal").and_then(Value::as_str) else {
            self.report(
                format!("{}/@signal", group.path),
                ProblemKind::NxdataMissingSignal,
                Value::Null,
                vec![],
            );
            return Ok(handled);
        };
        let Some(signal_entry) = group.entry_by_instance(signal) else {
            self.report(
                format!("{}/{signal}", group.path),
                ProblemKind::NxdataMissingSignal,
                json!(signal),
                vec![],
            );
            return Ok(handled);
        };

        self.check_data_field(node, group, signal_entry, "DATA", &mut handled)?;
        let signal_shape = self.shape_of_entry(signal_entry);

        for (position, axis) in axis_names(group.attribute("axes")).into_iter().enumerate() {
            if axis == "." {
                continue;
            }
            let Some(axis_entry) = group.entry_by_instance(axis) else {
                self.report(
                    format!("{}/{axis}", group.path),
                    ProblemKind::NxdataMissingAxis,
                    json!(axis),
                    vec![],
                );
                continue;
            };
            self.check_data_field(node, group, axis_entry, "AXISNAME", &mut handled)?;

            let dimension = group
                .attribute(&format!("{axis}_indices"))
                .and_then(index_of)
                .unwrap_or(position);
            let (Some(shape), Some(length)) = (
                signal_shape.as_ref(),
                self.shape_of_entry(axis_entry).and_then(|s| s.first().copied()),
            ) else {
                continue;
            };
            if shape.get(dimension) != Some(&length) {
                self.report(
                    &axis_entry.path,
                    ProblemKind::NxdataAxisMismatch,
                    json!(length),
                    vec![signal.to_string(), dimension.to_string()],
                );
            }
        }
        Ok(handled)
    }

    /// The shape of a field value after following links, or `None` for scalars and values
    /// that cannot be reached.
    fn shape_of_entry(&self, entry: &'a DataEntry) -> Option<Vec<usize>> {
        match self.resolve(entry.leaf()?) {
            Resolved::Leaf(value) if value.is_array() => Some(shape_of(value)),
            _ => None,
        }
    }

    /// Validates a signal or axis field and its `_errors` companion against the field the
    /// schema declares under the same name, or the base-class `concept` otherwise.
    fn check_data_field(
        &mut self,
        node: NodeId,
        group: &'a DataGroup,
        entry: &'a DataEntry,
        concept: &str,
        handled: &mut HashSet<&'a str>,
    ) -> Result<()> {
        let name = entry.instance();
        if let Some(field) = self.data_field(node, name, concept)? {
            self.check_field_entry(group, field, entry)?;
        }
        handled.insert(entry.key.as_str());

        if let Some(errors) = group.entry_by_instance(&format!("{name}_errors")) {
            let errors_name = errors.instance().to_string();
            if let Some(field) = self.data_field(node, &errors_name, "DATA_errors")? {
                self.check_field_entry(group, field, errors)?;
            }
            handled.insert(errors.key.as_str());
        }
        Ok(())
    }

    fn data_field(&mut self, node: NodeId, name: &str, concept: &str) -> Result<Option<NodeId>> {
        if let Some(found) = self.tree.search_add_child_for(node, name, Want::Field)? {
            if self.tree.node(found).name == name {
                return Ok(Some(found));
            }
        }
        self.tree.search_add_child_for(node, concept, Want::Field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_may_be_scalar_or_list() {
        assert_eq!(axis_names(Some(&json!("x"))), ["x"]);
        assert_eq!(axis_names(Some(&json!(["x", ".", "y"]))), ["x", ".", "y"]);
        assert!(axis_names(Some(&json!(3))).is_empty());
        assert!(axis_names(None).is_empty());
    }

    #[test]
    fn indices_take_the_first_element() {
        assert_eq!(index_of(&json!(1)), Some(1));
        assert_eq!(index_of(&json!([2, 3])), Some(2));
        assert_eq!(index_of(&json!("1")), None);
    }
}
