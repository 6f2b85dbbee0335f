//! Validation of whole hierarchical files.
//!
//! A file is seen through [`HdfGroup`]: groups with attributes, datasets and soft links. Every
//! root-level group whose `@NX_class` is `NXentry` or `NXsubentry` is an entry; its
//! `definition` dataset names the application definition it is validated against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::problems::Problem;
use crate::template::DataMapping;
use crate::tree::SchemaCache;
use crate::validation::Validator;

const ENTRY_CLASSES: [&str; 2] = ["NXentry", "NXsubentry"];

/// A group of an opened hierarchical file.
pub trait HdfGroup {
    fn attributes(&self) -> Vec<(&str, &Value)>;
    fn members(&self) -> Vec<(&str, Member<'_>)>;

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes()
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

pub enum Member<'a> {
    Group(&'a dyn HdfGroup),
    Dataset {
        value: &'a Value,
        attributes: Vec<(&'a str, &'a Value)>,
    },
    SoftLink(&'a str),
}

/// An in-memory file, as read from JSON.
///
/// ```json
/// {"members": {"entry": {"group": {
///     "attributes": {"NX_class": "NXentry"},
///     "members": {"definition": {"dataset": {"value": "NXtest"}}}
/// }}}}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MemoryGroup {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub members: BTreeMap<String, MemoryNode>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryNode {
    Group(MemoryGroup),
    Dataset {
        value: Value,
        #[serde(default)]
        attributes: Map<String, Value>,
    },
    SoftLink(String),
}

impl HdfGroup for MemoryGroup {
    fn attributes(&self) -> Vec<(&str, &Value)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }

    fn members(&self) -> Vec<(&str, Member<'_>)> {
        self.members
            .iter()
            .map(|(name, node)| {
                let member = match node {
                    MemoryNode::Group(group) => Member::Group(group),
                    MemoryNode::Dataset { value, attributes } => Member::Dataset {
                        value,
                        attributes: attributes.iter().map(|(k, v)| (k.as_str(), v)).collect(),
                    },
                    MemoryNode::SoftLink(target) => Member::SoftLink(target),
                };
                (name.as_str(), member)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryOutcome {
    Valid,
    Invalid(Vec<Problem>),
    /// The entry has no `definition` dataset.
    MissingDefinition,
    /// No application definition of this name can be found.
    UnknownDefinition(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntryReport {
    pub entry: String,
    pub outcome: EntryOutcome,
}

impl EntryReport {
    pub fn is_valid(&self) -> bool {
        self.outcome == EntryOutcome::Valid
    }
}

/// Validates every entry of `root` against the definition it names.
///
/// Entries without a usable definition are reported, not raised. Errors are returned only for a
/// schema corpus that cannot be loaded.
pub fn validate_file(
    cache: &SchemaCache,
    root: &dyn HdfGroup,
    ignore_undocumented: bool,
) -> Result<Vec<EntryReport>> {
    let validator = Validator::new(cache).ignore_undocumented(ignore_undocumented);
    let mut reports = Vec::new();

    for (name, member) in root.members() {
        let Member::Group(entry) = member else {
            continue;
        };
        let is_entry = entry
            .attribute("NX_class")
            .and_then(Value::as_str)
            .map_or(false, |class| ENTRY_CLASSES.contains(&class));
        if !is_entry {
            continue;
        }

        let outcome = match definition_of(entry) {
            None => EntryOutcome::MissingDefinition,
            Some(appdef) => {
                let mapping = flatten_entry(name, entry);
                match validator.validate(&appdef, &mapping) {
                    Ok(report) if report.is_valid() => EntryOutcome::Valid,
                    Ok(report) => EntryOutcome::Invalid(report.problems),
                    Err(Error::DefinitionNotFound { .. }) => EntryOutcome::UnknownDefinition(appdef),
                    Err(err) => return Err(err),
                }
            }
        };
        tracing::debug!(entry = name, ?outcome, "validated entry");
        reports.push(EntryReport {
            entry: name.to_string(),
            outcome,
        });
    }
    Ok(reports)
}

/// The `definition` dataset of an entry, as a string or a one-element list of strings.
fn definition_of(entry: &dyn HdfGroup) -> Option<String> {
    entry.members().into_iter().find_map(|(name, member)| match member {
        Member::Dataset { value, .. } if name == "definition" => match value {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        },
        _ => None,
    })
}

/// The flat mapping of an entry, keyed below `/ENTRY[name]`.
///
/// Groups without members or attributes become `{}` and soft links become `{"link": target}`.
pub fn flatten_entry(name: &str, entry: &dyn HdfGroup) -> DataMapping {
    let mut mapping = DataMapping::new();
    flatten_group(&format!("/ENTRY[{name}]"), entry, &mut mapping);
    mapping
}

fn flatten_group(path: &str, group: &dyn HdfGroup, mapping: &mut DataMapping) {
    let attributes = group.attributes();
    let members = group.members();
    if attributes.is_empty() && members.is_empty() {
        mapping.insert(path.to_string(), json!({}));
        return;
    }

    for (name, value) in attributes {
        mapping.insert(format!("{path}/@{name}"), value.clone());
    }
    for (name, member) in members {
        let child = format!("{path}/{name}");
        match member {
            Member::Group(group) => flatten_group(&child, group, mapping),
            Member::Dataset { value, attributes } => {
                mapping.insert(child.clone(), value.clone());
                for (attribute, value) in attributes {
                    mapping.insert(format!("{child}/@{attribute}"), value.clone());
                }
            }
            Member::SoftLink(target) => {
                mapping.insert(child, json!({ "link": target }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::ProblemKind;
    use crate::test_support::fixture_loader;

    fn plot_file() -> MemoryGroup {
        serde_json::from_value(json!({
            "attributes": {"default": "entry"},
            "members": {
                "entry": {"group": {
                    "attributes": {"NX_class": "NXentry"},
                    "members": {
                        "definition": {"dataset": {"value": "NXplot"}},
                        "instrument": {"group": {
                            "attributes": {"NX_class": "NXinstrument"},
                            "members": {
                                "detector": {"group": {
                                    "attributes": {"NX_class": "NXdetector"},
                                    "members": {
                                        "energy": {"dataset": {
                                            "value": [1.0, 2.0, 3.0],
                                            "attributes": {"units": "eV"}
                                        }}
                                    }
                                }}
                            }
                        }},
                        "data": {"group": {
                            "attributes": {
                                "NX_class": "NXdata",
                                "signal": "counts",
                                "axes": ["energy"]
                            },
                            "members": {
                                "counts": {"dataset": {"value": [10, 20, 30]}},
                                "energy": {"soft_link": "/entry/instrument/detector/energy"}
                            }
                        }}
                    }
                }},
                "calibration": {"group": {
                    "attributes": {"NX_class": "NXcollection"}
                }}
            }
        }))
        .unwrap()
    }

    #[test]
    fn entries_flatten_below_their_concept() {
        let file = plot_file();
        let MemoryNode::Group(entry) = &file.members["entry"] else {
            unreachable!()
        };
        let mapping = flatten_entry("entry", entry);

        assert_eq!(mapping["/ENTRY[entry]/@NX_class"], json!("NXentry"));
        assert_eq!(mapping["/ENTRY[entry]/definition"], json!("NXplot"));
        assert_eq!(
            mapping["/ENTRY[entry]/instrument/detector/energy/@units"],
            json!("eV")
        );
        assert_eq!(
            mapping["/ENTRY[entry]/data/energy"],
            json!({"link": "/entry/instrument/detector/energy"})
        );
    }

    #[test]
    fn linked_plot_is_valid() {
        let cache = SchemaCache::new(fixture_loader());
        let reports = validate_file(&cache, &plot_file(), false).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].entry, "entry");
        assert_eq!(reports[0].outcome, EntryOutcome::Valid);
        assert!(reports[0].is_valid());
    }

    #[test]
    fn definitions_are_reported_not_raised() {
        let cache = SchemaCache::new(fixture_loader());
        let file: MemoryGroup = serde_json::from_value(json!({
            "members": {
                "first": {"group": {
                    "attributes": {"NX_class": "NXentry"},
                    "members": {"title": {"dataset": {"value": "no definition"}}}
                }},
                "second": {"group": {
                    "attributes": {"NX_class": "NXsubentry"},
                    "members": {"definition": {"dataset": {"value": ["NXnothing"]}}}
                }},
                "third": {"group": {
                    "attributes": {"NX_class": "NXentry"},
                    "members": {"definition": {"dataset": {"value": "NXtest"}}}
                }}
            }
        }))
        .unwrap();

        let reports = validate_file(&cache, &file, false).unwrap();
        let entries: Vec<&str> = reports.iter().map(|r| r.entry.as_str()).collect();
        assert_eq!(entries, ["first", "second", "third"]);
        assert_eq!(reports[0].outcome, EntryOutcome::MissingDefinition);
        assert_eq!(
            reports[1].outcome,
            EntryOutcome::UnknownDefinition("NXnothing".into())
        );

        let EntryOutcome::Invalid(problems) = &reports[2].outcome else {
            panic!("expected problems, got {:?}", reports[2].outcome);
        };
        assert!(problems
            .iter()
            .any(|p| p.kind == ProblemKind::MissingRequiredField
                && p.path == "/ENTRY[third]/program_name"));
    }
}
