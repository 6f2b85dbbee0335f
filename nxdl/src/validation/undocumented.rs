use serde_json::Value;

use super::Run;
use crate::error::Result;
use crate::paths::{DataPath, Segment};
use crate::problems::ProblemKind;
use crate::template::DataMapping;

impl Run<'_> {
    /// Looks up every key the walk did not consume in the schema tree.
    ///
    /// Attributes of fields that are not there are always reported. Everything else is only
    /// reported unless `ignore_undocumented` is set.
    pub(super) fn check_undocumented(
        &mut self,
        mapping: &DataMapping,
        ignore_undocumented: bool,
    ) -> Result<()> {
        for (key, value) in mapping {
            if value.is_null() || self.visited.contains(key) {
                continue;
            }

            let Ok(path) = key.parse::<DataPath>() else {
                if !ignore_undocumented {
                    self.report(key, ProblemKind::MissingDocumentation, value.clone(), vec![]);
                }
                continue;
            };

            if let Some(Segment::Attribute(attribute)) = path.last() {
                if attribute == "NX_class" {
                    continue;
                }
                let owner = key
                    .rsplit_once("/@")
                    .map_or("", |(owner, _)| owner)
                    .to_string();
                if !owner.is_empty() && !self.exists(mapping, &owner) {
                    let kind = if attribute == "units" {
                        ProblemKind::UnitWithoutField
                    } else {
                        ProblemKind::AttributeForNonExistingField
                    };
                    self.report(key, kind, value.clone(), vec![owner]);
                    continue;
                }
                if ignore_undocumented {
                    continue;
                }
                if attribute == "units" {
                    match self.tree.resolve_concept_path(&owner)? {
                        Some(field) if self.tree.node(field).is_field() => {
                            if self.tree.node(field).spec().map_or(true, |s| s.unit.is_none()) {
                                self.report(
                                    key,
                                    ProblemKind::UnitWithoutDocumentation,
                                    value.clone(),
                                    vec![],
                                );
                            }
                            continue;
                        }
                        _ => {}
                    }
                }
            } else if ignore_undocumented {
                continue;
            }

            match self.tree.resolve_concept_path(key)? {
                Some(node) => {
                    tracing::debug!(
                        path = %key,
                        concept = %self.tree.concept_path(node),
                        "unvisited key is documented"
                    );
                }
                None => {
                    self.report(key, ProblemKind::MissingDocumentation, value.clone(), vec![]);
                }
            }
        }
        Ok(())
    }

    /// Whether `path` is present in the data, as a key or as a group.
    fn exists(&self, mapping: &DataMapping, path: &str) -> bool {
        mapping.get(path).map_or(false, |value| !value.is_null()) || self.groups.contains(path)
    }
}
