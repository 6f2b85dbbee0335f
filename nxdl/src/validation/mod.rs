//! Validation of flat data mappings against schema trees.
//!
//! The mapping is nested (see [`nested`]) and walked alongside the schema tree. Every key the
//! walk consumes is marked visited; whatever is left is checked for documentation afterwards.

mod nested;
mod nxdata;
mod undocumented;
mod values;

use std::collections::{HashMap, HashSet};
use std::mem;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::Result;
use crate::namefit::class_to_caps;
use crate::paths::Segment;
use crate::problems::{render_report, Problem, ProblemCollector, ProblemKind};
use crate::template::DataMapping;
use crate::tree::builder::Want;
use crate::tree::{NodeId, Occurrence, SchemaCache, SchemaTree};
use crate::units::{UnitCategory, UnitCheck, UnitRegistry};

use nested::{compressed, instance_of, link_target, nest, DataEntry, DataGroup, DataValue};

/// The outcome of validating one mapping.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationReport {
    pub appdef: String,
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn kinds(&self) -> Vec<ProblemKind> {
        self.problems.iter().map(|p| p.kind).collect()
    }

    pub fn problem_at(&self, path: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.path == path)
    }

    /// One `kind: message` line per problem, ordered by path.
    pub fn report(&self) -> String {
        render_report(&self.problems)
    }
}

#[derive(Debug)]
pub struct Validator<'c> {
    cache: &'c SchemaCache,
    registry: &'c UnitRegistry,
    ignore_undocumented: bool,
    max_link_depth: usize,
}

impl<'c> Validator<'c> {
    pub fn new(cache: &'c SchemaCache) -> Self {
        Self {
            cache,
            registry: UnitRegistry::global(),
            ignore_undocumented: false,
            max_link_depth: Config::DEFAULT_MAX_LINK_DEPTH,
        }
    }

    pub fn from_config(cache: &'c SchemaCache, config: &Config) -> Self {
        Self::new(cache)
            .ignore_undocumented(config.ignore_undocumented)
            .max_link_depth(config.max_link_depth)
    }

    /// Skips the documentation checks for keys the schema does not describe.
    pub fn ignore_undocumented(mut self, ignore: bool) -> Self {
        self.ignore_undocumented = ignore;
        self
    }

    pub fn max_link_depth(mut self, depth: usize) -> Self {
        self.max_link_depth = depth;
        self
    }

    pub fn units(mut self, registry: &'c UnitRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Validates `mapping` against the application definition `appdef`.
    ///
    /// Problems in the data never fail; only a schema that cannot be loaded does.
    pub fn validate(&self, appdef: &str, mapping: &DataMapping) -> Result<ValidationReport> {
        let tree = SchemaTree::clone(&*self.cache.tree(appdef)?);
        let nested = nest(mapping);

        let mut run = Run {
            tree,
            data: &nested.root,
            groups: &nested.groups,
            registry: self.registry,
            collector: ProblemCollector::new(),
            visited: HashSet::new(),
            touched: HashSet::new(),
            via_link: 0,
            max_link_depth: self.max_link_depth,
        };

        let root = run.tree.root();
        run.validate_group(root, &nested.root)?;
        run.check_undocumented(mapping, self.ignore_undocumented)?;

        tracing::debug!(
            appdef,
            keys = mapping.len(),
            problems = run.collector.len(),
            "validated mapping"
        );
        Ok(ValidationReport {
            appdef: appdef.to_string(),
            problems: run.collector.into_problems(),
        })
    }
}

/// Validates `mapping` against `appdef` with the default unit registry and link depth.
pub fn validate(
    cache: &SchemaCache,
    appdef: &str,
    mapping: &DataMapping,
    ignore_undocumented: bool,
) -> Result<ValidationReport> {
    Validator::new(cache)
        .ignore_undocumented(ignore_undocumented)
        .validate(appdef, mapping)
}

/// Where a value ends up after following soft links.
enum Resolved<'a> {
    Group(&'a DataGroup),
    Leaf(&'a Value),
    /// A link into another file, which is not followed.
    External(&'a str),
    Broken,
}

/// The outcome of a silenced trial run.
struct Speculation {
    problems: ProblemCollector,
    visited: HashSet<String>,
    touched: HashSet<String>,
}

/// State of one validation run.
struct Run<'a> {
    /// A private copy, so lazily materialised nodes stay local to the run.
    tree: SchemaTree,
    data: &'a DataGroup,
    groups: &'a HashSet<String>,
    registry: &'a UnitRegistry,
    collector: ProblemCollector,
    /// Keys consumed by the walk; keys reached through links are not included.
    visited: HashSet<String>,
    /// Every key the walk reached, through links or not.
    touched: HashSet<String>,
    via_link: usize,
    max_link_depth: usize,
}

impl<'a> Run<'a> {
    fn visit(&mut self, path: &str) {
        if self.via_link == 0 {
            self.visited.insert(path.to_string());
        }
        self.touched.insert(path.to_string());
    }

    fn visit_all(&mut self, entry: &DataEntry) {
        for path in entry.leaf_paths() {
            self.visit(&path);
        }
    }

    fn report(
        &mut self,
        path: impl Into<String>,
        kind: ProblemKind,
        value: Value,
        extras: Vec<String>,
    ) {
        self.collector.collect_and_log(path, kind, value, extras);
    }

    fn resolve(&self, value: &'a Value) -> Resolved<'a> {
        let mut current = value;
        for _ in 0..=self.max_link_depth {
            let Some(target) = link_target(current) else {
                return Resolved::Leaf(current);
            };
            if target.contains(':') {
                return Resolved::External(target);
            }
            let data: &'a DataGroup = self.data;
            match data.lookup(target) {
                Some(DataValue::Group(group)) => return Resolved::Group(group),
                Some(DataValue::Leaf(next)) => current = next,
                None => return Resolved::Broken,
            }
        }
        Resolved::Broken
    }

    /// Runs `f` against a silenced collector and a copy of the visited set, handing back what
    /// it found without committing anything.
    fn speculate(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<Speculation> {
        let collector = mem::replace(&mut self.collector, ProblemCollector::silenced());
        let visited = self.visited.clone();
        let touched = mem::take(&mut self.touched);

        let result = f(self);

        let speculation = Speculation {
            problems: mem::replace(&mut self.collector, collector),
            visited: mem::replace(&mut self.visited, visited),
            touched: mem::replace(&mut self.touched, touched),
        };
        result.map(|()| speculation)
    }

    fn validate_group(&mut self, node: NodeId, group: &'a DataGroup) -> Result<()> {
        let handled = if self.tree.node(node).nx_class() == Some("NXdata") {
            self.validate_nxdata(node, group)?
        } else {
            HashSet::new()
        };
        if let Some(entry) = group.entry("@NX_class") {
            self.visit(&entry.path);
        }

        let mut assigned: Vec<(NodeId, &'a DataEntry)> = Vec::new();
        let mut errors: Vec<&'a DataEntry> = Vec::new();
        for entry in &group.entries {
            if entry.key == "@NX_class" {
                continue;
            }
            if let Some(name) = entry.key.strip_prefix('@') {
                if let Some(found) = self.tree.search_add_child_for(node, name, Want::Attribute)? {
                    assigned.push((found, entry));
                }
                continue;
            }
            if entry.key.contains('@') {
                // field attributes are checked with their field
                continue;
            }
            if let Some(inner) = entry.group() {
                if group.entries.iter().any(|e| e.key == entry.key && e.leaf().is_some()) {
                    for path in inner.leaf_paths() {
                        self.visit(&path);
                        self.report(
                            path,
                            ProblemKind::FieldWithChildren,
                            Value::Null,
                            vec![entry.path.clone()],
                        );
                    }
                    continue;
                }
            }
            match self.assign(node, entry)? {
                Some(found) => assigned.push((found, entry)),
                None if entry.key.ends_with("_errors") => errors.push(entry),
                None => {}
            }
        }

        // `x_errors` carries the uncertainties of the field `x`
        let mut uncertainties: Vec<(NodeId, &'a DataEntry)> = Vec::new();
        for entry in errors {
            let base = &entry.key[..entry.key.len() - "_errors".len()];
            let owner = assigned
                .iter()
                .find(|(id, e)| e.key == base && self.tree.node(*id).is_field());
            if let Some(&(found, _)) = owner {
                uncertainties.push((found, entry));
            }
        }

        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        for (id, _) in &assigned {
            *counts.entry(*id).or_default() += 1;
        }

        for child in self.tree.children(node).to_vec() {
            let variants: Vec<&'a DataEntry> = assigned
                .iter()
                .filter(|(id, _)| *id == child)
                .map(|(_, entry)| *entry)
                .collect();
            let (is_choice, is_group, is_field) = {
                let node = self.tree.node(child);
                (node.is_choice(), node.is_group(), node.is_field())
            };

            if is_choice {
                self.check_choice(group, child, &variants)?;
            } else if is_group {
                self.check_group(group, child, &variants, &counts)?;
            } else if is_field {
                let errors: Vec<&'a DataEntry> = uncertainties
                    .iter()
                    .filter(|(id, _)| *id == child)
                    .map(|(_, entry)| *entry)
                    .collect();
                self.check_field(group, child, &variants, &errors, &handled)?;
            } else {
                self.check_attribute(group, child, &variants, &handled);
            }
        }
        Ok(())
    }

    /// Finds the schema node documenting `entry`, a group, field or link keyed by name or
    /// `CONCEPT[name]`.
    fn assign(&mut self, parent: NodeId, entry: &'a DataEntry) -> Result<Option<NodeId>> {
        let Some(segment) = entry.segment() else {
            return Ok(None);
        };
        let hint = entry.group().and_then(DataGroup::nx_class);
        let is_link = entry.leaf().map_or(false, |v| link_target(v).is_some());

        let found = match &segment {
            Segment::Named {
                concept: Some(concept),
                instance,
            } => {
                let want = if entry.group().is_some() {
                    Want::Group(hint)
                } else {
                    Want::Any
                };
                // a concrete child of the named class takes precedence over the concept
                let concrete = self.tree.children(parent).iter().copied().find(|&id| {
                    let node = self.tree.node(id);
                    !node.variadic
                        && node.name == *instance
                        && want.accepts_node(node)
                        && node.nx_class().map_or(false, |c| class_to_caps(c) == *concept)
                });
                match concrete {
                    Some(id) => Some(id),
                    None => self.tree.search_add_child_for(parent, concept, want)?,
                }
            }
            Segment::Named {
                concept: None,
                instance,
            } => {
                let want = if entry.group().is_some() {
                    Want::Group(hint)
                } else if is_link {
                    Want::Any
                } else {
                    Want::Field
                };
                self.tree.search_add_child_for(parent, instance, want)?
            }
            Segment::Attribute(_) => None,
        };

        if let (Some(id), Segment::Named { concept: Some(_), instance }) = (found, &segment) {
            if !self.tree.fits_instance(id, instance) {
                let concept = self.tree.concept_path(id);
                self.report(
                    &entry.path,
                    ProblemKind::FailedNamefitting,
                    json!(instance),
                    vec![concept],
                );
                self.visit_all(entry);
                return Ok(None);
            }
        }
        Ok(found)
    }

    fn check_group(
        &mut self,
        group: &'a DataGroup,
        child: NodeId,
        variants: &[&'a DataEntry],
        counts: &HashMap<NodeId, usize>,
    ) -> Result<()> {
        for &entry in variants {
            match &entry.value {
                DataValue::Group(inner) => {
                    self.visit(&entry.path);
                    self.validate_group(child, inner)?;
                }
                DataValue::Leaf(value) if link_target(value).is_some() => {
                    self.follow_group_link(child, entry, value)?;
                }
                DataValue::Leaf(value) => {
                    self.visit(&entry.path);
                    self.report(&entry.path, ProblemKind::ExpectedGroup, value.clone(), vec![]);
                }
            }
        }

        let node = self.tree.node(child);
        let instances: usize = node
            .parent_of
            .iter()
            .map(|id| counts.get(id).copied().unwrap_or(0))
            .sum();
        let count = variants.len() + instances;
        let occurrence = node.occurrence().unwrap_or(Occurrence { min: 0, max: None });
        let required = node.optionality.is_required();
        let path = format!("{}/{}", group.path, node.template_segment());
        let concept = format!("{}/{}", group.path, node.name);
        let class = node.nx_class().unwrap_or_default().to_string();

        if count == 0 && required {
            self.report(path, ProblemKind::MissingRequiredGroup, Value::Null, vec![class]);
        } else if count > 0 && count < occurrence.min as usize {
            self.report(path, ProblemKind::MissingRequiredGroup, json!(count), vec![class]);
        }
        if let Some(max) = occurrence.max {
            if count > max as usize {
                self.report(concept, ProblemKind::TooMany, json!(count), vec![max.to_string()]);
            }
        }
        Ok(())
    }

    fn follow_group_link(
        &mut self,
        child: NodeId,
        entry: &'a DataEntry,
        value: &'a Value,
    ) -> Result<()> {
        self.visit(&entry.path);
        match self.resolve(value) {
            Resolved::Group(target) if self.via_link < self.max_link_depth => {
                self.via_link += 1;
                let result = self.validate_group(child, target);
                self.via_link -= 1;
                result?;
            }
            Resolved::Leaf(_) => {
                self.report(&entry.path, ProblemKind::ExpectedGroup, value.clone(), vec![]);
            }
            Resolved::External(target) => {
                tracing::debug!(path = %entry.path, target, "not following external link");
            }
            Resolved::Group(_) | Resolved::Broken => {
                self.report(&entry.path, ProblemKind::BrokenLink, value.clone(), vec![]);
            }
        }
        Ok(())
    }

    fn check_field(
        &mut self,
        group: &'a DataGroup,
        child: NodeId,
        variants: &[&'a DataEntry],
        errors: &[&'a DataEntry],
        handled: &HashSet<&'a str>,
    ) -> Result<()> {
        if variants.is_empty() {
            let node = self.tree.node(child);
            if !node.optionality.is_required() {
                return Ok(());
            }
            let path = format!("{}/{}", group.path, node.template_segment());
            self.report(&path, ProblemKind::MissingRequiredField, Value::Null, vec![]);

            // attributes given for the field that is not there
            let orphans: Vec<&'a DataEntry> = group
                .entries
                .iter()
                .filter(|e| match e.key.split_once('@') {
                    Some((owner, _)) if !owner.is_empty() => {
                        group.entry(owner).is_none()
                            && self.tree.fits_instance(child, instance_of(owner))
                    }
                    _ => false,
                })
                .collect();
            for orphan in orphans {
                self.visit(&orphan.path);
                self.report(
                    &orphan.path,
                    ProblemKind::AttributeForNonExistingField,
                    orphan.leaf().cloned().unwrap_or(Value::Null),
                    vec![path.clone()],
                );
            }
            return Ok(());
        }

        for &entry in variants.iter().chain(errors) {
            if handled.contains(entry.key.as_str()) {
                continue;
            }
            self.check_field_entry(group, child, entry)?;
        }
        Ok(())
    }

    /// Checks one present field: its value, its units and its attributes.
    fn check_field_entry(
        &mut self,
        group: &'a DataGroup,
        field: NodeId,
        entry: &'a DataEntry,
    ) -> Result<()> {
        self.visit(&entry.path);
        let Some(spec) = self.tree.node(field).spec().cloned() else {
            return Ok(());
        };
        let DataValue::Leaf(raw) = &entry.value else {
            return Ok(());
        };

        match self.resolve(raw) {
            // declared links take their type from the target
            Resolved::Leaf(_) if spec.link_target.is_some() => {}
            Resolved::Leaf(value) => {
                let value = compressed(value).unwrap_or(value);
                values::check_field_value(&mut self.collector, &entry.path, &spec, value);
            }
            Resolved::External(target) => {
                tracing::debug!(path = %entry.path, target, "not following external link");
            }
            Resolved::Group(_) => {
                self.report(
                    &entry.path,
                    ProblemKind::InvalidType,
                    raw.clone(),
                    vec![spec.element_type.nx_name().to_string(), "a field".to_string()],
                );
                return Ok(());
            }
            Resolved::Broken => {
                self.report(&entry.path, ProblemKind::BrokenLink, raw.clone(), vec![]);
                return Ok(());
            }
        }

        if let Some(category) = spec.unit {
            self.check_units(group, entry, category);
        }
        self.check_field_attributes(group, field, entry, spec.unit.is_some())
    }

    fn check_units(&mut self, group: &'a DataGroup, entry: &'a DataEntry, category: UnitCategory) {
        let transformation = group.entry(&format!("{}@transformation_type", entry.key));
        let transformation_type = transformation
            .and_then(DataEntry::leaf)
            .and_then(Value::as_str);
        let extras = vec![category.nx_name().to_string()];

        let Some(units) = group.entry(&format!("{}@units", entry.key)) else {
            let unitless = category.is_unitless()
                || (category == UnitCategory::Transformation && transformation_type.is_none());
            if !unitless {
                self.report(&entry.path, ProblemKind::MissingUnit, Value::Null, extras);
            }
            return;
        };
        self.visit(&units.path);
        if let Some(transformation) = transformation {
            self.visit(&transformation.path);
        }

        let unit = units.leaf().and_then(Value::as_str);
        let check = match unit {
            Some(unit) => self.registry.check(category, unit, transformation_type),
            None => UnitCheck::Unparseable,
        };
        let value = units.leaf().cloned().unwrap_or(Value::Null);
        match check {
            UnitCheck::Valid => {}
            UnitCheck::Invalid => {
                self.report(&units.path, ProblemKind::InvalidUnit, value, extras);
            }
            UnitCheck::Unparseable => {
                self.report(&entry.path, ProblemKind::MissingUnit, value, extras);
            }
            UnitCheck::InvalidTransformationType => {
                let path = transformation.map_or(entry.path.as_str(), |t| t.path.as_str());
                self.report(
                    path,
                    ProblemKind::InvalidTransformationType,
                    json!(transformation_type),
                    vec![],
                );
            }
        }
    }

    fn check_field_attributes(
        &mut self,
        group: &'a DataGroup,
        field: NodeId,
        entry: &'a DataEntry,
        has_unit: bool,
    ) -> Result<()> {
        let mut present = Vec::new();
        for (name, attribute) in group.field_attributes(&entry.key) {
            if name == "units" && has_unit {
                continue;
            }
            if let Some(found) = self.tree.search_add_child_for(field, name, Want::Attribute)? {
                present.push(found);
                self.check_attribute_value(found, attribute);
            }
        }

        for child in self.tree.children(field).to_vec() {
            let node = self.tree.node(child);
            if node.is_attribute() && node.optionality.is_required() && !present.contains(&child) {
                let path = format!("{}/@{}", entry.path, node.name);
                self.report(path, ProblemKind::MissingRequiredAttribute, Value::Null, vec![]);
            }
        }
        Ok(())
    }

    fn check_attribute_value(&mut self, attribute: NodeId, entry: &'a DataEntry) {
        self.visit(&entry.path);
        let Some(spec) = self.tree.node(attribute).spec().cloned() else {
            return;
        };
        if let Some(value) = entry.leaf() {
            values::check_field_value(&mut self.collector, &entry.path, &spec, value);
        }
    }

    /// Attributes of groups.
    fn check_attribute(
        &mut self,
        group: &'a DataGroup,
        child: NodeId,
        variants: &[&'a DataEntry],
        handled: &HashSet<&'a str>,
    ) {
        if variants.is_empty() {
            let node = self.tree.node(child);
            if node.optionality.is_required() {
                let path = format!("{}/@{}", group.path, node.name);
                self.report(path, ProblemKind::MissingRequiredAttribute, Value::Null, vec![]);
            }
            return;
        }
        for &entry in variants {
            if handled.contains(entry.key.as_str()) {
                self.visit(&entry.path);
            } else {
                self.check_attribute_value(child, entry);
            }
        }
    }

    /// Tries every alternative of a choice on each variant; exactly one has to pass.
    fn check_choice(
        &mut self,
        group: &'a DataGroup,
        choice: NodeId,
        variants: &[&'a DataEntry],
    ) -> Result<()> {
        if variants.is_empty() {
            let node = self.tree.node(choice);
            if node.optionality.is_required() {
                let path = format!("{}/{}", group.path, node.name);
                self.report(path, ProblemKind::MissingRequiredGroup, Value::Null, vec![]);
            }
            return Ok(());
        }

        self.tree.materialise(choice)?;
        let alternatives = self.tree.children(choice).to_vec();
        let classes: Vec<String> = alternatives
            .iter()
            .filter_map(|&id| self.tree.node(id).nx_class().map(str::to_string))
            .collect();

        for &entry in variants {
            self.visit(&entry.path);
            let (target, linked) = match &entry.value {
                DataValue::Group(inner) => (inner, false),
                DataValue::Leaf(value) => match self.resolve(value) {
                    Resolved::Group(inner) => (inner, true),
                    Resolved::Leaf(_) => {
                        self.report(&entry.path, ProblemKind::ExpectedGroup, value.clone(), vec![]);
                        continue;
                    }
                    Resolved::External(target) => {
                        tracing::debug!(path = %entry.path, target, "not following external link");
                        continue;
                    }
                    Resolved::Broken => {
                        self.report(&entry.path, ProblemKind::BrokenLink, value.clone(), vec![]);
                        continue;
                    }
                },
            };

            let hint = target.nx_class();
            let leaves = target.leaf_paths();
            let mut outcomes: Vec<(Speculation, usize)> = Vec::new();
            for &alternative in &alternatives {
                if hint.map_or(false, |class| self.tree.node(alternative).nx_class() != Some(class)) {
                    continue;
                }
                if linked {
                    self.via_link += 1;
                }
                let speculation = self.speculate(|run| run.validate_group(alternative, target));
                if linked {
                    self.via_link -= 1;
                }
                let speculation = speculation?;
                let unreached = leaves
                    .iter()
                    .filter(|path| !speculation.touched.contains(*path))
                    .count();
                tracing::trace!(
                    path = %entry.path,
                    alternative = ?self.tree.node(alternative).nx_class(),
                    problems = speculation.problems.len(),
                    unreached,
                    "tried choice alternative"
                );
                outcomes.push((speculation, unreached));
            }

            let passing: Vec<usize> = outcomes
                .iter()
                .enumerate()
                .filter(|(_, (speculation, unreached))| speculation.problems.is_empty() && *unreached == 0)
                .map(|(index, _)| index)
                .collect();
            let chosen = if let &[only] = passing.as_slice() {
                only
            } else {
                self.report(
                    &entry.path,
                    ProblemKind::ChoiceValidationError,
                    Value::Null,
                    classes.clone(),
                );
                let best = outcomes
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (speculation, unreached))| (speculation.problems.len(), *unreached))
                    .map(|(index, _)| index);
                match best {
                    Some(index) => index,
                    None => continue,
                }
            };

            let (speculation, _) = outcomes.swap_remove(chosen);
            self.collector.absorb(speculation.problems);
            self.visited = speculation.visited;
            self.touched.extend(speculation.touched);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::generator::generate_template;
    use crate::template::Bucket;
    use crate::test_support::fixture_loader;

    fn mapping(value: Value) -> DataMapping {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    /// A complete, valid `NXtest` entry.
    fn minimal() -> DataMapping {
        mapping(json!({
            "/ENTRY[my_entry]/definition": "NXtest",
            "/ENTRY[my_entry]/definition/@version": "2.4.6",
            "/ENTRY[my_entry]/program_name": "p",
            "/ENTRY[my_entry]/type": "2nd type",
            "/ENTRY[my_entry]/float_value": 2.0,
            "/ENTRY[my_entry]/float_value/@units": "nm",
            "/ENTRY[my_entry]/int_value": 2,
            "/ENTRY[my_entry]/int_value/@units": "eV",
            "/ENTRY[my_entry]/posint_value": [1, 2, 3],
            "/ENTRY[my_entry]/posint_value/@units": "kg",
            "/ENTRY[my_entry]/char_value": "ok",
            "/ENTRY[my_entry]/bool_value": true,
            "/ENTRY[my_entry]/date_value": "2022-01-22T12:14:12.05018+00:00",
            "/ENTRY[my_entry]/optional_parent/required_child": 1,
            "/ENTRY[my_entry]/optional_parent/optional_child": 1,
        }))
    }

    fn check(appdef: &str, data: &DataMapping) -> ValidationReport {
        let cache = SchemaCache::new(fixture_loader());
        validate(&cache, appdef, data, false).unwrap()
    }

    #[test]
    fn minimal_entry_is_valid() {
        let report = check("NXtest", &minimal());
        assert!(report.is_valid(), "{}", report.report());
    }

    #[test]
    fn invalid_enumeration_value() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/type".into(), json!("Wrong option"));
        let report = check("NXtest", &data);
        assert_eq!(report.kinds(), [ProblemKind::InvalidEnum]);
        let problem = &report.problems[0];
        assert!(problem.path.ends_with("/type"));
        assert_eq!(
            problem.value,
            json!(["1st type", "2nd type", "3rd type", "4th type"])
        );
    }

    #[test]
    fn missing_required_field() {
        let mut data = minimal();
        data.remove("/ENTRY[my_entry]/bool_value");
        let report = check("NXtest", &data);
        assert_eq!(report.kinds(), [ProblemKind::MissingRequiredField]);
        assert_eq!(report.problems[0].path, "/ENTRY[my_entry]/bool_value");
    }

    #[test]
    fn incomplete_optional_parent() {
        let mut data = minimal();
        data.remove("/ENTRY[my_entry]/optional_parent/required_child");
        let report = check("NXtest", &data);
        assert_eq!(report.kinds(), [ProblemKind::MissingRequiredField]);
        assert_eq!(
            report.problems[0].path,
            "/ENTRY[my_entry]/optional_parent/required_child"
        );

        // an absent optional parent needs none of its children
        data.remove("/ENTRY[my_entry]/optional_parent/optional_child");
        assert!(check("NXtest", &data).is_valid());
    }

    #[test]
    fn datetime_needs_a_known_offset() {
        let mut data = minimal();
        data.insert(
            "/ENTRY[my_entry]/date_value".into(),
            json!("2022-01-22T12:14:12.05018-00:00"),
        );
        assert_eq!(check("NXtest", &data).kinds(), [ProblemKind::InvalidDatetime]);
    }

    #[test]
    fn too_many_instances_of_a_bounded_group() {
        let data = mapping(json!({
            "/ENTRY[entry]/definition": "NXmultiplicity",
            "/ENTRY[entry]/operator/name": "someone",
            "/ENTRY[entry]/SAMPLE[sample1]/name": "a",
            "/ENTRY[entry]/SAMPLE[sample2]/name": "b",
        }));
        let report = check("NXmultiplicity", &data);
        assert_eq!(report.kinds(), [ProblemKind::TooMany], "{}", report.report());
        assert_eq!(report.problems[0].path, "/ENTRY[entry]/SAMPLE");

        let mut single = data.clone();
        single.remove("/ENTRY[entry]/SAMPLE[sample2]/name");
        assert!(check("NXmultiplicity", &single).is_valid());

        let mut none = single;
        none.remove("/ENTRY[entry]/SAMPLE[sample1]/name");
        let report = check("NXmultiplicity", &none);
        assert_eq!(report.kinds(), [ProblemKind::MissingRequiredGroup]);
        assert_eq!(report.problems[0].path, "/ENTRY[entry]/SAMPLE[sample]");
    }

    #[test]
    fn filled_template_validates() {
        let cache = SchemaCache::new(fixture_loader());
        let tree = cache.tree("NXtest").unwrap();
        let mut template = generate_template(&tree).unwrap();

        let values = minimal();
        for key in template.bucket(Bucket::Required).keys().cloned().collect::<Vec<_>>() {
            let data_key = key.replace("ENTRY[entry]", "ENTRY[my_entry]");
            template.set(&key, values[&data_key].clone()).unwrap();
        }
        let report = validate(&cache, "NXtest", &template.to_mapping(), false).unwrap();
        assert!(report.is_valid(), "{}", report.report());
    }

    #[test]
    fn removing_a_required_key_is_reported() {
        let cache = SchemaCache::new(fixture_loader());
        let tree = cache.tree("NXtest").unwrap();
        let template = generate_template(&tree).unwrap();
        let full = minimal();

        for key in template.required.keys() {
            if key.contains("/@") {
                continue;
            }
            let data_key = key.replace("ENTRY[entry]", "ENTRY[my_entry]");
            let mut data = full.clone();
            data.remove(&data_key);
            data.remove(&format!("{data_key}/@units"));
            data.remove(&format!("{data_key}/@version"));
            let report = validate(&cache, "NXtest", &data, false).unwrap();
            assert_eq!(
                report.problem_at(&data_key).map(|p| p.kind),
                Some(ProblemKind::MissingRequiredField),
                "{data_key}: {}",
                report.report()
            );
        }
    }

    #[test]
    fn units_are_checked_against_categories() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/float_value/@units".into(), json!("kg"));
        data.remove("/ENTRY[my_entry]/int_value/@units");
        data.insert("/ENTRY[my_entry]/posint_value/@units".into(), json!("not a unit ^^"));
        let report = check("NXtest", &data);

        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/float_value/@units").map(|p| p.kind),
            Some(ProblemKind::InvalidUnit)
        );
        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/int_value").map(|p| p.kind),
            Some(ProblemKind::MissingUnit)
        );
        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/posint_value").map(|p| p.kind),
            Some(ProblemKind::MissingUnit)
        );
        assert_eq!(report.problems.len(), 3);
    }

    #[test]
    fn undocumented_keys() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/mystery".into(), json!(1));
        data.insert("/ENTRY[my_entry]/char_value/@units".into(), json!("m"));
        data.insert("/ENTRY[my_entry]/ghost/@units".into(), json!("m"));
        data.insert("/ENTRY[my_entry]/ghost/@note".into(), json!("boo"));
        let report = check("NXtest", &data);
        let kind_at = |path: &str| report.problem_at(path).map(|p| p.kind);

        assert_eq!(
            kind_at("/ENTRY[my_entry]/mystery"),
            Some(ProblemKind::MissingDocumentation)
        );
        assert_eq!(
            kind_at("/ENTRY[my_entry]/char_value/@units"),
            Some(ProblemKind::UnitWithoutDocumentation)
        );
        assert_eq!(
            kind_at("/ENTRY[my_entry]/ghost/@units"),
            Some(ProblemKind::UnitWithoutField)
        );
        assert_eq!(
            kind_at("/ENTRY[my_entry]/ghost/@note"),
            Some(ProblemKind::AttributeForNonExistingField)
        );

        // fields inherited from base classes are documented
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/title".into(), json!("a title"));
        data.insert(
            "/ENTRY[my_entry]/start_time".into(),
            json!("2022-01-22T12:14:12Z"),
        );
        assert!(check("NXtest", &data).is_valid());

        let cache = SchemaCache::new(fixture_loader());
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/mystery".into(), json!(1));
        data.insert("/ENTRY[my_entry]/ghost/@units".into(), json!("m"));
        let report = validate(&cache, "NXtest", &data, true).unwrap();
        assert_eq!(report.kinds(), [ProblemKind::UnitWithoutField]);
    }

    #[test]
    fn attributes_of_a_missing_required_field() {
        let mut data = minimal();
        data.remove("/ENTRY[my_entry]/float_value");
        let report = check("NXtest", &data);
        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/float_value").map(|p| p.kind),
            Some(ProblemKind::MissingRequiredField)
        );
        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/float_value/@units").map(|p| p.kind),
            Some(ProblemKind::AttributeForNonExistingField)
        );
        assert_eq!(report.problems.len(), 2);
    }

    #[test]
    fn required_attributes_and_types() {
        let mut data = minimal();
        data.remove("/ENTRY[my_entry]/definition/@version");
        data.insert("/ENTRY[my_entry]/int_value".into(), json!("two"));
        data.insert("/ENTRY[my_entry]/posint_value".into(), json!([1, 0, 3]));
        let report = check("NXtest", &data);
        let kind_at = |path: &str| report.problem_at(path).map(|p| p.kind);

        assert_eq!(
            kind_at("/ENTRY[my_entry]/definition/@version"),
            Some(ProblemKind::MissingRequiredAttribute)
        );
        assert_eq!(
            kind_at("/ENTRY[my_entry]/int_value"),
            Some(ProblemKind::InvalidType)
        );
        assert_eq!(
            kind_at("/ENTRY[my_entry]/posint_value"),
            Some(ProblemKind::NotPositiveInt)
        );
    }

    #[test]
    fn numeric_strings_convert_once() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/int_value".into(), json!("2"));
        data.insert("/ENTRY[my_entry]/bool_value".into(), json!("false"));
        assert!(check("NXtest", &data).is_valid());
    }

    #[test]
    fn misnamed_concept_instances() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/optional_parent[other]/optional_child".into(), json!(1));
        let report = check("NXtest", &data);
        assert_eq!(
            report
                .problem_at("/ENTRY[my_entry]/optional_parent[other]")
                .map(|p| p.kind),
            Some(ProblemKind::FailedNamefitting)
        );
    }

    #[test]
    fn qualified_scalars_are_not_groups() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/NOTE[note]".into(), json!(3));
        let report = check("NXtest", &data);
        assert_eq!(report.kinds(), [ProblemKind::ExpectedGroup]);
    }

    fn plot() -> DataMapping {
        mapping(json!({
            "/ENTRY[entry]/definition": "NXplot",
            "/ENTRY[entry]/INSTRUMENT[instrument]/DETECTOR[detector]/energy": [1.0, 2.0, 3.0],
            "/ENTRY[entry]/INSTRUMENT[instrument]/DETECTOR[detector]/energy/@units": "eV",
            "/ENTRY[entry]/DATA[data]/@signal": "counts",
            "/ENTRY[entry]/DATA[data]/@axes": ["energy"],
            "/ENTRY[entry]/DATA[data]/counts": [10, 20, 30],
            "/ENTRY[entry]/DATA[data]/energy": {
                "link": "/entry/instrument/detector/energy"
            },
        }))
    }

    #[test]
    fn links_resolve_within_the_mapping() {
        let report = check("NXplot", &plot());
        assert!(report.is_valid(), "{}", report.report());

        let mut data = plot();
        data.insert(
            "/ENTRY[entry]/DATA[data]/energy".into(),
            json!({"link": "/entry/instrument/nowhere"}),
        );
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/energy").map(|p| p.kind),
            Some(ProblemKind::BrokenLink)
        );

        let mut data = plot();
        data.insert(
            "/ENTRY[entry]/DATA[data]/energy".into(),
            json!({"link": "other.nxs:/entry/energy"}),
        );
        assert!(check("NXplot", &data).is_valid());
    }

    #[test]
    fn link_chains_are_bounded() {
        let mut data = plot();
        data.insert("/ENTRY[entry]/a".into(), json!({"link": "/entry/b"}));
        data.insert("/ENTRY[entry]/b".into(), json!({"link": "/entry/a"}));
        data.insert(
            "/ENTRY[entry]/DATA[data]/energy".into(),
            json!({"link": "/entry/a"}),
        );
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/energy").map(|p| p.kind),
            Some(ProblemKind::BrokenLink)
        );
    }

    #[test]
    fn nxdata_signal_and_axes() {
        let mut data = plot();
        data.insert("/ENTRY[entry]/DATA[data]/@signal".into(), json!("missing"));
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/missing").map(|p| p.kind),
            Some(ProblemKind::NxdataMissingSignal)
        );

        let mut data = plot();
        data.insert("/ENTRY[entry]/DATA[data]/@axes".into(), json!(["energy", "angle"]));
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/angle").map(|p| p.kind),
            Some(ProblemKind::NxdataMissingAxis)
        );

        let mut data = plot();
        data.insert("/ENTRY[entry]/DATA[data]/counts".into(), json!([10, 20]));
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/energy").map(|p| p.kind),
            Some(ProblemKind::NxdataAxisMismatch)
        );

        let mut data = plot();
        data.insert("/ENTRY[entry]/DATA[data]/counts".into(), json!([[1, 2, 3], [4, 5, 6]]));
        data.insert("/ENTRY[entry]/DATA[data]/@energy_indices".into(), json!(1));
        data.insert("/ENTRY[entry]/DATA[data]/counts_errors".into(), json!([[1, 1, 1], [1, 1, 1]]));
        let report = check("NXplot", &data);
        assert!(report.is_valid(), "{}", report.report());
    }

    #[test]
    fn nxdata_without_signal() {
        let mut data = plot();
        data.remove("/ENTRY[entry]/DATA[data]/@signal");
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/DATA[data]/@signal").map(|p| p.kind),
            Some(ProblemKind::NxdataMissingSignal)
        );
    }

    #[test]
    fn choices_need_exactly_one_passing_alternative() {
        let mut data = plot();
        data.insert("/ENTRY[entry]/shape/vertices".into(), json!([[0.0, 0.0, 0.0]]));
        data.insert("/ENTRY[entry]/shape/faces".into(), json!([0]));
        assert!(check("NXplot", &data).is_valid());

        // vertices alone fit either geometry
        let mut data = plot();
        data.insert("/ENTRY[entry]/shape/vertices".into(), json!([[0.0, 0.0, 0.0]]));
        let report = check("NXplot", &data);
        assert_eq!(
            report.problem_at("/ENTRY[entry]/shape").map(|p| p.kind),
            Some(ProblemKind::ChoiceValidationError)
        );

        // unless the class is declared
        data.insert(
            "/ENTRY[entry]/shape/@NX_class".into(),
            json!("NXcylindrical_geometry"),
        );
        assert!(check("NXplot", &data).is_valid());
    }

    #[test]
    fn transformation_units_follow_the_transformation_type() {
        let axis = "/ENTRY[entry]/INSTRUMENT[instrument]/DETECTOR[detector]/TRANSFORMATIONS[transformations]/x";
        let with = |units: &str, kind: &str| {
            let mut data = plot();
            data.insert(axis.into(), json!(1.5));
            data.insert(format!("{axis}/@units"), json!(units));
            data.insert(format!("{axis}/@transformation_type"), json!(kind));
            check("NXplot", &data)
        };

        assert!(with("mm", "translation").is_valid());
        assert!(with("deg", "rotation").is_valid());

        let report = with("mm", "rotation");
        assert_eq!(report.kinds(), [ProblemKind::InvalidUnit]);
        assert_eq!(report.problems[0].path, format!("{axis}/@units"));

        let report = with("mm", "sideways");
        assert_eq!(report.kinds(), [ProblemKind::InvalidTransformationType]);
        assert_eq!(report.problems[0].path, format!("{axis}/@transformation_type"));
    }

    #[test]
    fn keys_below_a_field_are_reported_and_the_field_is_still_checked() {
        let mut data = minimal();
        data.insert("/ENTRY[my_entry]/char_value".into(), json!(12));
        data.insert("/ENTRY[my_entry]/char_value/extra".into(), json!(1));
        let report = Validator::new(&SchemaCache::new(fixture_loader()))
            .ignore_undocumented(true)
            .validate("NXtest", &data)
            .unwrap();
        assert_eq!(
            report.problem_at("/ENTRY[my_entry]/char_value").map(|p| p.kind),
            Some(ProblemKind::InvalidType)
        );
        assert_eq!(
            report
                .problem_at("/ENTRY[my_entry]/char_value/extra")
                .map(|p| p.kind),
            Some(ProblemKind::FieldWithChildren)
        );
        assert_eq!(report.problems.len(), 2);

        data.insert("/ENTRY[my_entry]/char_value".into(), json!("ok"));
        let report = check("NXtest", &data);
        assert_eq!(report.kinds(), [ProblemKind::FieldWithChildren]);
    }

    #[test]
    fn data_must_be_a_mapping_of_paths() {
        let report = check("NXtest", &Map::new());
        assert_eq!(report.kinds(), [ProblemKind::MissingRequiredGroup]);
        assert_eq!(report.problems[0].path, "/ENTRY[entry]");
    }
}
