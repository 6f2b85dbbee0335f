//! Construction of [`SchemaTree`]s.
//!
//! Building starts from the application definition and walks every element declared by an
//! application definition eagerly. Each node gets an inheritance chain: the declaring element,
//! the best matching element of every more generic element of its parent, and for groups the
//! root elements of the group's class and that class's `extends` ancestors. Children declared
//! only in base classes are added on demand by [`SchemaTree::search_add_child_for`] and
//! [`SchemaTree::materialise`].

use std::collections::HashMap;
use std::sync::Arc;

use nx_builtins::meta::{normalized_value, Whitespace};
use nx_builtins::ElementType;

use super::{
    Dimensions, Enumeration, FieldSpec, GroupSpec, Node, NodeId, NodeKind, Occurrence,
    Optionality, SchemaTree,
};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::loader::DefinitionLoader;
use crate::namefit::{best_namefit_of, class_to_caps, namefit, NameType};
use crate::paths::{DataPath, Segment};
use crate::units::UnitCategory;

/// The kind of node a lookup is after.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Want<'a> {
    /// A group, optionally of a given class. Choices count as groups.
    Group(Option<&'a str>),
    /// A field or link.
    Field,
    Attribute,
    Any,
}

impl Want<'_> {
    pub(crate) fn accepts_node(self, node: &Node) -> bool {
        match (self, &node.kind) {
            (Want::Any, _) => true,
            (Want::Group(_), NodeKind::Choice) => true,
            (Want::Group(hint), NodeKind::Group(group)) => {
                hint.map_or(true, |class| group.nx_class == class)
            }
            (Want::Field, NodeKind::Field(_)) => true,
            (Want::Attribute, NodeKind::Attribute(_)) => true,
            _ => false,
        }
    }

    fn accepts_element(self, element: &Element) -> bool {
        match (self, element.tag.as_str()) {
            (Want::Any, _) => element.is_node_tag(),
            (Want::Group(_), Element::CHOICE_TAG) => true,
            (Want::Group(hint), Element::GROUP_TAG) => {
                hint.map_or(true, |class| element.attribute("type") == Some(class))
            }
            (Want::Field, Element::FIELD_TAG | Element::LINK_TAG) => true,
            (Want::Attribute, Element::ATTRIBUTE_TAG) => true,
            _ => false,
        }
    }
}

/// The schema name of an element: its `name`, or for unnamed groups the placeholder derived
/// from the group's class.
pub(crate) fn element_name(element: &Element) -> Option<(String, NameType)> {
    let declared = element
        .attribute("nameType")
        .and_then(NameType::from_attribute);
    if let Some(name) = element.attribute("name") {
        return Some((
            name.to_string(),
            declared.unwrap_or_else(|| NameType::infer(name)),
        ));
    }
    if element.tag == Element::GROUP_TAG {
        let class = element.attribute("type")?;
        return Some((class_to_caps(class), declared.unwrap_or(NameType::Any)));
    }
    None
}

/// Fields and links may stand in for each other across the inheritance chain.
fn same_kind_of_tag(a: &str, b: &str) -> bool {
    fn normalise(tag: &str) -> &str {
        if tag == Element::LINK_TAG {
            Element::FIELD_TAG
        } else {
            tag
        }
    }
    normalise(a) == normalise(b)
}

fn optionality_of(element: &Element) -> Optionality {
    if !element.is_from_application() {
        Optionality::Optional
    } else if element.is_flag_set("recommended") {
        Optionality::Recommended
    } else if element.is_flag_set("optional")
        || element.attribute("required") == Some("false")
        || element.attribute("minOccurs") == Some("0")
    {
        Optionality::Optional
    } else {
        Optionality::Required
    }
}

fn occurrence_of(element: &Element, optionality: Optionality) -> Occurrence {
    let min = element
        .attribute("minOccurs")
        .and_then(|m| m.parse().ok())
        .unwrap_or(if optionality.is_required() { 1 } else { 0 });
    let max = element
        .attribute("maxOccurs")
        .and_then(|m| if m == "unbounded" { None } else { m.parse().ok() });
    Occurrence { min, max }
}

fn collapsed(value: &str) -> String {
    normalized_value(value, Whitespace::Collapse).into_owned()
}

fn field_spec(inheritance: &[Arc<Element>], occurrence: Occurrence) -> FieldSpec {
    let first = |attribute: &str| inheritance.iter().find_map(|e| e.attribute(attribute));

    let element_type = first("type")
        .and_then(|t| ElementType::from_nx_name(t).ok())
        .unwrap_or_default();
    let unit = first("units").and_then(UnitCategory::from_nx_name);

    let enumeration = inheritance
        .iter()
        .find_map(|e| e.child(Element::ENUMERATION_TAG))
        .map(|enumeration| Enumeration {
            items: enumeration
                .children_with_tag(Element::ITEM_TAG)
                .filter_map(|item| item.attribute("value"))
                .map(collapsed)
                .collect(),
            open: enumeration.is_flag_set("open"),
        });

    let dimensions = inheritance
        .iter()
        .find_map(|e| e.child(Element::DIMENSIONS_TAG))
        .map(|dimensions| Dimensions {
            rank: dimensions
                .attribute("rank")
                .and_then(|r| collapsed(r).parse().ok()),
            dims: dimensions
                .children_with_tag(Element::DIM_TAG)
                .filter_map(|dim| {
                    let index = collapsed(dim.attribute("index")?).parse().ok()?;
                    Some((index, collapsed(dim.attribute("value").unwrap_or_default())))
                })
                .collect(),
        });

    let link_target = inheritance
        .first()
        .filter(|e| e.tag == Element::LINK_TAG)
        .and_then(|e| e.attribute("target"))
        .map(str::to_string);

    FieldSpec {
        element_type,
        unit,
        enumeration,
        dimensions,
        link_target,
        occurrence,
    }
}

impl SchemaTree {
    /// Builds the tree for the application definition (or base class) `appdef`.
    pub fn build(loader: Arc<DefinitionLoader>, appdef: &str) -> Result<Self> {
        let mut tree = Self {
            appdef: appdef.to_string(),
            nodes: Vec::new(),
            loader,
            class_chains: HashMap::new(),
            diagnostics: Vec::new(),
        };

        let inheritance = tree.class_chain(appdef, None)?;
        let doc = inheritance.iter().find_map(|e| e.doc()).map(str::to_string);
        let root = tree.push(Node {
            name: appdef.to_string(),
            name_type: NameType::Specified,
            variadic: false,
            optionality: Optionality::Required,
            kind: NodeKind::Group(GroupSpec {
                nx_class: appdef.to_string(),
                occurrence: Occurrence {
                    min: 1,
                    max: Some(1),
                },
            }),
            inheritance,
            parent: None,
            children: Vec::new(),
            is_a: Vec::new(),
            parent_of: Vec::new(),
            doc,
        });

        tree.materialise_declared(root)?;
        Ok(tree)
    }

    /// Convenience for building from a loader that is not shared yet.
    pub fn build_with(loader: DefinitionLoader, appdef: &str) -> Result<Self> {
        Self::build(Arc::new(loader), appdef)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId::from_len(self.nodes.len())
    }

    /// The root elements of `class` and its `extends` ancestors. A cycle in `extends` ends the
    /// chain and is recorded as a diagnostic.
    fn class_chain(
        &mut self,
        class: &str,
        referenced_from: Option<&Element>,
    ) -> Result<Vec<Arc<Element>>> {
        if let Some(chain) = self.class_chains.get(class) {
            return Ok(chain.clone());
        }

        let mut chain: Vec<Arc<Element>> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut next = Some(class.to_string());
        while let Some(current) = next {
            if seen.contains(&current) {
                let message = format!(
                    "inheritance cycle in {class}: {} -> {current}",
                    seen.join(" -> ")
                );
                tracing::warn!(class, "{message}");
                if !self.diagnostics.contains(&message) {
                    self.diagnostics.push(message);
                }
                break;
            }

            let definition = match self.loader.definition(&current) {
                Ok(definition) => definition,
                Err(source) if chain.is_empty() && referenced_from.is_none() => {
                    return Err(source)
                }
                Err(source) => {
                    return Err(Error::UnknownBaseClass {
                        name: current,
                        referenced_from: referenced_from
                            .map_or_else(|| class.to_string(), |e| e.to_string()),
                        source: Box::new(source),
                    })
                }
            };
            chain.push(definition.root.clone());
            seen.push(current);
            next = definition.extends.clone();
        }

        self.class_chains.insert(class.to_string(), chain.clone());
        Ok(chain)
    }

    /// Whether `parent` already has a child standing for `element`.
    fn is_represented(&self, parent: NodeId, element: &Element) -> bool {
        let Some((name, _)) = self.child_name_for(parent, element) else {
            return true;
        };
        self.children(parent).iter().any(|&child| {
            let child = self.node(child);
            child.name == name
                && same_kind_of_tag(child.kind.tag(), &element.tag)
                && child.nx_class() == element.attribute("type").filter(|_| child.is_group())
        })
    }

    fn child_name_for(&self, parent: NodeId, element: &Element) -> Option<(String, NameType)> {
        let parent = self.node(parent);
        if parent.is_choice() && element.tag == Element::GROUP_TAG {
            return Some((parent.name.clone(), parent.name_type));
        }
        element_name(element)
    }

    /// Adds every child declared by application-definition elements of `id`, recursively.
    fn materialise_declared(&mut self, id: NodeId) -> Result<()> {
        let declared: Vec<(usize, Arc<Element>)> = self
            .node(id)
            .inheritance
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_from_application())
            .flat_map(|(i, owner)| owner.node_children().map(move |c| (i, c.clone())))
            .collect();

        let mut added = Vec::new();
        for (owner, element) in declared {
            if self.is_represented(id, &element) {
                continue;
            }
            added.push(self.add_child(id, &element, owner)?);
        }
        self.link_siblings(id)?;

        for child in added {
            self.materialise_declared(child)?;
        }
        Ok(())
    }

    /// Adds every direct child `id` can have, including those declared only in base classes.
    pub fn materialise(&mut self, id: NodeId) -> Result<()> {
        let candidates: Vec<(usize, Arc<Element>)> = self
            .node(id)
            .inheritance
            .iter()
            .enumerate()
            .flat_map(|(i, owner)| owner.node_children().map(move |c| (i, c.clone())))
            .collect();

        for (owner, element) in candidates {
            if !self.is_represented(id, &element) {
                self.add_child(id, &element, owner)?;
            }
        }
        self.link_siblings(id)
    }

    /// Creates the node for `element`, a child of the `owner`-th inheritance element of
    /// `parent`.
    fn add_child(&mut self, parent: NodeId, element: &Arc<Element>, owner: usize) -> Result<NodeId> {
        let (name, name_type) =
            self.child_name_for(parent, element)
                .ok_or_else(|| Error::MissingAttribute {
                    path: element.source.path.clone(),
                    element: element.tag.clone(),
                    attribute: "name",
                })?;

        let mut inheritance = vec![element.clone()];
        let generic: Vec<Arc<Element>> = self
            .node(parent)
            .inheritance
            .iter()
            .skip(owner + 1)
            .cloned()
            .collect();
        for container in &generic {
            if let Some(matching) = best_match(container, element, &name) {
                if !inheritance.iter().any(|e| Arc::ptr_eq(e, &matching)) {
                    inheritance.push(matching);
                }
            }
        }

        let optionality = optionality_of(element);
        let kind = match element.tag.as_str() {
            Element::GROUP_TAG => {
                let nx_class = element
                    .attribute("type")
                    .ok_or_else(|| Error::MissingAttribute {
                        path: element.source.path.clone(),
                        element: element.tag.clone(),
                        attribute: "type",
                    })?
                    .to_string();
                for root in self.class_chain(&nx_class, Some(element))? {
                    if !inheritance.iter().any(|e| Arc::ptr_eq(e, &root)) {
                        inheritance.push(root);
                    }
                }
                NodeKind::Group(GroupSpec {
                    nx_class,
                    occurrence: occurrence_of(element, optionality),
                })
            }
            Element::ATTRIBUTE_TAG => {
                NodeKind::Attribute(field_spec(&inheritance, occurrence_of(element, optionality)))
            }
            Element::CHOICE_TAG => NodeKind::Choice,
            _ => NodeKind::Field(field_spec(&inheritance, occurrence_of(element, optionality))),
        };

        let variadic = name_type != NameType::Specified
            || name.chars().any(|c| c.is_ascii_uppercase());
        let doc = inheritance.iter().find_map(|e| e.doc()).map(str::to_string);

        let id = self.push(Node {
            name,
            name_type,
            variadic,
            optionality,
            kind,
            inheritance,
            parent: Some(parent),
            children: Vec::new(),
            is_a: Vec::new(),
            parent_of: Vec::new(),
            doc,
        });
        self.node_mut(parent).children.push(id);
        tracing::debug!(
            appdef = %self.appdef,
            path = %self.concept_path(id),
            "materialised schema node"
        );
        Ok(id)
    }

    /// Connects concrete child groups of `parent` with the variadic siblings they are instances
    /// of, materialising variadic siblings that only base classes declare.
    fn link_siblings(&mut self, parent: NodeId) -> Result<()> {
        let concrete: Vec<(NodeId, String, String)> = self
            .children(parent)
            .iter()
            .filter_map(|&id| {
                let node = self.node(id);
                let class = node.nx_class()?;
                (!node.variadic).then(|| (id, node.name.clone(), class.to_string()))
            })
            .collect();
        if concrete.is_empty() {
            return Ok(());
        }

        let inherited: Vec<(usize, Arc<Element>)> = self
            .node(parent)
            .inheritance
            .iter()
            .enumerate()
            .flat_map(|(i, owner)| owner.node_children().map(move |c| (i, c.clone())))
            .filter(|(_, e)| e.tag == Element::GROUP_TAG)
            .collect();
        for (owner, element) in inherited {
            let Some((name, name_type)) = element_name(&element) else {
                continue;
            };
            let class = element.attribute("type");
            let is_variadic_sibling = name_type != NameType::Specified
                && concrete.iter().any(|(_, concrete_name, concrete_class)| {
                    class == Some(concrete_class.as_str())
                        && namefit(concrete_name, &name, name_type) >= 0
                });
            if is_variadic_sibling && !self.is_represented(parent, &element) {
                self.add_child(parent, &element, owner)?;
            }
        }

        let children = self.children(parent).to_vec();
        for &(concrete_id, ref concrete_name, ref concrete_class) in &concrete {
            for &variadic_id in &children {
                let variadic = self.node(variadic_id);
                if variadic_id == concrete_id
                    || !variadic.variadic
                    || variadic.nx_class() != Some(concrete_class.as_str())
                    || namefit(concrete_name, &variadic.name, variadic.name_type) < 0
                    || variadic.parent_of.contains(&concrete_id)
                {
                    continue;
                }
                self.node_mut(variadic_id).parent_of.push(concrete_id);
                self.node_mut(concrete_id).is_a.push(variadic_id);
            }
        }

        for &variadic_id in &children {
            let node = self.node_mut(variadic_id);
            let Some(min) = node.occurrence().map(|o| o.min) else {
                continue;
            };
            if node.variadic
                && node.optionality.is_required()
                && node.parent_of.len() >= min.max(1) as usize
            {
                node.optionality = Optionality::Optional;
            }
        }
        Ok(())
    }

    /// Finds the child of `parent` that `name` (a concrete name or a concept) fits best,
    /// materialising it from the base classes if necessary.
    pub fn search_add_child_for(
        &mut self,
        parent: NodeId,
        name: &str,
        want: Want,
    ) -> Result<Option<NodeId>> {
        let mut best_existing: Option<(NodeId, i32)> = None;
        for &child in self.children(parent) {
            let node = self.node(child);
            if !want.accepts_node(node) {
                continue;
            }
            let score = namefit(name, &node.name, node.name_type);
            if score >= 0 && best_existing.map_or(true, |(_, best)| score > best) {
                best_existing = Some((child, score));
            }
        }

        let mut best_inherited: Option<(usize, Arc<Element>, i32)> = None;
        for (owner, container) in self.node(parent).inheritance.iter().enumerate() {
            for element in container.node_children() {
                if !want.accepts_element(element) || self.is_represented(parent, element) {
                    continue;
                }
                let Some((schema_name, name_type)) = self.child_name_for(parent, element) else {
                    continue;
                };
                let score = namefit(name, &schema_name, name_type);
                if score >= 0 && best_inherited.as_ref().map_or(true, |(_, _, best)| score > *best)
                {
                    best_inherited = Some((owner, element.clone(), score));
                }
            }
        }

        match (best_existing, best_inherited) {
            (Some((existing, score)), Some((_, _, inherited))) if score >= inherited => {
                Ok(Some(existing))
            }
            (_, Some((owner, element, _))) => {
                let id = self.add_child(parent, &element, owner)?;
                self.link_siblings(parent)?;
                Ok(Some(id))
            }
            (Some((existing, _)), None) => Ok(Some(existing)),
            (None, None) => Ok(None),
        }
    }

    /// Names of all direct children of `parent`. Unless `only_appdef` is set, children declared
    /// only in base classes are materialised and included.
    pub fn get_all_direct_children_names(
        &mut self,
        parent: NodeId,
        only_appdef: bool,
    ) -> Result<Vec<String>> {
        if !only_appdef {
            self.materialise(parent)?;
        }
        let mut names: Vec<String> = Vec::new();
        for &child in self.children(parent) {
            let node = self.node(child);
            if (!only_appdef || node.is_appdef()) && !names.contains(&node.name) {
                names.push(node.name.clone());
            }
        }
        Ok(names)
    }

    /// Walks a data-converter path (`/ENTRY[entry]/DATA[data]/@signal`) through the tree by
    /// namefitting, returning the node the path is documented by, if any.
    pub fn resolve_concept_path(&mut self, path: &str) -> Result<Option<NodeId>> {
        let path: DataPath = path.parse()?;
        let root = self.root();
        self.resolve_from(root, path.segments())
    }

    fn resolve_from(&mut self, current: NodeId, segments: &[Segment]) -> Result<Option<NodeId>> {
        let Some((segment, rest)) = segments.split_first() else {
            return Ok(Some(current));
        };

        if self.node(current).is_choice() {
            self.materialise(current)?;
            for alternative in self.children(current).to_vec() {
                if let Some(found) = self.resolve_from(alternative, segments)? {
                    return Ok(Some(found));
                }
            }
            return Ok(None);
        }

        // Inner segments are groups, a segment owning an attribute may be a field too, and an
        // unqualified leaf is a field.
        let want = match (segment, rest.first()) {
            (Segment::Attribute(_), _) => Want::Attribute,
            (_, Some(Segment::Attribute(_))) => Want::Any,
            (_, Some(_)) => Want::Group(None),
            (Segment::Named { concept: Some(_), .. }, None) => Want::Any,
            (Segment::Named { concept: None, .. }, None) => Want::Field,
        };
        let next = match segment {
            Segment::Attribute(name) => self.search_add_child_for(current, name, want)?,
            Segment::Named {
                concept: Some(concept),
                instance,
            } => match self.search_add_child_for(current, concept, want)? {
                Some(found) if self.fits_instance(found, instance) => Some(found),
                _ => None,
            },
            Segment::Named {
                concept: None,
                instance,
            } => self.search_add_child_for(current, instance, want)?,
        };

        match next {
            Some(next) => self.resolve_from(next, rest),
            None => Ok(None),
        }
    }

    /// Whether a concrete `instance` name is allowed for `node`.
    pub fn fits_instance(&self, node: NodeId, instance: &str) -> bool {
        let node = self.node(node);
        namefit(instance, &node.name, node.name_type) >= 0
    }
}

/// The child of `container` that corresponds to `element` (same kind, same class for groups,
/// best namefit of `name`).
fn best_match(container: &Element, element: &Element, name: &str) -> Option<Arc<Element>> {
    let candidates = container
        .node_children()
        .filter(|candidate| same_kind_of_tag(&candidate.tag, &element.tag))
        .filter(|candidate| {
            element.tag != Element::GROUP_TAG
                || candidate.attribute("type") == element.attribute("type")
        })
        .filter_map(|candidate| {
            let (candidate_name, name_type) = element_name(candidate)?;
            Some((candidate, candidate_name, name_type))
        });
    best_namefit_of(name, candidates).cloned()
}
