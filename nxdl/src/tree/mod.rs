//! The schema tree: an application definition with all of its base classes resolved into one
//! tree of typed nodes.
//!
//! Nodes live in an arena owned by [`SchemaTree`] and refer to each other through [`NodeId`]s.
//! Only the parts of the tree declared by application definitions are built eagerly; children
//! that exist only in base classes are materialised on demand (see [`builder`]).

pub mod builder;
pub mod cache;

use std::collections::HashMap;
use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;

use nx_builtins::ElementType;

use crate::element::Element;
use crate::loader::DefinitionLoader;
use crate::namefit::NameType;
use crate::units::UnitCategory;

pub use cache::SchemaCache;

/// A reference to a [`Node`] stored in a [`SchemaTree`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    pub(crate) fn from_len(len: usize) -> Self {
        let size = NonZeroUsize::new(len).expect("arena length is non-zero after a push");
        Self(size.try_into().expect("ID did not fit into 32-bit integer"))
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Node #{}>", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Optionality {
    Required,
    Recommended,
    Optional,
}

impl Optionality {
    pub fn is_required(self) -> bool {
        self == Self::Required
    }
}

/// `minOccurs`/`maxOccurs`. A `max` of `None` is unbounded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enumeration {
    pub items: Vec<String>,
    /// Open enumerations only suggest values.
    pub open: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dimensions {
    /// `None` if the rank is symbolic (e.g. `dataRank`) or absent.
    pub rank: Option<usize>,
    /// `(index, value)` of each `<dim>`; values may be symbols.
    pub dims: Vec<(usize, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupSpec {
    pub nx_class: String,
    pub occurrence: Occurrence,
}

/// Metadata shared by fields and attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub element_type: ElementType,
    pub unit: Option<UnitCategory>,
    pub enumeration: Option<Enumeration>,
    pub dimensions: Option<Dimensions>,
    /// Set for `<link>` declarations.
    pub link_target: Option<String>,
    pub occurrence: Occurrence,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Group(GroupSpec),
    Field(FieldSpec),
    Attribute(FieldSpec),
    /// Exactly one of the child groups must be present.
    Choice,
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Group(_) => Element::GROUP_TAG,
            Self::Field(_) => Element::FIELD_TAG,
            Self::Attribute(_) => Element::ATTRIBUTE_TAG,
            Self::Choice => Element::CHOICE_TAG,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub name_type: NameType,
    pub variadic: bool,
    pub optionality: Optionality,
    pub kind: NodeKind,
    /// The declaring element first, then the matching elements of every base class.
    pub inheritance: Vec<Arc<Element>>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Variadic siblings this concrete node is an instance of.
    pub is_a: Vec<NodeId>,
    /// Concrete siblings that are instances of this variadic node.
    pub parent_of: Vec<NodeId>,
    pub doc: Option<String>,
}

impl Node {
    pub fn group(&self) -> Option<&GroupSpec> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The field or attribute metadata.
    pub fn spec(&self) -> Option<&FieldSpec> {
        match &self.kind {
            NodeKind::Field(spec) | NodeKind::Attribute(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn nx_class(&self) -> Option<&str> {
        self.group().map(|g| g.nx_class.as_str())
    }

    pub fn occurrence(&self) -> Option<Occurrence> {
        match &self.kind {
            NodeKind::Group(group) => Some(group.occurrence),
            NodeKind::Field(spec) | NodeKind::Attribute(spec) => Some(spec.occurrence),
            NodeKind::Choice => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, NodeKind::Field(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, NodeKind::Attribute(_))
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, NodeKind::Choice)
    }

    /// Whether this node is declared by an application definition rather than only by base
    /// classes.
    pub fn is_appdef(&self) -> bool {
        self.inheritance
            .first()
            .map_or(false, |e| e.is_from_application())
    }

    /// The segment this node contributes to a template path: `NAME[name]` for variadic nodes,
    /// `@name` for attributes, the plain name otherwise.
    pub fn template_segment(&self) -> String {
        if self.is_attribute() {
            format!("@{}", self.name)
        } else if self.variadic {
            format!("{}[{}]", self.name, self.name.to_lowercase())
        } else {
            self.name.clone()
        }
    }
}

/// A built schema tree for one application definition.
#[derive(Clone)]
pub struct SchemaTree {
    appdef: String,
    nodes: Vec<Node>,
    loader: Arc<DefinitionLoader>,
    /// Root elements of a class and its `extends` ancestors, by class name.
    class_chains: HashMap<String, Vec<Arc<Element>>>,
    diagnostics: Vec<String>,
}

impl SchemaTree {
    pub fn appdef(&self) -> &str {
        &self.appdef
    }

    pub fn root(&self) -> NodeId {
        NodeId::from_len(1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn loader(&self) -> &Arc<DefinitionLoader> {
        &self.loader
    }

    /// Non-fatal issues met while building, such as inheritance cycles.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// The concept path of a node, e.g. `/ENTRY/DATA/data`. The root is `/`.
    pub fn concept_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            if node.parent.is_some() {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }
        if names.is_empty() {
            return "/".to_string();
        }
        names.iter().rev().map(|name| format!("/{name}")).collect()
    }

    /// Ids of all nodes materialised so far, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// An indented outline of the materialised tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.descendants(self.root()) {
            let node = self.node(id);
            let mut depth = 0;
            let mut current = node.parent;
            while let Some(parent) = current {
                depth += 1;
                current = self.node(parent).parent;
            }

            let detail = match &node.kind {
                NodeKind::Group(group) => format!("({})", group.nx_class),
                NodeKind::Field(spec) | NodeKind::Attribute(spec) => match spec.unit {
                    Some(unit) => format!("<{}> [{}]", spec.element_type, unit),
                    None => format!("<{}>", spec.element_type),
                },
                NodeKind::Choice => "(choice)".to_string(),
            };
            let name = if node.is_attribute() {
                format!("@{}", node.name)
            } else {
                node.name.clone()
            };
            out.push_str(&format!(
                "{:indent$}{name} {detail} {:?}\n",
                "",
                node.optionality,
                indent = depth * 2
            ));
        }
        out
    }
}

impl PartialEq for SchemaTree {
    fn eq(&self, other: &Self) -> bool {
        self.appdef == other.appdef && self.nodes == other.nodes
    }
}

impl fmt::Debug for SchemaTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SchemaTree")
            .field("appdef", &self.appdef)
            .field("nodes", &self.nodes.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}
