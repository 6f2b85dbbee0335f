use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use roxmltree::Node;

/// Whether a definition is a reusable base class or prescribes structure as an application
/// definition (`category` attribute of `<definition>`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Base,
    Application,
}

impl Category {
    fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("application") => Self::Application,
            _ => Self::Base,
        }
    }
}

/// The file an [`Element`] was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub definition: String,
    pub path: PathBuf,
    pub category: Category,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.definition, self.path.display())
    }
}

/// An owned NXDL element.
///
/// The parser's borrowed nodes are converted into this shape so that schema trees can keep
/// elements of many files alive in their inheritance chains.
#[derive(Debug, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Arc<Element>>,
    /// Concatenated text content, if any non-whitespace text is present.
    pub text: Option<String>,
    pub source: Arc<Source>,
    /// 1-based row of the start tag in the source file.
    pub row: u32,
}

impl Element {
    pub const DEFINITION_TAG: &'static str = "definition";
    pub const GROUP_TAG: &'static str = "group";
    pub const FIELD_TAG: &'static str = "field";
    pub const ATTRIBUTE_TAG: &'static str = "attribute";
    pub const CHOICE_TAG: &'static str = "choice";
    pub const LINK_TAG: &'static str = "link";
    pub const DOC_TAG: &'static str = "doc";
    pub const ENUMERATION_TAG: &'static str = "enumeration";
    pub const ITEM_TAG: &'static str = "item";
    pub const DIMENSIONS_TAG: &'static str = "dimensions";
    pub const DIM_TAG: &'static str = "dim";

    pub(crate) fn map_from_xml(node: Node, source: &Arc<Source>) -> Arc<Self> {
        let document = node.document();
        let attributes = node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();
        let children = node
            .children()
            .filter(Node::is_element)
            .map(|child| Self::map_from_xml(child, source))
            .collect();
        let text: String = node
            .children()
            .filter(Node::is_text)
            .filter_map(|t| t.text())
            .collect();
        let text = (!text.trim().is_empty()).then(|| text.trim().to_string());

        Arc::new(Self {
            tag: node.tag_name().name().to_string(),
            attributes,
            children,
            text,
            source: source.clone(),
            row: document.text_pos_at(node.range().start).row,
        })
    }

    /// Looks up an attribute by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_flag_set(&self, name: &str) -> bool {
        self.attribute(name) == Some("true")
    }

    pub fn child(&self, tag: &str) -> Option<&Arc<Element>> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Arc<Element>> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Children that become schema tree nodes.
    pub fn node_children(&self) -> impl Iterator<Item = &Arc<Element>> {
        self.children.iter().filter(|c| c.is_node_tag())
    }

    pub fn is_node_tag(&self) -> bool {
        matches!(
            self.tag.as_str(),
            Self::GROUP_TAG
                | Self::FIELD_TAG
                | Self::ATTRIBUTE_TAG
                | Self::CHOICE_TAG
                | Self::LINK_TAG
        )
    }

    pub fn is_from_application(&self) -> bool {
        self.source.category == Category::Application
    }

    pub fn doc(&self) -> Option<&str> {
        self.child(Self::DOC_TAG).and_then(|d| d.text.as_deref())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if let Some(name) = self.attribute("name") {
            write!(f, " name={name:?}")?;
        }
        if let Some(type_) = self.attribute("type") {
            write!(f, " type={type_:?}")?;
        }
        write!(f, "> at {}:{}", self.source.path.display(), self.row)
    }
}

/// A parsed `*.nxdl.xml` file.
#[derive(Debug, PartialEq)]
pub struct Definition {
    pub name: String,
    pub extends: Option<String>,
    pub category: Category,
    pub root: Arc<Element>,
}

impl Definition {
    pub(crate) fn map_from_xml(root: Node, path: PathBuf) -> Self {
        let name = root.attribute("name").unwrap_or_default().to_string();
        let category = Category::from_attribute(root.attribute("category"));
        let extends = root
            .attribute("extends")
            .filter(|e| !e.is_empty() && *e != name)
            .map(str::to_string);
        let source = Arc::new(Source {
            definition: name.clone(),
            path,
            category,
        });
        let root = Element::map_from_xml(root, &source);

        Self {
            name,
            extends,
            category,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0"?>
<definition xmlns="http://definition.nexusformat.org/nxdl/3.1" name="NXthing"
            extends="NXobject" type="group" category="application">
    <doc>A thing.</doc>
    <group type="NXentry">
        <field name="title" optional="true"/>
    </group>
</definition>"#;

    #[test]
    fn maps_definition_attributes_and_children() {
        let document = roxmltree::Document::parse(XML).unwrap();
        let definition =
            Definition::map_from_xml(document.root_element(), PathBuf::from("NXthing.nxdl.xml"));

        assert_eq!(definition.name, "NXthing");
        assert_eq!(definition.extends.as_deref(), Some("NXobject"));
        assert_eq!(definition.category, Category::Application);
        assert_eq!(definition.root.doc(), Some("A thing."));

        let entry = definition.root.node_children().next().unwrap();
        assert_eq!(entry.tag, Element::GROUP_TAG);
        assert_eq!(entry.attribute("type"), Some("NXentry"));
        assert!(entry.is_from_application());
        assert_eq!(entry.row, 5);

        let title = entry.child(Element::FIELD_TAG).unwrap();
        assert!(title.is_flag_set("optional"));
    }

    #[test]
    fn self_extension_is_dropped() {
        let document = roxmltree::Document::parse(
            r#"<definition name="NXobject" extends="NXobject" category="base"/>"#,
        )
        .unwrap();
        let definition = Definition::map_from_xml(document.root_element(), PathBuf::new());
        assert_eq!(definition.extends, None);
        assert_eq!(definition.category, Category::Base);
    }
}
