//! Template skeletons generated from schema trees.

use serde_json::{json, Value};

use crate::template::{Bucket, Template, TemplateError};
use crate::tree::{NodeId, NodeKind, Optionality, SchemaTree};

/// Emits one template entry per field and attribute an application definition declares.
///
/// A field keeps its own requiredness unless it sits below a group that is not required, in
/// which case it is filed as optional and the nearest such group is listed in
/// `optional_parents`. Groups declaring no fields or attributes become lone groups.
///
/// Fails if a declared name does not form a valid template path.
pub fn generate_template(tree: &SchemaTree) -> Result<Template, TemplateError> {
    let mut template = Template::new();
    walk(tree, tree.root(), "", None, &mut template)?;
    Ok(template)
}

fn bucket_of(optionality: Optionality) -> Bucket {
    match optionality {
        Optionality::Required => Bucket::Required,
        Optionality::Recommended => Bucket::Recommended,
        Optionality::Optional => Bucket::Optional,
    }
}

/// Files `path` under the bucket the node's optionality asks for, demoted below an optional
/// ancestor.
fn file_entry(
    template: &mut Template,
    path: String,
    optionality: Optionality,
    optional_ancestor: Option<&str>,
    value: Value,
) -> Result<(), TemplateError> {
    let bucket = match optional_ancestor {
        Some(ancestor) if optionality != Optionality::Optional => {
            template.add_optional_parent(ancestor);
            Bucket::Optional
        }
        Some(_) => Bucket::Optional,
        None => bucket_of(optionality),
    };
    template.insert(bucket, path, value)
}

fn walk(
    tree: &SchemaTree,
    id: NodeId,
    prefix: &str,
    optional_ancestor: Option<&str>,
    template: &mut Template,
) -> Result<(), TemplateError> {
    for &child in tree.children(id) {
        let node = tree.node(child);
        if !node.is_appdef() {
            continue;
        }
        let path = format!("{prefix}/{}", node.template_segment());

        match &node.kind {
            NodeKind::Group(_) => {
                let ancestor = if node.optionality.is_required() {
                    optional_ancestor
                } else {
                    Some(path.as_str())
                };
                let has_leaves = tree.children(child).iter().any(|&c| {
                    let c = tree.node(c);
                    c.is_appdef() && (c.is_field() || c.is_attribute())
                });
                if !has_leaves {
                    template.add_lone_group(path.clone());
                    file_entry(template, path.clone(), node.optionality, optional_ancestor, Value::Null)?;
                }
                walk(tree, child, &path, ancestor, template)?;
            }
            NodeKind::Choice => {
                // every alternative is optional on its own
                for &alternative in tree.children(child) {
                    let group = tree.node(alternative);
                    let has_leaves = tree
                        .children(alternative)
                        .iter()
                        .any(|&c| tree.node(c).is_field() || tree.node(c).is_attribute());
                    if !has_leaves {
                        template.add_lone_group(path.clone());
                        file_entry(template, path.clone(), Optionality::Optional, None, Value::Null)?;
                    }
                    let ancestor = optional_ancestor.or(Some(path.as_str()));
                    if group.is_appdef() {
                        walk(tree, alternative, &path, ancestor, template)?;
                    }
                }
            }
            NodeKind::Field(spec) => {
                let value = match &spec.link_target {
                    Some(target) => json!({ "link": target }),
                    None => Value::Null,
                };
                file_entry(template, path.clone(), node.optionality, optional_ancestor, value)?;
                if spec.unit.map_or(false, |unit| !unit.is_unitless()) {
                    file_entry(
                        template,
                        format!("{path}/@units"),
                        node.optionality,
                        optional_ancestor,
                        Value::Null,
                    )?;
                }

                let ancestor = if node.optionality.is_required() {
                    optional_ancestor
                } else {
                    Some(path.as_str())
                };
                walk(tree, child, &path, ancestor, template)?;
            }
            NodeKind::Attribute(_) => {
                file_entry(template, path, node.optionality, optional_ancestor, Value::Null)?;
            }
        }
    }
    Ok(())
}
