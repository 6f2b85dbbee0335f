//! Conversion of flat data mappings into nested groups.
//!
//! Keys are split on `/`. An attribute of a group is stored in that group as `@attr`; an
//! attribute of a field is stored next to the field, in the enclosing group, as `field@attr`.
//! `null` values are absent and an empty object `{}` stands for an empty group. A field that
//! other keys are nested below appears twice in its group: once as the field and once as a group
//! holding those keys.

use std::collections::HashSet;

use serde_json::Value;

use crate::paths::Segment;
use crate::template::DataMapping;

#[derive(Debug, PartialEq)]
pub(crate) enum DataValue {
    Group(DataGroup),
    Leaf(Value),
}

#[derive(Debug, PartialEq)]
pub(crate) struct DataEntry {
    /// `name`, `CONCEPT[name]`, `field@attr` or `@attr`.
    pub key: String,
    /// The flat key this entry came from, or the path of the group.
    pub path: String,
    pub value: DataValue,
}

impl DataEntry {
    pub fn group(&self) -> Option<&DataGroup> {
        match &self.value {
            DataValue::Group(group) => Some(group),
            DataValue::Leaf(_) => None,
        }
    }

    pub fn leaf(&self) -> Option<&Value> {
        match &self.value {
            DataValue::Leaf(value) => Some(value),
            DataValue::Group(_) => None,
        }
    }

    /// The key parsed as a path segment, unless it is an attribute key.
    pub fn segment(&self) -> Option<Segment> {
        if self.key.contains('@') {
            return None;
        }
        self.key.parse().ok()
    }

    /// The name in data: `name` for `CONCEPT[name]`.
    pub fn instance(&self) -> &str {
        instance_of(&self.key)
    }

    /// Flat keys of every leaf at or below this entry.
    pub fn leaf_paths(&self) -> Vec<String> {
        match &self.value {
            DataValue::Leaf(_) => vec![self.path.clone()],
            DataValue::Group(group) => {
                let mut paths = group.leaf_paths();
                paths.push(self.path.clone());
                paths
            }
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct DataGroup {
    /// `""` for the root.
    pub path: String,
    pub entries: Vec<DataEntry>,
}

impl DataGroup {
    pub fn entry(&self, key: &str) -> Option<&DataEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// The field, link or group whose key is `name` or `CONCEPT[name]`.
    pub fn entry_by_instance(&self, name: &str) -> Option<&DataEntry> {
        self.entry(name).or_else(|| {
            self.entries
                .iter()
                .find(|e| !e.key.contains('@') && e.instance() == name)
        })
    }

    /// The value of the group attribute `@name`.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.entry(&format!("@{name}")).and_then(DataEntry::leaf)
    }

    /// The `@NX_class` this group declares, if any.
    pub fn nx_class(&self) -> Option<&str> {
        self.attribute("NX_class").and_then(Value::as_str)
    }

    /// Attribute entries `field@attr` belonging to the field keyed `field`.
    pub fn field_attributes<'g>(
        &'g self,
        field: &'g str,
    ) -> impl Iterator<Item = (&'g str, &'g DataEntry)> + 'g {
        self.entries.iter().filter_map(move |e| {
            let rest = e.key.strip_prefix(field)?.strip_prefix('@')?;
            Some((rest, e))
        })
    }

    pub fn leaf_paths(&self) -> Vec<String> {
        self.entries.iter().flat_map(DataEntry::leaf_paths).collect()
    }

    fn group_mut(&mut self, key: &str, path: String) -> &mut DataGroup {
        let position = self
            .entries
            .iter()
            .position(|e| e.key == key && e.group().is_some());
        let index = match position {
            Some(index) => index,
            None => {
                self.entries.push(DataEntry {
                    key: key.to_string(),
                    path: path.clone(),
                    value: DataValue::Group(DataGroup {
                        path,
                        entries: Vec::new(),
                    }),
                });
                self.entries.len() - 1
            }
        };
        match &mut self.entries[index].value {
            DataValue::Group(group) => group,
            DataValue::Leaf(_) => unreachable!("position only matches groups"),
        }
    }

    fn descend(&mut self, segments: &[&str]) -> &mut DataGroup {
        let mut current = self;
        for (depth, segment) in segments.iter().enumerate() {
            let path = join(&segments[..=depth]);
            current = current.group_mut(segment, path);
        }
        current
    }

    /// Finds the value at an absolute path, matching each segment against keys or, for
    /// `CONCEPT[name]` keys, against the instance name.
    pub fn lookup(&self, path: &str) -> Option<&DataValue> {
        let segments: Vec<&str> = path
            .strip_prefix('/')?
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let (last, parents) = segments.split_last()?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current.entry_by_instance(segment)?;
            match entry.group() {
                Some(group) => current = group,
                // attribute of a field: `/.../field/@attr`
                None if depth + 1 == parents.len() => {
                    let attribute = last.strip_prefix('@')?;
                    return current
                        .entry(&format!("{}@{attribute}", entry.key))
                        .map(|e| &e.value);
                }
                None => return None,
            }
        }

        current.entry_by_instance(last).map(|e| &e.value)
    }
}

/// `name` for a `CONCEPT[name]` key, the key itself otherwise.
pub(crate) fn instance_of(key: &str) -> &str {
    match (key.find('['), key.strip_suffix(']')) {
        (Some(open), Some(stripped)) if !key.contains('@') => &stripped[open + 1..],
        _ => key,
    }
}

fn join(segments: &[&str]) -> String {
    segments.iter().map(|s| format!("/{s}")).collect()
}

/// A nested view of a flat mapping.
#[derive(Debug, Default)]
pub(crate) struct Nested {
    pub root: DataGroup,
    /// Paths of every group, including implicit intermediate ones.
    pub groups: HashSet<String>,
}

fn is_empty_group(value: &Value) -> bool {
    value.as_object().map_or(false, |o| o.is_empty())
}

pub(crate) fn nest(mapping: &DataMapping) -> Nested {
    let keys: Vec<(&String, Vec<&str>, &Value)> = mapping
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(key, value)| {
            // keys that are not absolute paths are left to the documentation check
            let segments: Vec<&str> = key
                .strip_prefix('/')?
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            (!segments.is_empty()).then_some((key, segments, value))
        })
        .collect();

    let mut groups = HashSet::new();
    let mut fields = HashSet::new();
    for (_, segments, value) in &keys {
        let last_is_attribute = segments.last().map_or(false, |s| s.starts_with('@'));
        // proper prefixes, excluding the owner of an attribute
        let end = if last_is_attribute {
            segments.len().saturating_sub(2)
        } else {
            segments.len() - 1
        };
        for depth in 1..=end {
            groups.insert(join(&segments[..depth]));
        }
        if !last_is_attribute {
            if is_empty_group(value) {
                groups.insert(join(segments));
            } else {
                fields.insert(join(segments));
            }
        }
    }

    let mut root = DataGroup::default();
    for (key, segments, value) in keys {
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => continue,
        };

        if last.starts_with('@') {
            let owner = join(parents);
            if parents.is_empty() || (groups.contains(&owner) && !fields.contains(&owner)) {
                root.descend(parents).entries.push(DataEntry {
                    key: last.to_string(),
                    path: key.clone(),
                    value: DataValue::Leaf(value.clone()),
                });
            } else if let Some((field, enclosing)) = parents.split_last() {
                root.descend(enclosing).entries.push(DataEntry {
                    key: format!("{field}{last}"),
                    path: key.clone(),
                    value: DataValue::Leaf(value.clone()),
                });
            }
        } else if is_empty_group(value) {
            root.descend(&segments);
        } else {
            root.descend(parents).entries.push(DataEntry {
                key: last.to_string(),
                path: key.clone(),
                value: DataValue::Leaf(value.clone()),
            });
        }
    }

    Nested { root, groups }
}

/// The target of a `{"link": target}` value.
pub(crate) fn link_target(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("link")?.as_str()
}

/// The payload of a `{"compress": value, "strength": n}` value.
pub(crate) fn compressed(value: &Value) -> Option<&Value> {
    value.as_object()?.get("compress")
}
