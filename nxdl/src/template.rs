//! The exchange format between readers, the validator and writers: data-converter paths mapped
//! to values, bucketed by how strongly the schema asks for them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::paths::DataPath;

/// A flat mapping from data-converter paths to values, as handed to the validator.
pub type DataMapping = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{0:?} is not a key of the template")]
    UnknownKey(String),
    #[error("{0:?} is not a valid template path")]
    InvalidPath(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Required,
    Recommended,
    Optional,
    Undocumented,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Self::Required,
        Self::Recommended,
        Self::Optional,
        Self::Undocumented,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
            Self::Undocumented => "undocumented",
        }
    }
}

/// A named part of a [`Template`], see [`Template::section`].
#[derive(Debug, PartialEq)]
pub enum Section<'a> {
    Bucket(&'a DataMapping),
    List(&'a [String]),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub required: DataMapping,
    pub recommended: DataMapping,
    pub optional: DataMapping,
    pub undocumented: DataMapping,
    /// Groups without fields or attributes of their own whose presence carries meaning.
    pub lone_groups: Vec<String>,
    /// Non-required groups with required descendants.
    pub optional_parents: Vec<String>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, bucket: Bucket) -> &DataMapping {
        match bucket {
            Bucket::Required => &self.required,
            Bucket::Recommended => &self.recommended,
            Bucket::Optional => &self.optional,
            Bucket::Undocumented => &self.undocumented,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut DataMapping {
        match bucket {
            Bucket::Required => &mut self.required,
            Bucket::Recommended => &mut self.recommended,
            Bucket::Optional => &mut self.optional,
            Bucket::Undocumented => &mut self.undocumented,
        }
    }

    /// The bucket currently holding `path`.
    pub fn bucket_of(&self, path: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|&bucket| self.bucket(bucket).contains_key(path))
    }

    /// Puts `path` into `bucket`, taking it out of any other bucket.
    pub fn insert(
        &mut self,
        bucket: Bucket,
        path: impl Into<String>,
        value: Value,
    ) -> Result<(), TemplateError> {
        let path = path.into();
        if path.parse::<DataPath>().is_err() {
            return Err(TemplateError::InvalidPath(path));
        }
        if let Some(previous) = self.bucket_of(&path).filter(|&b| b != bucket) {
            self.bucket_mut(previous).remove(&path);
        }
        self.bucket_mut(bucket).insert(path, value);
        Ok(())
    }

    /// Sets the value of a key the schema already seeded; the key keeps its bucket.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), TemplateError> {
        let bucket = [Bucket::Optional, Bucket::Recommended, Bucket::Required]
            .into_iter()
            .find(|&bucket| self.bucket(bucket).contains_key(path))
            .ok_or_else(|| TemplateError::UnknownKey(path.to_string()))?;
        self.bucket_mut(bucket).insert(path.to_string(), value);
        Ok(())
    }

    /// Records data the schema does not describe.
    pub fn set_undocumented(
        &mut self,
        path: impl Into<String>,
        value: Value,
    ) -> Result<(), TemplateError> {
        self.insert(Bucket::Undocumented, path, value)
    }

    /// Sets every documented key and files everything else as undocumented. Returns the number
    /// of undocumented keys added.
    pub fn fill(
        &mut self,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<usize, TemplateError> {
        let mut undocumented = 0;
        for (path, value) in values {
            match self.set(&path, value.clone()) {
                Ok(()) => {}
                Err(TemplateError::UnknownKey(_)) => {
                    self.set_undocumented(path, value)?;
                    undocumented += 1;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(undocumented)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        Bucket::ALL
            .into_iter()
            .find_map(|bucket| self.bucket(bucket).get(path))
    }

    /// Looks up a part of the template by name: one of the four buckets, `lone_groups` or
    /// `optional_parents`.
    pub fn section(&self, name: &str) -> Option<Section<'_>> {
        Some(match name {
            "required" => Section::Bucket(&self.required),
            "recommended" => Section::Bucket(&self.recommended),
            "optional" => Section::Bucket(&self.optional),
            "undocumented" => Section::Bucket(&self.undocumented),
            "lone_groups" => Section::List(&self.lone_groups),
            "optional_parents" => Section::List(&self.optional_parents),
            _ => return None,
        })
    }

    /// The union of the schema-seeded buckets.
    pub fn get_documented(&self) -> DataMapping {
        [Bucket::Required, Bucket::Recommended, Bucket::Optional]
            .into_iter()
            .flat_map(|bucket| self.bucket(bucket).clone())
            .collect()
    }

    /// All entries, bucket by bucket, each bucket in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        Bucket::ALL
            .into_iter()
            .flat_map(move |bucket| self.bucket(bucket).iter())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.iter().map(|(key, _)| key)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let bucket = self.bucket_of(path)?;
        self.bucket_mut(bucket).remove(path)
    }

    pub fn len(&self) -> usize {
        Bucket::ALL
            .into_iter()
            .map(|bucket| self.bucket(bucket).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_lone_group(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.lone_groups.contains(&path) {
            self.lone_groups.push(path);
        }
    }

    pub fn add_optional_parent(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.optional_parents.contains(&path) {
            self.optional_parents.push(path);
        }
    }

    /// The flat mapping the validator consumes: every entry with a value.
    pub fn to_mapping(&self) -> DataMapping {
        self.iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> Template {
        let mut template = Template::new();
        template
            .insert(Bucket::Required, "/ENTRY[entry]/title", Value::Null)
            .unwrap();
        template
            .insert(Bucket::Optional, "/ENTRY[entry]/notes", Value::Null)
            .unwrap();
        template
    }

    #[test]
    fn set_keeps_the_seeded_bucket() {
        let mut template = seeded();
        template.set("/ENTRY[entry]/title", json!("hello")).unwrap();
        assert_eq!(template.required["/ENTRY[entry]/title"], json!("hello"));
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/title"),
            Some(Bucket::Required)
        );
        assert_eq!(
            template.set("/ENTRY[entry]/other", json!(1)),
            Err(TemplateError::UnknownKey("/ENTRY[entry]/other".into()))
        );
    }

    #[test]
    fn a_key_lives_in_exactly_one_bucket() {
        let mut template = seeded();
        template
            .insert(Bucket::Recommended, "/ENTRY[entry]/title", json!("x"))
            .unwrap();
        assert!(!template.required.contains_key("/ENTRY[entry]/title"));
        assert_eq!(template.len(), 2);
        assert_eq!(template.get("/ENTRY[entry]/title"), Some(&json!("x")));
    }

    #[test]
    fn keys_must_be_paths() {
        let mut template = Template::new();
        assert_eq!(
            template.set_undocumented("ENTRY/title", json!(1)),
            Err(TemplateError::InvalidPath("ENTRY/title".into()))
        );
    }

    #[test]
    fn fill_routes_unknown_keys_to_undocumented() {
        let mut template = seeded();
        let added = template
            .fill([
                ("/ENTRY[entry]/title".to_string(), json!("t")),
                ("/ENTRY[entry]/mystery".to_string(), json!(3)),
            ])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/mystery"),
            Some(Bucket::Undocumented)
        );

        let mapping = template.to_mapping();
        assert_eq!(mapping.len(), 2);
        assert!(!mapping.contains_key("/ENTRY[entry]/notes"));
        assert_eq!(template.get_documented().len(), 2);
    }

    #[test]
    fn sections_by_name() {
        let mut template = seeded();
        template.add_lone_group("/ENTRY[entry]/SAMPLE[sample]");
        template.add_lone_group("/ENTRY[entry]/SAMPLE[sample]");
        assert_eq!(
            template.section("lone_groups"),
            Some(Section::List(&["/ENTRY[entry]/SAMPLE[sample]".to_string()][..]))
        );
        assert!(matches!(
            template.section("required"),
            Some(Section::Bucket(bucket)) if bucket.len() == 1
        ));
        assert_eq!(template.section("bogus"), None);
    }

    #[test]
    fn iteration_goes_bucket_by_bucket() {
        let mut template = seeded();
        template.set_undocumented("/a", json!(1)).unwrap();
        let keys: Vec<_> = template.keys().cloned().collect();
        assert_eq!(
            keys,
            ["/ENTRY[entry]/title", "/ENTRY[entry]/notes", "/a"]
        );
        assert_eq!(template.remove("/a"), Some(json!(1)));
        assert_eq!(template.remove("/a"), None);
    }
}
