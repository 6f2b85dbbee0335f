use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use encoding_rs::{Encoding, UTF_8};
use roxmltree::Document;

use crate::config::Config;
use crate::element::{Definition, Element};
use crate::error::{Error, Result};

pub const NXDL_EXTENSION: &str = "nxdl.xml";

/// Resolves definition names (`NXentry`, `NXmpes`, ...) to parsed `*.nxdl.xml` files.
///
/// Each definition is read once; later requests for the same name return the memoised copy
/// until [`DefinitionLoader::invalidate`] is called.
#[derive(Debug)]
pub struct DefinitionLoader {
    search_dirs: Vec<PathBuf>,
    loaded: Mutex<HashMap<String, Arc<Definition>>>,
}

impl DefinitionLoader {
    pub fn new(config: &Config) -> Self {
        Self::with_search_dirs(config.search_dirs())
    }

    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Finds the file for `name`, searching contributed definitions, application definitions,
    /// base classes and then any extra directories, in that order.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        let file_name = format!("{name}.{NXDL_EXTENSION}");
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::DefinitionNotFound {
                name: name.to_string(),
                searched: self.search_dirs.clone(),
            })
    }

    /// Loads the definition called `name`, returning it together with the file it came from.
    pub fn load(&self, name: &str) -> Result<(Arc<Definition>, PathBuf)> {
        if let Some(definition) = self.lock().get(name) {
            let path = definition.root.source.path.clone();
            return Ok((definition.clone(), path));
        }

        let path = self.locate(name)?;
        let definition = Arc::new(read_definition(&path)?);
        tracing::debug!(definition = name, path = %path.display(), "loaded NXDL definition");

        let definition = self
            .lock()
            .entry(name.to_string())
            .or_insert(definition)
            .clone();
        Ok((definition, path))
    }

    pub fn definition(&self, name: &str) -> Result<Arc<Definition>> {
        self.load(name).map(|(definition, _)| definition)
    }

    /// Forgets every memoised definition so that the next [`load`](Self::load) re-reads the
    /// corpus from disk.
    pub fn invalidate(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Definition>>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads and parses a single `*.nxdl.xml` file.
pub fn read_definition(path: &Path) -> Result<Definition> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoding = Encoding::for_bom(&bytes)
        .map(|(encoding, _)| encoding)
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(&bytes);

    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let document = Document::parse_with_options(&text, options).map_err(|source| Error::Xml {
        path: path.to_path_buf(),
        source,
    })?;

    let root = document.root_element();
    if root.tag_name().name() != Element::DEFINITION_TAG {
        return Err(Error::NotADefinition {
            path: path.to_path_buf(),
            tag: root.tag_name().name().to_string(),
        });
    }
    if root.attribute("name").is_none() {
        return Err(Error::MissingAttribute {
            path: path.to_path_buf(),
            element: Element::DEFINITION_TAG.to_string(),
            attribute: "name",
        });
    }

    Ok(Definition::map_from_xml(root, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Category;
    use crate::test_support::{fixture_config, fixture_loader};

    #[test]
    fn finds_base_classes_and_applications() {
        let loader = fixture_loader();

        let (entry, path) = loader.load("NXentry").unwrap();
        assert_eq!(entry.name, "NXentry");
        assert_eq!(entry.category, Category::Base);
        assert!(path.ends_with("base_classes/NXentry.nxdl.xml"));

        let (test, path) = loader.load("NXtest").unwrap();
        assert_eq!(test.category, Category::Application);
        assert!(path.ends_with("applications/NXtest.nxdl.xml"));
    }

    #[test]
    fn extra_directories_are_searched_last() {
        let loader = fixture_loader();
        let (_, path) = loader.load("NXmultiplicity").unwrap();
        assert!(path.ends_with("dev_tools/NXmultiplicity.nxdl.xml"));

        let (_, path) = loader.load("NXcontributed").unwrap();
        assert!(path.ends_with("contributed_definitions/NXcontributed.nxdl.xml"));
    }

    #[test]
    fn loading_is_memoised() {
        let loader = fixture_loader();
        let first = loader.definition("NXdata").unwrap();
        let second = loader.definition("NXdata").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        loader.invalidate();
        let third = loader.definition("NXdata").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first, third);
    }

    #[test]
    fn missing_definition_lists_searched_directories() {
        let loader = DefinitionLoader::new(&fixture_config());
        match loader.load("NXdoes_not_exist") {
            Err(Error::DefinitionNotFound { name, searched }) => {
                assert_eq!(name, "NXdoes_not_exist");
                assert_eq!(searched.len(), 4);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn rejects_non_definition_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NXbogus.nxdl.xml");
        std::fs::write(&path, "<schema name=\"NXbogus\"/>").unwrap();
        assert!(matches!(
            read_definition(&path),
            Err(Error::NotADefinition { tag, .. }) if tag == "schema"
        ));

        std::fs::write(&path, "<definition").unwrap();
        assert!(matches!(read_definition(&path), Err(Error::Xml { .. })));
    }
}
