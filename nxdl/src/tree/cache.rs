use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::SchemaTree;
use crate::config::Config;
use crate::error::Result;
use crate::loader::DefinitionLoader;

/// Memoises one [`SchemaTree`] per application definition.
///
/// Cached trees hold only the eagerly built part; a validation run works on its own clone so
/// that lazily materialised nodes never leak between runs.
#[derive(Debug)]
pub struct SchemaCache {
    loader: Arc<DefinitionLoader>,
    trees: Mutex<HashMap<String, Arc<SchemaTree>>>,
}

impl SchemaCache {
    pub fn new(loader: DefinitionLoader) -> Self {
        Self::with_loader(Arc::new(loader))
    }

    pub fn with_loader(loader: Arc<DefinitionLoader>) -> Self {
        Self {
            loader,
            trees: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(DefinitionLoader::new(config))
    }

    pub fn loader(&self) -> &Arc<DefinitionLoader> {
        &self.loader
    }

    pub fn tree(&self, appdef: &str) -> Result<Arc<SchemaTree>> {
        if let Some(tree) = self.lock().get(appdef) {
            return Ok(tree.clone());
        }

        let tree = Arc::new(SchemaTree::build(self.loader.clone(), appdef)?);
        Ok(self
            .lock()
            .entry(appdef.to_string())
            .or_insert(tree)
            .clone())
    }

    /// Drops every cached tree and memoised definition.
    pub fn invalidate(&self) {
        self.lock().clear();
        self.loader.invalidate();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<SchemaTree>>> {
        self.trees.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_loader;

    #[test]
    fn trees_are_memoised_until_invalidated() {
        let cache = SchemaCache::new(fixture_loader());
        let first = cache.tree("NXtest").unwrap();
        let second = cache.tree("NXtest").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        let third = cache.tree("NXtest").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first, third);
    }

    #[test]
    fn unknown_definitions_are_errors() {
        let cache = SchemaCache::new(fixture_loader());
        assert!(matches!(
            cache.tree("NXnope"),
            Err(crate::Error::DefinitionNotFound { .. })
        ));
    }
}
