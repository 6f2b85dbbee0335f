use std::path::{Path, PathBuf};

/// Where definitions are looked up and how validation treats data the schema does not describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Root directory holding `base_classes/`, `applications/` and `contributed_definitions/`.
    pub definitions_root: PathBuf,
    /// Directories searched after the three standard ones, in order.
    pub extra_search_dirs: Vec<PathBuf>,
    pub ignore_undocumented: bool,
    /// Soft links are followed at most this many hops before being reported as broken.
    pub max_link_depth: usize,
}

impl Config {
    /// Environment variable overriding the definitions root.
    pub const DEFINITIONS_ENV: &'static str = "NEXUS_DEF_PATH";
    pub const DEFAULT_DEFINITIONS_ROOT: &'static str = "definitions";
    pub const DEFAULT_MAX_LINK_DEPTH: usize = 8;

    pub fn with_root(definitions_root: impl Into<PathBuf>) -> Self {
        Self {
            definitions_root: definitions_root.into(),
            extra_search_dirs: Vec::new(),
            ignore_undocumented: false,
            max_link_depth: Self::DEFAULT_MAX_LINK_DEPTH,
        }
    }

    /// Reads the definitions root from [`Config::DEFINITIONS_ENV`], falling back to
    /// `./definitions`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(Self::DEFINITIONS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DEFINITIONS_ROOT));
        Self::with_root(root)
    }

    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_search_dirs.push(dir.into());
        self
    }

    pub fn ignore_undocumented(mut self, ignore: bool) -> Self {
        self.ignore_undocumented = ignore;
        self
    }

    /// The directories searched for `<name>.nxdl.xml`, in lookup order.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let root: &Path = &self.definitions_root;
        let mut dirs = vec![
            root.join("contributed_definitions"),
            root.join("applications"),
            root.join("base_classes"),
        ];
        dirs.extend(self.extra_search_dirs.iter().cloned());
        dirs
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
