use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the schema corpus. Problems found in *data* are never errors; they are
/// collected as [`Problem`](crate::problems::Problem)s instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no definition named {name:?} in any of {searched:?}")]
    DefinitionNotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("{} is not an NXDL definition (root element is <{tag}>)", path.display())]
    NotADefinition { path: PathBuf, tag: String },

    #[error("<{element}> in {} lacks the required {attribute:?} attribute", path.display())]
    MissingAttribute {
        path: PathBuf,
        element: String,
        attribute: &'static str,
    },

    #[error("base class {name:?} referenced from {referenced_from} cannot be loaded")]
    UnknownBaseClass {
        name: String,
        referenced_from: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid data path {0:?}")]
    InvalidPath(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
