//! NXDL application definitions and base classes resolved into schema trees, template
//! generation from those trees, and validation of NeXus data against them.

pub mod config;
pub mod element;
pub mod error;
pub mod file;
pub mod generator;
pub mod loader;
pub mod namefit;
pub mod paths;
pub mod problems;
pub mod template;
pub mod tree;
pub mod units;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use file::{validate_file, EntryOutcome, EntryReport, HdfGroup, Member, MemoryGroup};
pub use generator::generate_template;
pub use loader::DefinitionLoader;
pub use namefit::{namefit, NameType};
pub use paths::DataPath;
pub use problems::{Problem, ProblemCollector, ProblemKind};
pub use template::{Bucket, DataMapping, Template, TemplateError};
pub use tree::builder::Want;
pub use tree::{NodeId, SchemaCache, SchemaTree};
pub use units::{UnitCategory, UnitCheck, UnitRegistry};
pub use validation::{validate, ValidationReport, Validator};
