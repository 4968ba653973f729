//! # metaschema-model
//!
//! Definition graph, module sources, and import-graph loading for metaschema
//! modules.
//!
//! A module declares flag, field, and assembly definitions. Assemblies hold a
//! model of field, assembly, and choice instances, each a usage-site reference
//! to a definition decorated with cardinality and grouping. Modules import
//! other modules; definitions scoped `Inherited` are visible to importers.

pub mod constraint;
pub mod definition;
pub mod instance;
pub mod loader;
pub mod metaschema;
pub mod resolver;
pub mod source;
mod xml_source;

pub use constraint::{
    AllowedValue, Constraint, ConstraintKind, KeyField, Level, MetapathExpression,
};
pub use definition::{
    AnyDefinition, AssemblyDefinition, Definition, DefinitionInfo, DefinitionKind,
    FieldDefinition, FlagContainer, FlagDefinition, JsonValueKey, ModelContainer, ModuleScope,
    Named, Valued,
};
pub use instance::{
    AssemblyInstance, ChoiceInstance, FieldInstance, FlagInstance, GroupAs, JsonGroupAs,
    MaxOccurs, ModelInstance, NamedModelInstance, Occurrence, Target, XmlGroupAs,
};
pub use loader::{LoadContext, LoaderConfig, MetaschemaLoader};
pub use metaschema::{Metaschema, MetaschemaHeader};
pub use resolver::{FileResolver, MemoryResolver, ResourceResolver, resolve_relative};
pub use source::{MetaschemaSource, SchemaFormat};

use thiserror::Error;

/// Errors that can occur when loading or navigating a metaschema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Definition not found: {kind} '{name}' is not declared in scope of '{location}'")]
    Reference {
        kind: DefinitionKind,
        name: String,
        location: String,
    },

    #[error("Import cycle detected: {}", path.join(" -> "))]
    ImportCycle { path: Vec<String> },

    #[error("Import chain exceeds {max_depth} levels at '{location}'")]
    ImportDepthExceeded { location: String, max_depth: usize },

    #[error("Invalid metaschema '{location}': {message}")]
    InvalidFormat { location: String, message: String },

    #[error("Invalid definition '{name}': {message}")]
    InvalidDefinition { name: String, message: String },

    #[error("Failed to resolve '{location}': {message}")]
    Resolve { location: String, message: String },

    #[error("Metaschema '{0}' is no longer loaded")]
    Detached(String),

    #[error("XML error: {0}")]
    Xml(#[from] metaschema_xml::Error),
}

impl Error {
    /// Build a reference error for a missing definition
    pub fn reference(
        kind: DefinitionKind,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::Reference {
            kind,
            name: name.into(),
            location: location.into(),
        }
    }

    /// Build a format error for a module source
    pub fn invalid_format(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Build an error for an inconsistent definition
    pub fn invalid_definition(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a resolver failure
    pub fn resolve(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            location: location.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
