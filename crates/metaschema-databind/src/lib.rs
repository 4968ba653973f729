//! # metaschema-databind
//!
//! Schema-driven binding between XML, JSON, and YAML documents and the item
//! trees of `metaschema-ir`.
//!
//! A [`BindingContext`] pairs a loaded metaschema with a registry of datatype
//! adapters. Reading walks the definitions of the document's root assembly
//! and decodes each flag, field, and child assembly it declares; writing
//! walks an item tree back out following the same definitions, so the
//! group-as and naming conventions of each format round-trip.

pub mod assembly;
pub mod config;
pub mod context;
pub mod datatype;
pub mod document;
pub mod field;
pub mod flag;
mod model;

pub use assembly::AssemblySerializer;
pub use config::{SerializerConfig, UnknownContent};
pub use context::BindingContext;
pub use datatype::{AdapterRegistry, DataTypeAdapter};
pub use document::DocumentSerializer;
pub use field::FieldSerializer;
pub use flag::FlagSerializer;
pub use metaschema_model::SchemaFormat as Format;

use metaschema_xml::XmlElement;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What kind of schema node an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Flag,
    Field,
    Assembly,
    Choice,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "flag"),
            Self::Field => write!(f, "field"),
            Self::Assembly => write!(f, "assembly"),
            Self::Choice => write!(f, "choice"),
        }
    }
}

/// Errors that can occur when reading or writing documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Missing required {kind} '{name}' in '{context}'")]
    MissingRequired {
        kind: ItemKind,
        name: String,
        context: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid {data_type} value: {message}")]
    Adapter { data_type: String, message: String },

    #[error("Schema error: {0}")]
    Model(#[from] metaschema_model::Error),

    #[error("XML error: {0}")]
    Xml(#[from] metaschema_xml::Error),

    #[error("Item error: {0}")]
    Item(#[from] metaschema_ir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument(message.into())
    }

    pub fn missing(kind: ItemKind, name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequired {
            kind,
            name: name.into(),
            context: context.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn adapter(data_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            data_type: data_type.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The four operations every item serializer provides
pub trait ItemSerializer {
    type Item;

    fn read_xml(&self, element: &XmlElement) -> Result<Arc<Self::Item>>;

    fn read_json(&self, value: &serde_json::Value) -> Result<Arc<Self::Item>>;

    fn write_xml(&self, item: &Self::Item) -> Result<XmlElement>;

    fn write_json(&self, item: &Self::Item) -> Result<serde_json::Value>;
}
