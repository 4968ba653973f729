#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

//! # metaschema-ir
//!
//! Instance-tree items for documents conforming to a metaschema.
//!
//! Items are built bottom-up: a parent is constructed from finished children
//! and links itself into each of them as part of construction. Children keep
//! a non-owning handle to their parent for upward navigation; the tree is
//! immutable once built.

/// Assembly items and their child model map.
pub mod assembly;
/// Root document items.
pub mod document;
/// Field items.
pub mod field;
/// Flag items.
pub mod flag;
/// Parent back-references and the definition/instance binding of items.
pub mod link;
/// Visitor walks, path navigation, and upward traversal.
pub mod traversal;
/// Typed atomic values.
pub mod value;

pub use assembly::{AssemblyItem, ModelItem, ModelMap, ModelValue};
pub use document::DocumentItem;
pub use field::FieldItem;
pub use flag::{FlagItem, FlagMap};
pub use link::{AssemblySource, FieldSource, FlagSource, ParentItem, Source};
pub use traversal::{Cursor, Visitor, ancestors, owning_document, walk};
pub use value::Value;

use thiserror::Error;

/// Errors that can occur when building or navigating an item tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Item '{item}' was read before being linked to a parent")]
    UnregisteredParent { item: String },

    #[error("Parent of item '{item}' is no longer alive")]
    ParentDropped { item: String },

    #[error("Item '{item}' is already linked to a parent")]
    AlreadyLinked { item: String },

    #[error("Item not found at path: {path}")]
    NodeNotFound { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Schema error: {0}")]
    Model(#[from] metaschema_model::Error),
}

impl Error {
    /// Build a node-not-found error with path context.
    pub fn node_not_found(path: impl Into<String>) -> Self {
        Self::NodeNotFound { path: path.into() }
    }

    /// Build an invalid-path error with input path and parsing reason.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-local result type for item operations.
pub type Result<T> = std::result::Result<T, Error>;
