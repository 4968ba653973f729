//! # metaschema-xml
//!
//! A small, namespace-aware XML element tree.
//!
//! Metaschema modules and XML instance documents are both read into an
//! [`XmlElement`] tree before any schema-driven processing happens. The tree
//! keeps namespace URIs resolved on every element and attribute, so callers
//! never deal with prefixes.

pub mod element;
pub mod reader;
pub mod writer;

pub use element::{QName, XmlAttribute, XmlElement, XmlNode};
pub use reader::{parse, parse_fragment};
pub use writer::{XmlWriteOptions, fragment_to_string, to_string};

use thiserror::Error;

/// Errors that can occur when reading XML text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),

    #[error("Document has no root element")]
    NoRootElement,

    #[error("Unexpected content outside the root element: {0}")]
    TrailingContent(String),

    #[error("Invalid UTF-8 in XML name: {0}")]
    Encoding(String),
}

impl Error {
    /// Build a syntax error at a byte offset
    pub fn syntax(position: u64, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
