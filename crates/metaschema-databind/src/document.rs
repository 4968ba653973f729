//! Document serialization
//!
//! A JSON document is an object with exactly one property, named by the root
//! name of a root assembly. An XML document's root element carries the root
//! name in the defining module's namespace.

use crate::assembly::AssemblySerializer;
use crate::context::BindingContext;
use crate::datatype::json_kind;
use crate::{Error, ItemSerializer, Result};
use metaschema_ir::DocumentItem;
use metaschema_model::{AssemblyDefinition, Definition};
use metaschema_xml::XmlElement;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Reads and writes whole documents
pub struct DocumentSerializer<'a> {
    context: &'a BindingContext,
    location: Option<String>,
}

impl<'a> DocumentSerializer<'a> {
    pub fn new(context: &'a BindingContext) -> Self {
        Self {
            context,
            location: None,
        }
    }

    /// Record where documents read by this serializer came from
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn root_definition(&self, root_name: &str) -> Result<Arc<AssemblyDefinition>> {
        self.context
            .metaschema()
            .root_assembly_by_root_name(root_name)
            .ok_or_else(|| {
                Error::malformed(format!("'{}' is not the root name of any assembly", root_name))
            })
    }

    /// The document's own location, else the metaschema's
    fn location(&self) -> String {
        self.location
            .clone()
            .unwrap_or_else(|| self.context.metaschema().location().to_string())
    }

    fn wrap(&self, root: Arc<metaschema_ir::AssemblyItem>) -> Result<Arc<DocumentItem>> {
        Ok(DocumentItem::new(root, Some(self.location()))?)
    }
}

impl ItemSerializer for DocumentSerializer<'_> {
    type Item = DocumentItem;

    fn read_xml(&self, element: &XmlElement) -> Result<Arc<DocumentItem>> {
        let definition = self.root_definition(element.local_name())?;
        let metaschema = definition.containing_metaschema()?;
        let namespace = metaschema.header().namespace.as_deref();
        if element.namespace() != namespace {
            return Err(Error::malformed(format!(
                "root element '{}' is not in namespace '{}'",
                element.name(),
                namespace.unwrap_or("")
            )));
        }
        debug!(root = element.local_name(), "Reading XML document");
        let root = AssemblySerializer::new(self.context, definition)?.read_xml(element)?;
        self.wrap(root)
    }

    fn read_json(&self, value: &JsonValue) -> Result<Arc<DocumentItem>> {
        let object = value.as_object().ok_or_else(|| {
            Error::malformed(format!("document must be an object, found {}", json_kind(value)))
        })?;
        let mut entries = object.iter();
        let (root_name, root_value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(Error::malformed("document object is empty")),
            (Some(_), Some(_)) => {
                let keys: Vec<&str> = object.keys().map(String::as_str).collect();
                return Err(Error::malformed(format!(
                    "document object must have exactly one root property, found {}",
                    keys.join(", ")
                )));
            }
        };
        let definition = self.root_definition(root_name)?;
        debug!(root = root_name.as_str(), "Reading JSON document");
        let root = AssemblySerializer::new(self.context, definition)?.read_json(root_value)?;
        self.wrap(root)
    }

    fn write_xml(&self, document: &DocumentItem) -> Result<XmlElement> {
        AssemblySerializer::new(self.context, document.root_definition().clone())?
            .write_xml(document.root())
    }

    fn write_json(&self, document: &DocumentItem) -> Result<JsonValue> {
        let root = AssemblySerializer::new(self.context, document.root_definition().clone())?
            .write_json(document.root())?;
        let mut object = Map::new();
        object.insert(document.root_name().to_string(), root);
        Ok(JsonValue::Object(object))
    }
}
