//! Binding context: a loaded metaschema plus the adapters and options used to
//! read and write documents against it

use crate::config::{SerializerConfig, UnknownContent};
use crate::datatype::{AdapterRegistry, DataTypeAdapter};
use crate::document::DocumentSerializer;
use crate::{Error, Format, ItemSerializer, Result};
use metaschema_ir::DocumentItem;
use metaschema_model::Metaschema;
use metaschema_xml::{XmlElement, XmlWriteOptions};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for reading and writing documents of one metaschema
#[derive(Debug, Clone)]
pub struct BindingContext {
    metaschema: Arc<Metaschema>,
    adapters: AdapterRegistry,
    config: SerializerConfig,
}

impl BindingContext {
    pub fn new(metaschema: Arc<Metaschema>) -> Self {
        Self {
            metaschema,
            adapters: AdapterRegistry::default(),
            config: SerializerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Add or replace the adapter for one datatype
    pub fn register_adapter(&mut self, adapter: impl DataTypeAdapter + 'static) -> &mut Self {
        self.adapters.register(adapter);
        self
    }

    pub fn metaschema(&self) -> &Arc<Metaschema> {
        &self.metaschema
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Adapter for a datatype name
    pub fn adapter(&self, data_type: &str) -> Result<Arc<dyn DataTypeAdapter>> {
        self.adapters.require(data_type)
    }

    fn documents(&self, location: Option<&str>) -> DocumentSerializer<'_> {
        let serializer = DocumentSerializer::new(self);
        match location {
            Some(location) => serializer.with_location(location),
            None => serializer,
        }
    }

    pub fn read_xml(&self, root: &XmlElement) -> Result<Arc<DocumentItem>> {
        self.documents(None).read_xml(root)
    }

    pub fn read_json(&self, value: &JsonValue) -> Result<Arc<DocumentItem>> {
        self.documents(None).read_json(value)
    }

    pub fn read_xml_str(&self, xml: &str) -> Result<Arc<DocumentItem>> {
        let root = metaschema_xml::parse(xml)?;
        self.read_xml(&root)
    }

    pub fn read_json_str(&self, json: &str) -> Result<Arc<DocumentItem>> {
        let value: JsonValue = serde_json::from_str(json)?;
        self.read_json(&value)
    }

    /// YAML documents share the JSON object shape
    pub fn read_yaml_str(&self, yaml: &str) -> Result<Arc<DocumentItem>> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        self.read_json(&value)
    }

    /// Read document text in a known format, recording where it came from
    pub fn read_document(
        &self,
        location: &str,
        text: &str,
        format: Format,
    ) -> Result<Arc<DocumentItem>> {
        info!(location, ?format, "Reading document");
        let documents = self.documents(Some(location));
        match format {
            Format::Xml => documents.read_xml(&metaschema_xml::parse(text)?),
            Format::Json => documents.read_json(&serde_json::from_str(text)?),
            Format::Yaml => documents.read_json(&serde_yaml::from_str(text)?),
        }
    }

    pub fn write_xml(&self, document: &DocumentItem) -> Result<XmlElement> {
        self.documents(None).write_xml(document)
    }

    pub fn write_json(&self, document: &DocumentItem) -> Result<JsonValue> {
        self.documents(None).write_json(document)
    }

    pub fn write_xml_string(&self, document: &DocumentItem) -> Result<String> {
        let root = self.write_xml(document)?;
        let options = XmlWriteOptions {
            declaration: self.config.xml_declaration,
            indent: self.config.pretty.then_some(2),
        };
        Ok(metaschema_xml::to_string(&root, &options))
    }

    pub fn write_json_string(&self, document: &DocumentItem) -> Result<String> {
        let value = self.write_json(document)?;
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(text)
    }

    pub fn write_yaml_string(&self, document: &DocumentItem) -> Result<String> {
        let value = self.write_json(document)?;
        Ok(serde_yaml::to_string(&value)?)
    }

    /// Apply the unknown-content policy to something no definition declares
    pub(crate) fn unknown(&self, what: &str, owner: &str) -> Result<()> {
        match self.config.unknown_content {
            UnknownContent::Ignore => {
                debug!(what, owner, "Ignoring unknown content");
                Ok(())
            }
            UnknownContent::Reject => Err(Error::malformed(format!(
                "unexpected {} in '{}'",
                what, owner
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_model::MetaschemaSource;

    fn context() -> BindingContext {
        let yaml = r#"
definitions:
  - define-assembly:
      name: empty
      root-name: empty
"#;
        let source = MetaschemaSource::from_yaml_str("empty.yaml", yaml).unwrap();
        BindingContext::new(Metaschema::from_source("empty.yaml", source, vec![]).unwrap())
    }

    #[test]
    fn test_unknown_policy() {
        let lenient = context();
        assert!(lenient.unknown("property 'x'", "empty").is_ok());

        let strict = context().with_config(SerializerConfig::new().strict());
        let err = strict.unknown("property 'x'", "empty").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_register_adapter_replaces() {
        #[derive(Debug)]
        struct Shout;

        impl DataTypeAdapter for Shout {
            fn name(&self) -> &str {
                "string"
            }

            fn parse(&self, text: &str) -> Result<metaschema_ir::Value> {
                Ok(metaschema_ir::Value::String(text.to_uppercase()))
            }

            fn format(&self, value: &metaschema_ir::Value) -> Result<String> {
                Ok(value.to_string())
            }
        }

        let mut context = context();
        context.register_adapter(Shout);
        let value = context.adapter("string").unwrap().parse("hi").unwrap();
        assert_eq!(value.as_str(), Some("HI"));
    }

    #[test]
    fn test_empty_document_text_round_trip() {
        let context = context().with_config(SerializerConfig::new().with_pretty(false));
        let document = context.read_json_str(r#"{"empty":{}}"#).unwrap();
        assert_eq!(context.write_json_string(&document).unwrap(), r#"{"empty":{}}"#);
    }
}
