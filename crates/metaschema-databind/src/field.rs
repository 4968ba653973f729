//! Field serialization
//!
//! A field with no flags is a bare scalar in JSON. Otherwise it is an object
//! holding its flags plus one property for the value, named by the
//! definition's JSON value key.

use crate::context::BindingContext;
use crate::datatype::{DataTypeAdapter, json_kind};
use crate::flag::{
    FlagSerializer, flag_text, read_json_flags, read_xml_flags, repeated_key_flag,
    write_json_flags, write_xml_flags,
};
use crate::model::MemberSerializer;
use crate::{Error, ItemKind, ItemSerializer, Result};
use metaschema_ir::{FieldItem, FieldSource, FlagItem, ModelItem, Source};
use metaschema_model::{
    Definition, FieldDefinition, FlagContainer, JsonValueKey, Named, NamedModelInstance, Valued,
};
use metaschema_xml::{QName, XmlElement, XmlNode};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// XHTML block elements an unwrapped markup field claims from its parent
const MARKUP_BLOCKS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "pre", "hr", "blockquote", "table",
    "img",
];

pub(crate) fn is_markup_block(element: &XmlElement, namespace: Option<&str>) -> bool {
    element.namespace() == namespace && MARKUP_BLOCKS.contains(&element.local_name())
}

/// Reads and writes the items of one field definition or instance
pub struct FieldSerializer<'a> {
    context: &'a BindingContext,
    source: FieldSource,
    definition: Arc<FieldDefinition>,
    adapter: Arc<dyn DataTypeAdapter>,
}

impl<'a> FieldSerializer<'a> {
    pub fn new(context: &'a BindingContext, source: impl Into<FieldSource>) -> Result<Self> {
        let source = source.into();
        let definition = match &source {
            Source::Definition(definition) => definition.clone(),
            Source::Instance(instance) => instance.definition()?,
        };
        let adapter = context.adapter(definition.data_type())?;
        Ok(Self {
            context,
            source,
            definition,
            adapter,
        })
    }

    /// Effective name of the field at its usage site
    pub fn name(&self) -> Result<String> {
        match &self.source {
            Source::Definition(definition) => Ok(definition.effective_name().to_string()),
            Source::Instance(instance) => Ok(instance.effective_name()?),
        }
    }

    pub fn definition(&self) -> &Arc<FieldDefinition> {
        &self.definition
    }

    pub fn adapter(&self) -> &Arc<dyn DataTypeAdapter> {
        &self.adapter
    }

    /// Whether the value sits directly in the parent element
    pub fn is_unwrapped(&self) -> bool {
        match &self.source {
            Source::Instance(instance) => !instance.is_in_xml_wrapped(),
            Source::Definition(_) => false,
        }
    }

    fn namespace(&self) -> Result<Option<String>> {
        Ok(match &self.source {
            Source::Instance(instance) => instance.xml_namespace()?,
            Source::Definition(definition) => {
                definition.containing_metaschema()?.header().namespace.clone()
            }
        })
    }

    fn element_name(&self) -> Result<QName> {
        Ok(QName::new(self.namespace()?.as_deref(), self.name()?))
    }

    fn static_value_key(&self) -> String {
        match self.definition.json_value_key() {
            Some(JsonValueKey::Name(name)) => name.clone(),
            _ => self.adapter.default_json_value_key().to_string(),
        }
    }

    /// Read a field, taking the key flag's value from `key` when the field is
    /// a member of a keyed group
    pub(crate) fn read_json_keyed(
        &self,
        json: &JsonValue,
        key: Option<&str>,
    ) -> Result<Arc<FieldItem>> {
        let name = self.name()?;
        if json.is_null() {
            return Err(Error::malformed(format!("field '{}' is null", name)));
        }

        let mut skip = Vec::new();
        let mut flags: Vec<Arc<FlagItem>> = Vec::new();
        let mut key_flag = None;
        if let Some(key) = key {
            let instance = self.definition.json_key_flag_instance()?.ok_or_else(|| {
                Error::malformed(format!("field '{}' is keyed but declares no json-key", name))
            })?;
            let serializer = FlagSerializer::new(self.context, instance)?;
            skip.push(serializer.name()?);
            flags.push(serializer.read_text(key)?);
            key_flag = Some((serializer, key));
        }

        if self.definition.flag_instances().len() == flags.len() {
            let value = self.adapter.read_json(json)?;
            return Ok(FieldItem::new(self.source.clone(), value, flags)?);
        }

        let object = json.as_object().ok_or_else(|| {
            Error::malformed(format!(
                "field '{}' has flags and must be an object, found {}",
                name,
                json_kind(json)
            ))
        })?;
        let repeated_key = match &key_flag {
            Some((serializer, key)) => repeated_key_flag(serializer, key, object, &name)?,
            None => None,
        };
        let value_key_flag = self.definition.json_value_key_flag_instance()?;
        if let Some(instance) = &value_key_flag {
            skip.push(instance.effective_name()?);
        }
        let skip: Vec<&str> = skip.iter().map(String::as_str).collect();
        let (read, mut known) =
            read_json_flags(self.context, &*self.definition, object, &name, &skip)?;
        flags.extend(read);
        known.extend(repeated_key);

        let (value_key, value_json) = match value_key_flag {
            Some(instance) => {
                let mut candidates = object.iter().filter(|(k, _)| !known.contains(*k));
                let (property, value) = candidates.next().ok_or_else(|| {
                    Error::missing(ItemKind::Field, format!("{} value", name), name.clone())
                })?;
                if let Some((extra, _)) = candidates.next() {
                    return Err(Error::malformed(format!(
                        "field '{}' has more than one value property ('{}', '{}')",
                        name, property, extra
                    )));
                }
                flags.push(FlagSerializer::new(self.context, instance)?.read_text(property)?);
                (property.clone(), value)
            }
            None => {
                let property = self.static_value_key();
                let value = object
                    .get(&property)
                    .ok_or_else(|| Error::missing(ItemKind::Field, property.clone(), name.clone()))?;
                (property, value)
            }
        };
        if value_json.is_null() {
            return Err(Error::malformed(format!(
                "value '{}' of field '{}' is null",
                value_key, name
            )));
        }
        let value = self.adapter.read_json(value_json)?;
        known.insert(value_key);

        for property in object.keys().filter(|k| !known.contains(*k)) {
            self.context
                .unknown(&format!("property '{}'", property), &name)?;
        }
        Ok(FieldItem::new(self.source.clone(), value, flags)?)
    }

    /// Write a field, omitting the key flag when `keyed`
    pub(crate) fn write_json_keyed(&self, item: &FieldItem, keyed: bool) -> Result<JsonValue> {
        let key_flag = if keyed {
            self.definition.json_key_flag_name()
        } else {
            None
        };
        if self.definition.flag_instances().len() == usize::from(key_flag.is_some()) {
            return self.adapter.write_json(item.value());
        }

        let mut skip: Vec<&str> = key_flag.into_iter().collect();
        let value_key = match self.definition.json_value_key() {
            Some(JsonValueKey::Flag(flag_name)) => {
                skip.push(flag_name);
                flag_text(
                    self.context,
                    &*self.definition,
                    item.flags(),
                    flag_name,
                    item.name(),
                )?
            }
            _ => self.static_value_key(),
        };

        let mut object = Map::new();
        write_json_flags(self.context, &*self.definition, item.flags(), &mut object, &skip)?;
        object.insert(value_key, self.adapter.write_json(item.value())?);
        Ok(JsonValue::Object(object))
    }

    /// Read an unwrapped field from the block content of its parent element
    pub(crate) fn read_xml_unwrapped(&self, parent: &XmlElement) -> Result<Option<Arc<FieldItem>>> {
        self.check_unwrapped()?;
        let namespace = self.namespace()?;
        let blocks: Vec<XmlNode> = parent
            .child_elements()
            .filter(|e| is_markup_block(e, namespace.as_deref()))
            .cloned()
            .map(XmlNode::Element)
            .collect();
        if blocks.is_empty() {
            return Ok(None);
        }
        let mut element = XmlElement::new(self.element_name()?);
        element.extend_nodes(blocks);
        self.read_xml(&element).map(Some)
    }

    /// Write an unwrapped field's content straight into its parent element
    pub(crate) fn write_xml_unwrapped(&self, item: &FieldItem, parent: &mut XmlElement) -> Result<()> {
        self.check_unwrapped()?;
        if !item.flags().is_empty() {
            return Err(Error::unsupported(format!(
                "unwrapped field '{}' cannot carry flags in XML",
                item.name()
            )));
        }
        let element = self.write_xml(item)?;
        parent.extend_nodes(element.into_children());
        Ok(())
    }

    fn check_unwrapped(&self) -> Result<()> {
        if self.adapter.is_xml_unwrapped_allowed() {
            Ok(())
        } else {
            Err(Error::unsupported(format!(
                "field '{}' of type '{}' cannot be unwrapped in XML",
                self.definition.name(),
                self.adapter.name()
            )))
        }
    }
}

impl ItemSerializer for FieldSerializer<'_> {
    type Item = FieldItem;

    fn read_xml(&self, element: &XmlElement) -> Result<Arc<FieldItem>> {
        let name = self.name()?;
        let flags = read_xml_flags(self.context, &*self.definition, element, &name)?;
        if !self.adapter.is_xml_mixed() {
            for child in element.child_elements() {
                self.context
                    .unknown(&format!("element '{}'", child.name()), &name)?;
            }
        }
        let value = self.adapter.read_xml(element)?;
        Ok(FieldItem::new(self.source.clone(), value, flags)?)
    }

    fn read_json(&self, value: &JsonValue) -> Result<Arc<FieldItem>> {
        self.read_json_keyed(value, None)
    }

    fn write_xml(&self, item: &FieldItem) -> Result<XmlElement> {
        let mut element = XmlElement::new(self.element_name()?);
        write_xml_flags(self.context, &*self.definition, item.flags(), &mut element)?;
        self.adapter.write_xml(item.value(), &mut element)?;
        Ok(element)
    }

    fn write_json(&self, item: &FieldItem) -> Result<JsonValue> {
        self.write_json_keyed(item, false)
    }
}

fn as_field<'i>(item: &'i ModelItem) -> Result<&'i Arc<FieldItem>> {
    item.as_field()
        .ok_or_else(|| Error::malformed(format!("'{}' is not a field item", item.name())))
}

impl MemberSerializer for FieldSerializer<'_> {
    const KIND: ItemKind = ItemKind::Field;

    fn read_xml_member(&self, element: &XmlElement) -> Result<ModelItem> {
        self.read_xml(element).map(ModelItem::from)
    }

    fn read_json_member(&self, json: &JsonValue, key: Option<&str>) -> Result<ModelItem> {
        self.read_json_keyed(json, key).map(ModelItem::from)
    }

    fn write_xml_member(&self, item: &ModelItem) -> Result<XmlElement> {
        self.write_xml(as_field(item)?)
    }

    fn write_json_member(&self, item: &ModelItem, keyed: bool) -> Result<JsonValue> {
        self.write_json_keyed(as_field(item)?, keyed)
    }

    fn json_key(&self, item: &ModelItem) -> Result<String> {
        let field = as_field(item)?;
        let key = self.definition.json_key_flag_name().ok_or_else(|| {
            Error::malformed(format!("field '{}' declares no json-key", field.name()))
        })?;
        flag_text(self.context, &*self.definition, field.flags(), key, field.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_ir::Value;
    use metaschema_model::{Metaschema, MetaschemaSource};
    use serde_json::json;

    const YAML: &str = r#"
namespace: urn:test
definitions:
  - define-flag:
      name: id
      as-type: token
  - define-flag:
      name: unit
  - define-field:
      name: vendor
  - define-field:
      name: speed
      as-type: integer
      flags:
        - ref: unit
  - define-field:
      name: label
      flags:
        - ref: id
          required: true
      json-key: id
  - define-field:
      name: prop
      flags:
        - ref: unit
      json-value-key-flag: unit
  - define-field:
      name: note
      json-value-key: text
      flags:
        - ref: unit
  - define-field:
      name: reading
      flags:
        - ref: id
          required: true
        - ref: unit
      json-key: id
      json-value-key-flag: unit
"#;

    fn context() -> BindingContext {
        let source = MetaschemaSource::from_yaml_str("fields.yaml", YAML).unwrap();
        BindingContext::new(Metaschema::from_source("fields.yaml", source, vec![]).unwrap())
    }

    fn serializer<'a>(context: &'a BindingContext, name: &str) -> FieldSerializer<'a> {
        let definition = context.metaschema().field_definition(name).unwrap();
        FieldSerializer::new(context, definition).unwrap()
    }

    #[test]
    fn test_simple_field_is_bare_scalar() {
        let context = context();
        let vendor = serializer(&context, "vendor");
        let item = vendor.read_json(&json!("Acme")).unwrap();
        assert_eq!(item.value(), &Value::from("Acme"));
        assert_eq!(vendor.write_json(&item).unwrap(), json!("Acme"));
        assert!(matches!(vendor.read_json(&json!(null)), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_flagged_field_uses_default_value_key() {
        let context = context();
        let speed = serializer(&context, "speed");
        let item = speed.read_json(&json!({"unit": "mhz", "STRVALUE": 800})).unwrap();
        assert_eq!(item.value(), &Value::Integer(800));
        assert_eq!(item.flag("unit").unwrap().value(), &Value::from("mhz"));
        assert_eq!(
            speed.write_json(&item).unwrap(),
            json!({"unit": "mhz", "STRVALUE": 800})
        );
    }

    #[test]
    fn test_static_value_key() {
        let context = context();
        let note = serializer(&context, "note");
        let item = note.read_json(&json!({"text": "hello"})).unwrap();
        assert_eq!(note.write_json(&item).unwrap(), json!({"text": "hello"}));
        assert!(matches!(
            note.read_json(&json!({"STRVALUE": "hello"})),
            Err(Error::MissingRequired { kind: ItemKind::Field, .. })
        ));
    }

    #[test]
    fn test_value_key_flag() {
        let context = context();
        let prop = serializer(&context, "prop");
        let item = prop.read_json(&json!({"ghz": "3.2"})).unwrap();
        assert_eq!(item.flag("unit").unwrap().value(), &Value::from("ghz"));
        assert_eq!(item.value(), &Value::from("3.2"));
        assert_eq!(prop.write_json(&item).unwrap(), json!({"ghz": "3.2"}));
        assert!(matches!(
            prop.read_json(&json!({"a": "1", "b": "2"})),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_keyed_member_collapses_to_scalar() {
        let context = context();
        let label = serializer(&context, "label");
        let item = label.read_json_keyed(&json!("Main board"), Some("mb")).unwrap();
        assert_eq!(item.flag("id").unwrap().value(), &Value::from("mb"));
        assert_eq!(label.write_json_keyed(&item, true).unwrap(), json!("Main board"));
        assert_eq!(
            label.write_json_keyed(&item, false).unwrap(),
            json!({"id": "mb", "STRVALUE": "Main board"})
        );
    }

    #[test]
    fn test_keyed_member_may_repeat_its_key() {
        let context = context();
        let reading = serializer(&context, "reading");

        let repeated = reading
            .read_json_keyed(&json!({"id": "r1", "volts": "5"}), Some("r1"))
            .unwrap();
        let plain = reading.read_json_keyed(&json!({"volts": "5"}), Some("r1")).unwrap();
        assert_eq!(repeated, plain);
        assert_eq!(repeated.flag("unit").unwrap().value(), &Value::from("volts"));
        assert_eq!(reading.write_json_keyed(&repeated, true).unwrap(), json!({"volts": "5"}));

        assert!(matches!(
            reading.read_json_keyed(&json!({"id": "r2", "volts": "5"}), Some("r1")),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_xml_round_trip() {
        let context = context();
        let speed = serializer(&context, "speed");
        let element =
            metaschema_xml::parse(r#"<speed xmlns="urn:test" unit="mhz">800</speed>"#).unwrap();
        let item = speed.read_xml(&element).unwrap();
        assert_eq!(item.value(), &Value::Integer(800));
        assert_eq!(speed.write_xml(&item).unwrap(), element);
    }
}
