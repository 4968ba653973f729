//! Flag serialization
//!
//! Flags are XML attributes and JSON properties. The loops over a
//! definition's declared flags live here and are shared by the field and
//! assembly serializers.

use crate::context::BindingContext;
use crate::datatype::{DataTypeAdapter, json_kind};
use crate::{Error, ItemKind, Result};
use metaschema_ir::{FlagItem, FlagMap, FlagSource, Source};
use metaschema_model::{FlagContainer, FlagDefinition, Named, Valued};
use metaschema_xml::{QName, XmlElement};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reads and writes the values of one flag
pub struct FlagSerializer<'a> {
    context: &'a BindingContext,
    source: FlagSource,
    definition: Arc<FlagDefinition>,
    adapter: Arc<dyn DataTypeAdapter>,
}

impl<'a> FlagSerializer<'a> {
    pub fn new(context: &'a BindingContext, source: impl Into<FlagSource>) -> Result<Self> {
        let source = source.into();
        let definition = match &source {
            Source::Definition(definition) => definition.clone(),
            Source::Instance(instance) => instance.definition()?,
        };
        let adapter = context.adapter(definition.data_type())?;
        if !adapter.is_atomic() {
            return Err(Error::unsupported(format!(
                "flag '{}' uses non-atomic datatype '{}'",
                definition.name(),
                adapter.name()
            )));
        }
        Ok(Self {
            context,
            source,
            definition,
            adapter,
        })
    }

    /// Attribute and property name of the flag
    pub fn name(&self) -> Result<String> {
        match &self.source {
            Source::Definition(definition) => Ok(definition.effective_name().to_string()),
            Source::Instance(instance) => Ok(instance.json_name()?),
        }
    }

    pub fn definition(&self) -> &Arc<FlagDefinition> {
        &self.definition
    }

    pub fn context(&self) -> &'a BindingContext {
        self.context
    }

    /// Decode an attribute value or JSON object key
    pub fn read_text(&self, text: &str) -> Result<Arc<FlagItem>> {
        let value = self.adapter.parse(text)?;
        Ok(FlagItem::new(self.source.clone(), value)?)
    }

    pub fn read_json(&self, json: &JsonValue) -> Result<Arc<FlagItem>> {
        if json.is_null() || json.is_array() || json.is_object() {
            return Err(Error::malformed(format!(
                "flag '{}' must be a scalar, found {}",
                self.definition.name(),
                json_kind(json)
            )));
        }
        let value = self.adapter.read_json(json)?;
        Ok(FlagItem::new(self.source.clone(), value)?)
    }

    pub fn write_text(&self, item: &FlagItem) -> Result<String> {
        self.adapter.format(item.value())
    }

    pub fn write_json(&self, item: &FlagItem) -> Result<JsonValue> {
        self.adapter.write_json(item.value())
    }
}

/// Read every declared flag from an element's attributes
pub(crate) fn read_xml_flags(
    context: &BindingContext,
    container: &dyn FlagContainer,
    element: &XmlElement,
    owner: &str,
) -> Result<Vec<Arc<FlagItem>>> {
    let mut flags = Vec::new();
    let mut declared = BTreeSet::new();
    for instance in container.flag_instances() {
        let serializer = FlagSerializer::new(context, instance.clone())?;
        let name = serializer.name()?;
        match element.attribute(&name) {
            Some(text) => flags.push(serializer.read_text(text)?),
            None if instance.is_required() => {
                return Err(Error::missing(ItemKind::Flag, name, owner));
            }
            None => {}
        }
        declared.insert(name);
    }

    for attribute in element.attributes() {
        if attribute.name.namespace.is_none() && !declared.contains(&attribute.name.local_name) {
            context.unknown(&format!("attribute '{}'", attribute.name), owner)?;
        }
    }
    Ok(flags)
}

/// Read declared flags from JSON properties.
///
/// Flags named in `skip` are supplied some other way (a parent's key or a
/// value-key property name) and are neither read nor required here. Returns
/// the flags read and the property names they consumed.
pub(crate) fn read_json_flags(
    context: &BindingContext,
    container: &dyn FlagContainer,
    object: &Map<String, JsonValue>,
    owner: &str,
    skip: &[&str],
) -> Result<(Vec<Arc<FlagItem>>, BTreeSet<String>)> {
    let mut flags = Vec::new();
    let mut consumed = BTreeSet::new();
    for instance in container.flag_instances() {
        let serializer = FlagSerializer::new(context, instance.clone())?;
        let name = serializer.name()?;
        if skip.contains(&name.as_str()) {
            continue;
        }
        match object.get(&name) {
            Some(json) => flags.push(serializer.read_json(json)?),
            None if instance.is_required() => {
                return Err(Error::missing(ItemKind::Flag, name, owner));
            }
            None => {}
        }
        consumed.insert(name);
    }
    Ok((flags, consumed))
}

/// Accept a keyed member's own copy of its key flag when it agrees with the
/// key it is filed under. Returns the property name the copy occupies.
pub(crate) fn repeated_key_flag(
    key_flag: &FlagSerializer<'_>,
    key: &str,
    object: &Map<String, JsonValue>,
    owner: &str,
) -> Result<Option<String>> {
    let name = key_flag.name()?;
    let Some(json) = object.get(&name) else {
        return Ok(None);
    };
    let repeated = key_flag.read_json(json)?;
    if repeated.value() != key_flag.read_text(key)?.value() {
        return Err(Error::malformed(format!(
            "'{}' is keyed as '{}' but its '{}' flag is '{}'",
            owner,
            key,
            name,
            key_flag.write_text(&repeated)?
        )));
    }
    Ok(Some(name))
}

/// Emit every present flag as an unqualified attribute
pub(crate) fn write_xml_flags(
    context: &BindingContext,
    container: &dyn FlagContainer,
    flags: &FlagMap,
    element: &mut XmlElement,
) -> Result<()> {
    for instance in container.flag_instances() {
        let serializer = FlagSerializer::new(context, instance.clone())?;
        let name = serializer.name()?;
        if let Some(item) = flags.get(&name) {
            element.set_attribute(QName::local(name), serializer.write_text(item)?);
        }
    }
    Ok(())
}

/// Emit every present flag not named in `skip` as a JSON property
pub(crate) fn write_json_flags(
    context: &BindingContext,
    container: &dyn FlagContainer,
    flags: &FlagMap,
    object: &mut Map<String, JsonValue>,
    skip: &[&str],
) -> Result<()> {
    for instance in container.flag_instances() {
        let serializer = FlagSerializer::new(context, instance.clone())?;
        let name = serializer.name()?;
        if skip.contains(&name.as_str()) {
            continue;
        }
        if let Some(item) = flags.get(&name) {
            object.insert(name, serializer.write_json(item)?);
        }
    }
    Ok(())
}

/// Text of a flag present on an item, for use as a JSON key
pub(crate) fn flag_text(
    context: &BindingContext,
    container: &dyn FlagContainer,
    flags: &FlagMap,
    flag_name: &str,
    owner: &str,
) -> Result<String> {
    let instance = container
        .flag_instance(flag_name)?
        .ok_or_else(|| Error::missing(ItemKind::Flag, flag_name, owner))?;
    let item = flags
        .get(flag_name)
        .ok_or_else(|| Error::missing(ItemKind::Flag, flag_name, owner))?;
    FlagSerializer::new(context, instance)?.write_text(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_ir::Value;
    use metaschema_model::{Metaschema, MetaschemaSource};
    use serde_json::json;

    const YAML: &str = r#"
definitions:
  - define-flag:
      name: id
      as-type: token
  - define-flag:
      name: size
      as-type: positive-integer
  - define-flag:
      name: notes
      as-type: markup-line
  - define-assembly:
      name: disk
      flags:
        - ref: id
          required: true
        - ref: size
"#;

    fn context() -> BindingContext {
        let source = MetaschemaSource::from_yaml_str("disk.yaml", YAML).unwrap();
        BindingContext::new(Metaschema::from_source("disk.yaml", source, vec![]).unwrap())
    }

    #[test]
    fn test_flag_text_round_trip() {
        let context = context();
        let id = context.metaschema().flag_definition("id").unwrap();
        let serializer = FlagSerializer::new(&context, id).unwrap();
        let item = serializer.read_text("sda").unwrap();
        assert_eq!(item.value(), &Value::from("sda"));
        assert_eq!(serializer.write_text(&item).unwrap(), "sda");
        assert!(serializer.read_text("not a token").is_err());
    }

    #[test]
    fn test_flag_json_rejects_null() {
        let context = context();
        let size = context.metaschema().flag_definition("size").unwrap();
        let serializer = FlagSerializer::new(&context, size).unwrap();
        assert_eq!(serializer.read_json(&json!(4)).unwrap().value(), &Value::Integer(4));
        assert!(matches!(
            serializer.read_json(&json!(null)),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_markup_flag_unsupported() {
        let context = context();
        let notes = context.metaschema().flag_definition("notes").unwrap();
        assert!(matches!(
            FlagSerializer::new(&context, notes),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_json_flags_required_and_optional() {
        let context = context();
        let disk = context.metaschema().assembly_definition("disk").unwrap();

        let object = json!({"id": "sda"});
        let (flags, consumed) =
            read_json_flags(&context, &*disk, object.as_object().unwrap(), "disk", &[]).unwrap();
        assert_eq!(flags.len(), 1);
        assert!(consumed.contains("id") && consumed.contains("size"));

        let object = json!({"size": 2});
        let err = read_json_flags(&context, &*disk, object.as_object().unwrap(), "disk", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequired { kind: ItemKind::Flag, ref name, .. } if name == "id"
        ));

        let (flags, _) =
            read_json_flags(&context, &*disk, object.as_object().unwrap(), "disk", &["id"])
                .unwrap();
        assert_eq!(flags[0].name(), "size");
    }

    #[test]
    fn test_xml_flags() {
        let context = context();
        let disk = context.metaschema().assembly_definition("disk").unwrap();
        let element = metaschema_xml::parse(r#"<disk id="sda" size="3"/>"#).unwrap();
        let flags = read_xml_flags(&context, &*disk, &element, "disk").unwrap();
        let map: FlagMap = flags
            .into_iter()
            .map(|f| (f.name().to_string(), f))
            .collect();

        let mut out = XmlElement::new(QName::local("disk"));
        write_xml_flags(&context, &*disk, &map, &mut out).unwrap();
        assert_eq!(out, element);

        let mut object = Map::new();
        write_json_flags(&context, &*disk, &map, &mut object, &["id"]).unwrap();
        assert_eq!(JsonValue::Object(object), json!({"size": 3}));
    }
}
