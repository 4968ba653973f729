//! Assembly serialization
//!
//! An assembly reads its flags through the shared flag loops, then each
//! declared model instance in order. Children land in the item's model map
//! under their effective names, whatever group-as encoding the document used.

use crate::context::BindingContext;
use crate::datatype::json_kind;
use crate::field::{FieldSerializer, is_markup_block};
use crate::flag::{
    FlagSerializer, flag_text, read_json_flags, read_xml_flags, repeated_key_flag,
    write_json_flags, write_xml_flags,
};
use crate::model::{
    MemberSerializer, read_json_instance, read_xml_instance, shape, write_json_instance,
    write_xml_instance, xml_name,
};
use crate::{Error, ItemKind, ItemSerializer, Result};
use metaschema_ir::{AssemblyItem, AssemblySource, ModelItem, ModelMap, ModelValue, Source};
use metaschema_model::{
    AssemblyDefinition, ChoiceInstance, Definition, FlagContainer, ModelContainer, ModelInstance,
    Named, NamedModelInstance,
};
use metaschema_xml::{QName, XmlElement};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::sync::Arc;

type Entry = Option<(String, ModelValue)>;

/// Field and assembly instances of a model, with choice alternatives inlined
fn named_instances(definition: &AssemblyDefinition) -> Vec<ModelInstance> {
    let mut instances = Vec::new();
    for instance in definition.model_instances() {
        match instance {
            ModelInstance::Choice(choice) => instances.extend(choice.model_instances().iter().cloned()),
            other => instances.push(other.clone()),
        }
    }
    instances
}

fn effective_name(instance: &ModelInstance) -> Result<String> {
    match instance {
        ModelInstance::Field(field) => Ok(field.effective_name()?),
        ModelInstance::Assembly(assembly) => Ok(assembly.effective_name()?),
        ModelInstance::Choice(_) => Err(nested_choice()),
    }
}

fn nested_choice() -> Error {
    Error::unsupported("a choice cannot directly contain another choice")
}

fn choice_label(choice: &ChoiceInstance) -> Result<String> {
    let names = choice
        .model_instances()
        .iter()
        .map(effective_name)
        .collect::<Result<Vec<_>>>()?;
    Ok(names.join(" | "))
}

/// Reads and writes the items of one assembly definition or instance
pub struct AssemblySerializer<'a> {
    context: &'a BindingContext,
    source: AssemblySource,
    definition: Arc<AssemblyDefinition>,
}

impl<'a> AssemblySerializer<'a> {
    pub fn new(context: &'a BindingContext, source: impl Into<AssemblySource>) -> Result<Self> {
        let source = source.into();
        let definition = match &source {
            Source::Definition(definition) => definition.clone(),
            Source::Instance(instance) => instance.definition()?,
        };
        Ok(Self {
            context,
            source,
            definition,
        })
    }

    /// Effective name of the assembly at its usage site
    pub fn name(&self) -> Result<String> {
        match &self.source {
            Source::Definition(definition) => Ok(definition.effective_name().to_string()),
            Source::Instance(instance) => Ok(instance.effective_name()?),
        }
    }

    pub fn definition(&self) -> &Arc<AssemblyDefinition> {
        &self.definition
    }

    /// Element name: the instance's name in its namespace, or for a bare
    /// definition its root name in the defining module's namespace
    pub fn element_name(&self) -> Result<QName> {
        match &self.source {
            Source::Instance(instance) => Ok(QName::new(
                instance.xml_namespace()?.as_deref(),
                instance.effective_name()?,
            )),
            Source::Definition(definition) => {
                let metaschema = definition.containing_metaschema()?;
                let local = definition
                    .root_name()
                    .unwrap_or_else(|| definition.effective_name());
                Ok(QName::new(metaschema.header().namespace.as_deref(), local))
            }
        }
    }

    /// Decode every declared model instance, enforcing choice exclusivity
    fn read_model(
        &self,
        owner: &str,
        mut read: impl FnMut(&ModelInstance, bool) -> Result<Entry>,
    ) -> Result<ModelMap> {
        let mut model = ModelMap::new();
        for instance in self.definition.model_instances() {
            let entry = match instance {
                ModelInstance::Choice(choice) => self.read_choice(choice, owner, &mut read)?,
                other => read(other, false)?,
            };
            if let Some((name, value)) = entry {
                model.insert(name, value);
            }
        }
        Ok(model)
    }

    fn read_choice(
        &self,
        choice: &ChoiceInstance,
        owner: &str,
        read: &mut impl FnMut(&ModelInstance, bool) -> Result<Entry>,
    ) -> Result<Entry> {
        let mut present = Vec::new();
        for alternative in choice.model_instances() {
            if let ModelInstance::Choice(_) = alternative {
                return Err(nested_choice());
            }
            if let Some(entry) = read(alternative, true)? {
                present.push(entry);
            }
        }
        match present.len() {
            0 if choice.is_required() => {
                Err(Error::missing(ItemKind::Choice, choice_label(choice)?, owner))
            }
            0 | 1 => Ok(present.pop()),
            _ => {
                let names: Vec<&str> = present.iter().map(|(name, _)| name.as_str()).collect();
                Err(Error::malformed(format!(
                    "'{}' holds more than one alternative of a choice: {}",
                    owner,
                    names.join(", ")
                )))
            }
        }
    }

    fn read_xml_entry(
        &self,
        instance: &ModelInstance,
        element: &XmlElement,
        owner: &str,
        optional: bool,
    ) -> Result<Entry> {
        let value = match instance {
            ModelInstance::Field(field) => {
                let serializer = FieldSerializer::new(self.context, field.clone())?;
                if serializer.is_unwrapped() {
                    let items = serializer
                        .read_xml_unwrapped(element)?
                        .map(ModelItem::from)
                        .into_iter()
                        .collect();
                    shape(&**field, ItemKind::Field, items, owner, optional)?
                } else {
                    read_xml_instance(&**field, &serializer, element, owner, optional)?
                }
            }
            ModelInstance::Assembly(assembly) => {
                let serializer = AssemblySerializer::new(self.context, assembly.clone())?;
                read_xml_instance(&**assembly, &serializer, element, owner, optional)?
            }
            ModelInstance::Choice(_) => return Err(nested_choice()),
        };
        Ok(match value {
            Some(value) => Some((effective_name(instance)?, value)),
            None => None,
        })
    }

    fn read_json_entry(
        &self,
        instance: &ModelInstance,
        object: &Map<String, JsonValue>,
        owner: &str,
        optional: bool,
    ) -> Result<Entry> {
        let value = match instance {
            ModelInstance::Field(field) => {
                let serializer = FieldSerializer::new(self.context, field.clone())?;
                read_json_instance(&**field, &serializer, object, owner, optional)?
            }
            ModelInstance::Assembly(assembly) => {
                let serializer = AssemblySerializer::new(self.context, assembly.clone())?;
                read_json_instance(&**assembly, &serializer, object, owner, optional)?
            }
            ModelInstance::Choice(_) => return Err(nested_choice()),
        };
        Ok(match value {
            Some(value) => Some((effective_name(instance)?, value)),
            None => None,
        })
    }

    /// Report child elements and text that no instance accounts for
    fn check_xml_children(&self, element: &XmlElement, owner: &str) -> Result<()> {
        let mut expected = BTreeSet::new();
        let mut block_namespace = None;
        for instance in named_instances(&self.definition) {
            match &instance {
                ModelInstance::Field(field) if !field.is_in_xml_wrapped() => {
                    block_namespace = Some(field.xml_namespace()?);
                }
                ModelInstance::Field(field) => {
                    expected.insert(xml_name(&**field)?);
                }
                ModelInstance::Assembly(assembly) => {
                    expected.insert(xml_name(&**assembly)?);
                }
                ModelInstance::Choice(_) => return Err(nested_choice()),
            }
        }

        for child in element.child_elements() {
            let claimed = expected.contains(child.name())
                || block_namespace
                    .as_ref()
                    .is_some_and(|ns| is_markup_block(child, ns.as_deref()));
            if !claimed {
                self.context
                    .unknown(&format!("element '{}'", child.name()), owner)?;
            }
        }
        if !element.text().trim().is_empty() {
            self.context.unknown("text content", owner)?;
        }
        Ok(())
    }

    /// Read an assembly, taking the key flag's value from `key` when the
    /// assembly is a member of a keyed group
    pub(crate) fn read_json_keyed(
        &self,
        json: &JsonValue,
        key: Option<&str>,
    ) -> Result<Arc<AssemblyItem>> {
        let name = self.name()?;
        let object = json.as_object().ok_or_else(|| {
            Error::malformed(format!(
                "assembly '{}' must be an object, found {}",
                name,
                json_kind(json)
            ))
        })?;

        let mut flags = Vec::new();
        let mut skip = Vec::new();
        let mut repeated_key = None;
        if let Some(key) = key {
            let instance = self.definition.json_key_flag_instance()?.ok_or_else(|| {
                Error::malformed(format!("assembly '{}' is keyed but declares no json-key", name))
            })?;
            let serializer = FlagSerializer::new(self.context, instance)?;
            repeated_key = repeated_key_flag(&serializer, key, object, &name)?;
            skip.push(serializer.name()?);
            flags.push(serializer.read_text(key)?);
        }
        let skip: Vec<&str> = skip.iter().map(String::as_str).collect();
        let (read, mut known) =
            read_json_flags(self.context, &*self.definition, object, &name, &skip)?;
        flags.extend(read);
        known.extend(repeated_key);

        let model = self.read_model(&name, |instance, optional| {
            self.read_json_entry(instance, object, &name, optional)
        })?;

        for instance in named_instances(&self.definition) {
            match &instance {
                ModelInstance::Field(field) => known.insert(field.json_name()?),
                ModelInstance::Assembly(assembly) => known.insert(assembly.json_name()?),
                ModelInstance::Choice(_) => return Err(nested_choice()),
            };
        }
        for property in object.keys().filter(|k| !known.contains(*k)) {
            self.context
                .unknown(&format!("property '{}'", property), &name)?;
        }
        Ok(AssemblyItem::new(self.source.clone(), flags, model)?)
    }

    /// Visit each declared child present on the item, in declaration order
    fn write_model(
        &self,
        item: &AssemblyItem,
        mut write: impl FnMut(&ModelInstance, &ModelValue) -> Result<()>,
    ) -> Result<()> {
        let mut written = BTreeSet::new();
        for instance in self.definition.model_instances() {
            let alternatives = match instance {
                ModelInstance::Choice(choice) => choice.model_instances(),
                other => std::slice::from_ref(other),
            };
            let mut present = 0;
            for alternative in alternatives {
                let name = effective_name(alternative)?;
                if let Some(value) = item.child(&name) {
                    present += 1;
                    write(alternative, value)?;
                    written.insert(name);
                }
            }
            if present > 1 {
                return Err(Error::malformed(format!(
                    "'{}' holds more than one alternative of a choice",
                    item.name()
                )));
            }
        }
        if let Some(undeclared) = item.model().keys().find(|k| !written.contains(*k)) {
            return Err(Error::malformed(format!(
                "'{}' holds undeclared child '{}'",
                item.name(),
                undeclared
            )));
        }
        Ok(())
    }

    /// Write an assembly, omitting the key flag when `keyed`
    pub(crate) fn write_json_keyed(&self, item: &AssemblyItem, keyed: bool) -> Result<JsonValue> {
        let skip: Vec<&str> = if keyed {
            self.definition.json_key_flag_name().into_iter().collect()
        } else {
            Vec::new()
        };
        let mut object = Map::new();
        write_json_flags(self.context, &*self.definition, item.flags(), &mut object, &skip)?;
        self.write_model(item, |instance, value| match instance {
            ModelInstance::Field(field) => {
                let serializer = FieldSerializer::new(self.context, field.clone())?;
                write_json_instance(&**field, &serializer, value, &mut object, item.name())
            }
            ModelInstance::Assembly(assembly) => {
                let serializer = AssemblySerializer::new(self.context, assembly.clone())?;
                write_json_instance(&**assembly, &serializer, value, &mut object, item.name())
            }
            ModelInstance::Choice(_) => Err(nested_choice()),
        })?;
        Ok(JsonValue::Object(object))
    }
}

impl ItemSerializer for AssemblySerializer<'_> {
    type Item = AssemblyItem;

    fn read_xml(&self, element: &XmlElement) -> Result<Arc<AssemblyItem>> {
        let name = self.name()?;
        let flags = read_xml_flags(self.context, &*self.definition, element, &name)?;
        let model = self.read_model(&name, |instance, optional| {
            self.read_xml_entry(instance, element, &name, optional)
        })?;
        self.check_xml_children(element, &name)?;
        Ok(AssemblyItem::new(self.source.clone(), flags, model)?)
    }

    fn read_json(&self, value: &JsonValue) -> Result<Arc<AssemblyItem>> {
        self.read_json_keyed(value, None)
    }

    fn write_xml(&self, item: &AssemblyItem) -> Result<XmlElement> {
        let mut element = XmlElement::new(self.element_name()?);
        write_xml_flags(self.context, &*self.definition, item.flags(), &mut element)?;
        self.write_model(item, |instance, value| match instance {
            ModelInstance::Field(field) => {
                let serializer = FieldSerializer::new(self.context, field.clone())?;
                if serializer.is_unwrapped() {
                    for member in value.items() {
                        let field_item = member.as_field().ok_or_else(|| {
                            Error::malformed(format!("'{}' is not a field item", member.name()))
                        })?;
                        serializer.write_xml_unwrapped(field_item, &mut element)?;
                    }
                    Ok(())
                } else {
                    write_xml_instance(&**field, &serializer, value, &mut element)
                }
            }
            ModelInstance::Assembly(assembly) => {
                let serializer = AssemblySerializer::new(self.context, assembly.clone())?;
                write_xml_instance(&**assembly, &serializer, value, &mut element)
            }
            ModelInstance::Choice(_) => Err(nested_choice()),
        })?;
        Ok(element)
    }

    fn write_json(&self, item: &AssemblyItem) -> Result<JsonValue> {
        self.write_json_keyed(item, false)
    }
}

fn as_assembly<'i>(item: &'i ModelItem) -> Result<&'i Arc<AssemblyItem>> {
    item.as_assembly()
        .ok_or_else(|| Error::malformed(format!("'{}' is not an assembly item", item.name())))
}

impl MemberSerializer for AssemblySerializer<'_> {
    const KIND: ItemKind = ItemKind::Assembly;

    fn read_xml_member(&self, element: &XmlElement) -> Result<ModelItem> {
        self.read_xml(element).map(ModelItem::from)
    }

    fn read_json_member(&self, json: &JsonValue, key: Option<&str>) -> Result<ModelItem> {
        self.read_json_keyed(json, key).map(ModelItem::from)
    }

    fn write_xml_member(&self, item: &ModelItem) -> Result<XmlElement> {
        self.write_xml(as_assembly(item)?)
    }

    fn write_json_member(&self, item: &ModelItem, keyed: bool) -> Result<JsonValue> {
        self.write_json_keyed(as_assembly(item)?, keyed)
    }

    fn json_key(&self, item: &ModelItem) -> Result<String> {
        let assembly = as_assembly(item)?;
        let key = self.definition.json_key_flag_name().ok_or_else(|| {
            Error::malformed(format!("assembly '{}' declares no json-key", assembly.name()))
        })?;
        flag_text(self.context, &*self.definition, assembly.flags(), key, assembly.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerializerConfig;
    use metaschema_ir::Value;
    use metaschema_model::{Metaschema, MetaschemaSource};
    use serde_json::json;

    const YAML: &str = r#"
namespace: urn:test
definitions:
  - define-flag:
      name: id
      as-type: token
  - define-field:
      name: cpu
  - define-field:
      name: gpu
  - define-assembly:
      name: slot
      flags:
        - ref: id
          required: true
      json-key: id
  - define-assembly:
      name: board
      root-name: board
      model:
        - choice:
            alternatives:
              - field:
                  ref: cpu
              - field:
                  ref: gpu
        - assembly:
            ref: slot
            max-occurs: unbounded
            group-as:
              name: slots
              in-json: BY_KEY
              in-xml: GROUPED
"#;

    fn context() -> BindingContext {
        let source = MetaschemaSource::from_yaml_str("board.yaml", YAML).unwrap();
        BindingContext::new(Metaschema::from_source("board.yaml", source, vec![]).unwrap())
    }

    fn board(context: &BindingContext) -> AssemblySerializer<'_> {
        let definition = context.metaschema().assembly_definition("board").unwrap();
        AssemblySerializer::new(context, definition).unwrap()
    }

    #[test]
    fn test_keyed_group_json() {
        let context = context();
        let json = json!({"cpu": "x86", "slots": {"a": {}, "b": {}}});
        let item = board(&context).read_json(&json).unwrap();

        let slots = item.child("slot").unwrap();
        assert_eq!(slots.len(), 2);
        let first = slots.items()[0].as_assembly().unwrap();
        assert_eq!(first.flag("id").unwrap().value(), &Value::from("a"));
        assert_eq!(board(&context).write_json(&item).unwrap(), json);
    }

    #[test]
    fn test_grouped_xml() {
        let context = context();
        let xml = r#"<board xmlns="urn:test"><cpu>x86</cpu><slots><slot id="a"/><slot id="b"/></slots></board>"#;
        let element = metaschema_xml::parse(xml).unwrap();
        let item = board(&context).read_xml(&element).unwrap();
        assert_eq!(item.child("slot").unwrap().len(), 2);
        assert_eq!(board(&context).write_xml(&item).unwrap(), element);
    }

    #[test]
    fn test_choice_exclusive() {
        let context = context();
        let err = board(&context)
            .read_json(&json!({"cpu": "x86", "gpu": "rtx"}))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));

        let err = board(&context).read_json(&json!({})).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequired { kind: ItemKind::Choice, ref name, .. } if name == "cpu | gpu"
        ));

        let item = board(&context).read_json(&json!({"gpu": "rtx"})).unwrap();
        assert!(item.child("cpu").is_none());
        assert_eq!(
            board(&context).write_json(&item).unwrap(),
            json!({"gpu": "rtx"})
        );
    }

    #[test]
    fn test_unknown_property_policy() {
        let json = json!({"cpu": "x86", "fan": "big"});
        let lenient = context();
        assert!(board(&lenient).read_json(&json).is_ok());

        let strict = context().with_config(SerializerConfig::new().strict());
        let err = board(&strict).read_json(&json).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(ref m) if m.contains("fan")));
    }

    #[test]
    fn test_element_name_uses_root_name() {
        let context = context();
        let name = board(&context).element_name().unwrap();
        assert_eq!(name, QName::new(Some("urn:test"), "board"));
    }
}
