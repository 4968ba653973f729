//! Cardinality and group-as handling shared by field and assembly instances

use crate::datatype::json_kind;
use crate::{Error, ItemKind, Result};
use metaschema_ir::{ModelItem, ModelValue};
use metaschema_model::{JsonGroupAs, NamedModelInstance, XmlGroupAs};
use metaschema_xml::{QName, XmlElement};
use serde_json::{Map, Value as JsonValue};

/// Per-member codec of a field or assembly serializer
pub(crate) trait MemberSerializer {
    const KIND: ItemKind;

    fn read_xml_member(&self, element: &XmlElement) -> Result<ModelItem>;

    /// `key` is the member's property name inside a keyed group
    fn read_json_member(&self, json: &JsonValue, key: Option<&str>) -> Result<ModelItem>;

    fn write_xml_member(&self, item: &ModelItem) -> Result<XmlElement>;

    /// `keyed` omits the key flag, which the enclosing object key carries
    fn write_json_member(&self, item: &ModelItem, keyed: bool) -> Result<JsonValue>;

    /// Value of the member's JSON key flag
    fn json_key(&self, item: &ModelItem) -> Result<String>;
}

/// Element name of a grouped collection's wrapper, if the instance uses one
pub(crate) fn xml_group_name<I: NamedModelInstance>(instance: &I) -> Option<&str> {
    match instance.xml_group_as() {
        XmlGroupAs::Grouped if instance.max_occurs().allows_many() => instance.group_as_name(),
        _ => None,
    }
}

/// Element name an instance's values are read from and written to
pub(crate) fn xml_name<I: NamedModelInstance>(instance: &I) -> Result<QName> {
    let namespace = instance.xml_namespace()?;
    let local = match xml_group_name(instance) {
        Some(group) => group.to_string(),
        None => instance.effective_name()?,
    };
    Ok(QName::new(namespace.as_deref(), local))
}

/// Check a member count against the instance's cardinality and pick the
/// in-memory shape.
///
/// `optional` waives the minimum for absent values, as for choice
/// alternatives.
pub(crate) fn shape<I: NamedModelInstance>(
    instance: &I,
    kind: ItemKind,
    items: Vec<ModelItem>,
    owner: &str,
    optional: bool,
) -> Result<Option<ModelValue>> {
    let name = instance.effective_name()?;
    let count = items.len();
    let min = instance.min_occurs() as usize;
    let max = instance.max_occurs();

    if count == 0 {
        return if min > 0 && !optional {
            Err(Error::missing(kind, name, owner))
        } else {
            Ok(None)
        };
    }
    if !max.admits(count) {
        return Err(Error::malformed(format!(
            "{} '{}' in '{}' occurs {} times, at most {} allowed",
            kind, name, owner, count, max
        )));
    }
    if count < min {
        return Err(Error::malformed(format!(
            "{} '{}' in '{}' occurs {} times, at least {} required",
            kind, name, owner, count, min
        )));
    }

    let single = !max.allows_many()
        || (count == 1 && instance.json_group_as() == JsonGroupAs::SingletonOrList);
    let mut items = items;
    if single && count == 1 {
        Ok(items.pop().map(ModelValue::Single))
    } else {
        Ok(Some(ModelValue::List(items)))
    }
}

/// Collect an instance's elements from a parent element
pub(crate) fn read_xml_instance<I, S>(
    instance: &I,
    serializer: &S,
    parent: &XmlElement,
    owner: &str,
    optional: bool,
) -> Result<Option<ModelValue>>
where
    I: NamedModelInstance,
    S: MemberSerializer,
{
    let namespace = instance.xml_namespace()?;
    let name = instance.effective_name()?;

    let container = match xml_group_name(instance) {
        Some(group) => {
            let mut wrappers = parent.elements_named(namespace.as_deref(), group);
            let first = wrappers.next();
            if first.is_some() && wrappers.next().is_some() {
                return Err(Error::malformed(format!(
                    "'{}' in '{}' is grouped under more than one '{}' element",
                    name, owner, group
                )));
            }
            first
        }
        None => Some(parent),
    };
    let items = match container {
        Some(container) => container
            .elements_named(namespace.as_deref(), &name)
            .map(|element| serializer.read_xml_member(element))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    shape(instance, S::KIND, items, owner, optional)
}

/// Decode an instance's property from a JSON object
pub(crate) fn read_json_instance<I, S>(
    instance: &I,
    serializer: &S,
    object: &Map<String, JsonValue>,
    owner: &str,
    optional: bool,
) -> Result<Option<ModelValue>>
where
    I: NamedModelInstance,
    S: MemberSerializer,
{
    let key = instance.json_name()?;
    let Some(json) = object.get(&key) else {
        return shape(instance, S::KIND, Vec::new(), owner, optional);
    };
    if json.is_null() {
        return Err(Error::malformed(format!(
            "property '{}' in '{}' is null",
            key, owner
        )));
    }

    let items = match (instance.json_group_as(), json) {
        (JsonGroupAs::Keyed, JsonValue::Object(members)) => members
            .iter()
            .map(|(member_key, member)| serializer.read_json_member(member, Some(member_key)))
            .collect::<Result<Vec<_>>>()?,
        (JsonGroupAs::Keyed, other) => {
            return Err(Error::malformed(format!(
                "property '{}' in '{}' must be an object keyed by member, found {}",
                key,
                owner,
                json_kind(other)
            )));
        }
        (JsonGroupAs::SingletonOrList | JsonGroupAs::List, JsonValue::Array(members)) => members
            .iter()
            .map(|member| serializer.read_json_member(member, None))
            .collect::<Result<Vec<_>>>()?,
        (JsonGroupAs::List, other) => {
            return Err(Error::malformed(format!(
                "property '{}' in '{}' must be an array, found {}",
                key,
                owner,
                json_kind(other)
            )));
        }
        (JsonGroupAs::None, JsonValue::Array(_)) => {
            return Err(Error::malformed(format!(
                "property '{}' in '{}' allows a single value, found an array",
                key, owner
            )));
        }
        (JsonGroupAs::SingletonOrList | JsonGroupAs::None, single) => {
            vec![serializer.read_json_member(single, None)?]
        }
    };
    shape(instance, S::KIND, items, owner, optional)
}

/// Append an instance's values to a parent element
pub(crate) fn write_xml_instance<I, S>(
    instance: &I,
    serializer: &S,
    value: &ModelValue,
    parent: &mut XmlElement,
) -> Result<()>
where
    I: NamedModelInstance,
    S: MemberSerializer,
{
    let elements = value
        .items()
        .iter()
        .map(|item| serializer.write_xml_member(item))
        .collect::<Result<Vec<_>>>()?;
    match xml_group_name(instance) {
        Some(_) => {
            let mut wrapper = XmlElement::new(xml_name(instance)?);
            for element in elements {
                wrapper.push_element(element);
            }
            parent.push_element(wrapper);
        }
        None => {
            for element in elements {
                parent.push_element(element);
            }
        }
    }
    Ok(())
}

/// Encode an instance's values as one property of a JSON object
pub(crate) fn write_json_instance<I, S>(
    instance: &I,
    serializer: &S,
    value: &ModelValue,
    object: &mut Map<String, JsonValue>,
    owner: &str,
) -> Result<()>
where
    I: NamedModelInstance,
    S: MemberSerializer,
{
    let key = instance.json_name()?;
    let items = value.items();
    if items.is_empty() {
        return Ok(());
    }

    let json = match instance.json_group_as() {
        JsonGroupAs::None => match items {
            [item] => serializer.write_json_member(item, false)?,
            _ => {
                return Err(Error::malformed(format!(
                    "'{}' in '{}' holds {} items but allows one",
                    key,
                    owner,
                    items.len()
                )));
            }
        },
        JsonGroupAs::SingletonOrList if items.len() == 1 => {
            serializer.write_json_member(&items[0], false)?
        }
        JsonGroupAs::SingletonOrList | JsonGroupAs::List => JsonValue::Array(
            items
                .iter()
                .map(|item| serializer.write_json_member(item, false))
                .collect::<Result<Vec<_>>>()?,
        ),
        JsonGroupAs::Keyed => {
            let mut members = Map::new();
            for item in items {
                let member_key = serializer.json_key(item)?;
                if members.contains_key(&member_key) {
                    return Err(Error::malformed(format!(
                        "duplicate key '{}' in '{}' of '{}'",
                        member_key, key, owner
                    )));
                }
                members.insert(member_key, serializer.write_json_member(item, true)?);
            }
            JsonValue::Object(members)
        }
    };
    object.insert(key, json);
    Ok(())
}
