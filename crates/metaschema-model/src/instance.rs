//! Usage-site references from a container to a definition

use crate::definition::{
    AssemblyDefinition, Definition, FieldDefinition, FlagDefinition, ModelContainer, Named,
};
use crate::metaschema::Metaschema;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Upper bound on occurrences of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MaxOccursRepr", into = "MaxOccursRepr")]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxOccursRepr {
    Count(u32),
    Keyword(String),
}

impl TryFrom<MaxOccursRepr> for MaxOccurs {
    type Error = String;

    fn try_from(repr: MaxOccursRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            MaxOccursRepr::Count(n) => Ok(Self::Bounded(n)),
            MaxOccursRepr::Keyword(s) => {
                Self::parse(&s).ok_or_else(|| format!("invalid max-occurs '{}'", s))
            }
        }
    }
}

impl From<MaxOccurs> for MaxOccursRepr {
    fn from(max: MaxOccurs) -> Self {
        match max {
            MaxOccurs::Bounded(n) => Self::Count(n),
            MaxOccurs::Unbounded => Self::Keyword("unbounded".to_string()),
        }
    }
}

impl MaxOccurs {
    /// Parse `unbounded` or a non-negative count
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "unbounded" => Some(Self::Unbounded),
            other => other.parse().ok().map(Self::Bounded),
        }
    }

    /// Convert from the signed form where `-1` denotes unbounded
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Unbounded),
            n => u32::try_from(n).ok().map(Self::Bounded),
        }
    }

    /// Signed form where `-1` denotes unbounded
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Unbounded => -1,
            Self::Bounded(n) => i32::try_from(n).unwrap_or(i32::MAX),
        }
    }

    /// Whether more than one occurrence is permitted
    pub fn allows_many(self) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(n) => n > 1,
        }
    }

    /// Whether `count` occurrences stay within this bound
    pub fn admits(self, count: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(n) => count <= n as usize,
        }
    }
}

impl Default for MaxOccurs {
    fn default() -> Self {
        Self::Bounded(1)
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Bounded(n) => write!(f, "{}", n),
        }
    }
}

/// Minimum and maximum occurrence of an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occurrence {
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
}

impl Occurrence {
    pub fn new(min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        Self {
            min_occurs,
            max_occurs,
        }
    }

    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }
}

/// JSON encoding of a multi-valued instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JsonGroupAs {
    /// Object keyed by each member's JSON key flag value
    #[serde(rename = "BY_KEY")]
    Keyed,
    /// Bare value for one member, array otherwise
    #[default]
    #[serde(rename = "SINGLETON_OR_ARRAY")]
    SingletonOrList,
    /// Always an array
    #[serde(rename = "ARRAY")]
    List,
    /// Always a single bare value
    #[serde(skip)]
    None,
}

impl JsonGroupAs {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BY_KEY" => Some(Self::Keyed),
            "SINGLETON_OR_ARRAY" => Some(Self::SingletonOrList),
            "ARRAY" => Some(Self::List),
            _ => None,
        }
    }
}

/// XML encoding of a multi-valued instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum XmlGroupAs {
    /// Members wrapped in one element named by the group
    Grouped,
    /// Members appear as repeated sibling elements
    #[default]
    Ungrouped,
}

impl XmlGroupAs {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GROUPED" => Some(Self::Grouped),
            "UNGROUPED" => Some(Self::Ungrouped),
            _ => None,
        }
    }
}

/// Grouping of a multi-valued instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GroupAs {
    pub name: String,
    #[serde(default)]
    pub in_json: JsonGroupAs,
    #[serde(default)]
    pub in_xml: XmlGroupAs,
}

impl GroupAs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_json: JsonGroupAs::default(),
            in_xml: XmlGroupAs::default(),
        }
    }
}

/// What an instance points at: a named global definition or an inline one
#[derive(Debug)]
pub enum Target<D> {
    Reference(String),
    Inline(Arc<D>),
}

impl<D: Definition> Target<D> {
    /// The referenced or inline-declared name
    pub fn name(&self) -> &str {
        match self {
            Self::Reference(name) => name,
            Self::Inline(definition) => definition.name(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    /// Resolve against the module that declared the instance
    pub(crate) fn resolve(&self, metaschema: &Weak<Metaschema>) -> Result<Arc<D>> {
        match self {
            Self::Inline(definition) => Ok(definition.clone()),
            Self::Reference(name) => {
                let metaschema = metaschema
                    .upgrade()
                    .ok_or_else(|| Error::Detached(name.clone()))?;
                metaschema
                    .definition::<D>(name)
                    .ok_or_else(|| Error::reference(D::KIND, name, metaschema.location()))
            }
        }
    }
}

/// A flag reference on a field or assembly definition
#[derive(Debug)]
pub struct FlagInstance {
    pub(crate) target: Target<FlagDefinition>,
    pub(crate) use_name: Option<String>,
    pub(crate) required: bool,
    pub(crate) metaschema: Weak<Metaschema>,
}

impl FlagInstance {
    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn target(&self) -> &Target<FlagDefinition> {
        &self.target
    }

    pub fn use_name(&self) -> Option<&str> {
        self.use_name.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn definition(&self) -> Result<Arc<FlagDefinition>> {
        self.target.resolve(&self.metaschema)
    }

    /// Instance use-name, else the definition's effective name
    pub fn effective_name(&self) -> Result<String> {
        match &self.use_name {
            Some(name) => Ok(name.clone()),
            None => Ok(self.definition()?.effective_name().to_string()),
        }
    }

    /// Attribute / property name; flags are always single-valued
    pub fn json_name(&self) -> Result<String> {
        self.effective_name()
    }
}

/// Behavior shared by field and assembly instances
pub trait NamedModelInstance: Send + Sync + fmt::Debug {
    type Definition: Definition;

    fn target(&self) -> &Target<Self::Definition>;

    /// Use-name declared on the instance itself
    fn instance_use_name(&self) -> Option<&str>;

    fn occurrence(&self) -> Occurrence;

    fn group_as(&self) -> Option<&GroupAs>;

    fn metaschema_handle(&self) -> &Weak<Metaschema>;

    fn name(&self) -> &str {
        self.target().name()
    }

    fn definition(&self) -> Result<Arc<Self::Definition>> {
        self.target().resolve(self.metaschema_handle())
    }

    /// Key of this instance's values in an assembly item's model
    fn effective_name(&self) -> Result<String> {
        match self.instance_use_name() {
            Some(name) => Ok(name.to_string()),
            None => Ok(self.definition()?.effective_name().to_string()),
        }
    }

    fn min_occurs(&self) -> u32 {
        self.occurrence().min_occurs
    }

    fn max_occurs(&self) -> MaxOccurs {
        self.occurrence().max_occurs
    }

    fn group_as_name(&self) -> Option<&str> {
        self.group_as().map(|g| g.name.as_str())
    }

    fn json_group_as(&self) -> JsonGroupAs {
        if !self.max_occurs().allows_many() {
            return JsonGroupAs::None;
        }
        self.group_as().map(|g| g.in_json).unwrap_or_default()
    }

    fn xml_group_as(&self) -> XmlGroupAs {
        self.group_as().map(|g| g.in_xml).unwrap_or_default()
    }

    /// Group name when many occurrences are allowed, else the effective name
    fn json_name(&self) -> Result<String> {
        if self.max_occurs().allows_many() {
            if let Some(name) = self.group_as_name() {
                return Ok(name.to_string());
            }
        }
        self.effective_name()
    }

    /// Namespace of elements produced by this instance
    fn xml_namespace(&self) -> Result<Option<String>> {
        let metaschema = self
            .metaschema_handle()
            .upgrade()
            .ok_or_else(|| Error::Detached(self.name().to_string()))?;
        Ok(metaschema.header().namespace.clone())
    }
}

/// A field reference in an assembly model
#[derive(Debug)]
pub struct FieldInstance {
    pub(crate) target: Target<FieldDefinition>,
    pub(crate) use_name: Option<String>,
    pub(crate) occurrence: Occurrence,
    pub(crate) group_as: Option<GroupAs>,
    pub(crate) in_xml_wrapped: bool,
    pub(crate) metaschema: Weak<Metaschema>,
}

impl FieldInstance {
    /// Unwrapped fields place their value content directly in the parent element
    pub fn is_in_xml_wrapped(&self) -> bool {
        self.in_xml_wrapped
    }
}

impl NamedModelInstance for FieldInstance {
    type Definition = FieldDefinition;

    fn target(&self) -> &Target<FieldDefinition> {
        &self.target
    }

    fn instance_use_name(&self) -> Option<&str> {
        self.use_name.as_deref()
    }

    fn occurrence(&self) -> Occurrence {
        self.occurrence
    }

    fn group_as(&self) -> Option<&GroupAs> {
        self.group_as.as_ref()
    }

    fn metaschema_handle(&self) -> &Weak<Metaschema> {
        &self.metaschema
    }
}

/// An assembly reference in an assembly model
#[derive(Debug)]
pub struct AssemblyInstance {
    pub(crate) target: Target<AssemblyDefinition>,
    pub(crate) use_name: Option<String>,
    pub(crate) occurrence: Occurrence,
    pub(crate) group_as: Option<GroupAs>,
    pub(crate) metaschema: Weak<Metaschema>,
}

impl NamedModelInstance for AssemblyInstance {
    type Definition = AssemblyDefinition;

    fn target(&self) -> &Target<AssemblyDefinition> {
        &self.target
    }

    fn instance_use_name(&self) -> Option<&str> {
        self.use_name.as_deref()
    }

    fn occurrence(&self) -> Occurrence {
        self.occurrence
    }

    fn group_as(&self) -> Option<&GroupAs> {
        self.group_as.as_ref()
    }

    fn metaschema_handle(&self) -> &Weak<Metaschema> {
        &self.metaschema
    }
}

/// Mutually exclusive alternatives in an assembly model.
///
/// At most one alternative may be present in a document. With `min_occurs`
/// of one or more, exactly one must be.
#[derive(Debug)]
pub struct ChoiceInstance {
    pub(crate) alternatives: Vec<ModelInstance>,
    pub(crate) min_occurs: u32,
}

impl ChoiceInstance {
    pub fn min_occurs(&self) -> u32 {
        self.min_occurs
    }

    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }
}

impl ModelContainer for ChoiceInstance {
    fn model_instances(&self) -> &[ModelInstance] {
        &self.alternatives
    }
}

/// One entry of an assembly model
#[derive(Debug, Clone)]
pub enum ModelInstance {
    Field(Arc<FieldInstance>),
    Assembly(Arc<AssemblyInstance>),
    Choice(Arc<ChoiceInstance>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_occurs_parse() {
        assert_eq!(MaxOccurs::parse("unbounded"), Some(MaxOccurs::Unbounded));
        assert_eq!(MaxOccurs::parse("3"), Some(MaxOccurs::Bounded(3)));
        assert_eq!(MaxOccurs::parse("-2"), None);
    }

    #[test]
    fn test_max_occurs_signed_form() {
        assert_eq!(MaxOccurs::from_i32(-1), Some(MaxOccurs::Unbounded));
        assert_eq!(MaxOccurs::from_i32(1), Some(MaxOccurs::Bounded(1)));
        assert_eq!(MaxOccurs::from_i32(-5), None);
        assert_eq!(MaxOccurs::Unbounded.as_i32(), -1);
        assert_eq!(MaxOccurs::Bounded(4).as_i32(), 4);
    }

    #[test]
    fn test_max_occurs_bounds() {
        assert!(!MaxOccurs::Bounded(1).allows_many());
        assert!(MaxOccurs::Bounded(2).allows_many());
        assert!(MaxOccurs::Unbounded.allows_many());
        assert!(MaxOccurs::Bounded(2).admits(2));
        assert!(!MaxOccurs::Bounded(2).admits(3));
        assert!(MaxOccurs::Unbounded.admits(10_000));
    }

    #[test]
    fn test_max_occurs_serde() {
        let max: MaxOccurs = serde_json::from_str("\"unbounded\"").unwrap();
        assert_eq!(max, MaxOccurs::Unbounded);
        let max: MaxOccurs = serde_json::from_str("5").unwrap();
        assert_eq!(max, MaxOccurs::Bounded(5));
        assert!(serde_json::from_str::<MaxOccurs>("\"many\"").is_err());
        assert_eq!(serde_json::to_string(&MaxOccurs::Unbounded).unwrap(), "\"unbounded\"");
    }

    #[test]
    fn test_group_as_keywords() {
        assert_eq!(JsonGroupAs::parse("BY_KEY"), Some(JsonGroupAs::Keyed));
        assert_eq!(JsonGroupAs::parse("ARRAY"), Some(JsonGroupAs::List));
        assert_eq!(XmlGroupAs::parse("GROUPED"), Some(XmlGroupAs::Grouped));
        let g: GroupAs = serde_json::from_str(r#"{"name": "ports", "in-json": "ARRAY"}"#).unwrap();
        assert_eq!(g.in_json, JsonGroupAs::List);
        assert_eq!(g.in_xml, XmlGroupAs::Ungrouped);
    }
}
