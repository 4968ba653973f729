//! Flag, field, and assembly definitions
//!
//! Definitions are built once when a module is loaded and shared read-only
//! through `Arc`. Each one keeps a weak handle to the module that declares it,
//! which is what instance references resolve against.

use crate::constraint::Constraint;
use crate::instance::{
    AssemblyInstance, ChoiceInstance, FieldInstance, FlagInstance, ModelInstance, NamedModelInstance,
};
use crate::metaschema::Metaschema;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Visibility of a definition outside its declaring module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleScope {
    /// Visible only within the declaring module
    #[serde(rename = "local")]
    Local,
    /// Visible to modules that import the declaring module
    #[default]
    #[serde(rename = "global")]
    Inherited,
}

/// Which kind of definition a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Flag,
    Field,
    Assembly,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "flag"),
            Self::Field => write!(f, "field"),
            Self::Assembly => write!(f, "assembly"),
        }
    }
}

/// Naming and documentation shared by every definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionInfo {
    pub name: String,
    pub use_name: Option<String>,
    pub formal_name: Option<String>,
    pub description: Option<String>,
    pub remarks: Option<String>,
    pub scope: ModuleScope,
    pub constraints: Vec<Constraint>,
}

impl DefinitionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Something with a declared name and an optional use-name override
pub trait Named {
    fn name(&self) -> &str;

    fn use_name(&self) -> Option<&str>;

    fn formal_name(&self) -> Option<&str>;

    fn description(&self) -> Option<&str>;

    /// The use-name if declared, else the declared name
    fn effective_name(&self) -> &str {
        self.use_name().unwrap_or_else(|| self.name())
    }
}

/// Common behavior of all definition kinds
pub trait Definition: Send + Sync + fmt::Debug {
    const KIND: DefinitionKind;

    fn info(&self) -> &DefinitionInfo;

    /// Weak handle to the declaring module
    fn metaschema_handle(&self) -> &Weak<Metaschema>;

    /// Whether this definition was declared at its point of use
    fn is_inline(&self) -> bool;

    /// Top-level definitions of this kind declared by a module, by name
    fn table(metaschema: &Metaschema) -> &BTreeMap<String, Arc<Self>>
    where
        Self: Sized;

    /// The module that declares this definition
    fn containing_metaschema(&self) -> Result<Arc<Metaschema>> {
        self.metaschema_handle()
            .upgrade()
            .ok_or_else(|| Error::Detached(self.info().name.clone()))
    }

    fn scope(&self) -> ModuleScope {
        self.info().scope
    }

    fn constraints(&self) -> &[Constraint] {
        &self.info().constraints
    }

    fn remarks(&self) -> Option<&str> {
        self.info().remarks.as_deref()
    }
}

impl<T: Definition + ?Sized> Named for T {
    fn name(&self) -> &str {
        &self.info().name
    }

    fn use_name(&self) -> Option<&str> {
        self.info().use_name.as_deref()
    }

    fn formal_name(&self) -> Option<&str> {
        self.info().formal_name.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.info().description.as_deref()
    }
}

/// Definitions holding an atomic value of a named datatype
pub trait Valued {
    /// Name of the datatype adapter, e.g. `string` or `markup-multiline`
    fn data_type(&self) -> &str;

    fn default_value(&self) -> Option<&str>;
}

/// Definitions that declare flag instances
pub trait FlagContainer {
    fn flag_instances(&self) -> &[Arc<FlagInstance>];

    /// Effective name of the flag whose value keys this item in a JSON map
    fn json_key_flag_name(&self) -> Option<&str>;

    /// Look up a flag instance by effective name
    fn flag_instance(&self, effective_name: &str) -> Result<Option<Arc<FlagInstance>>> {
        for flag in self.flag_instances() {
            if flag.effective_name()? == effective_name {
                return Ok(Some(flag.clone()));
            }
        }
        Ok(None)
    }

    fn json_key_flag_instance(&self) -> Result<Option<Arc<FlagInstance>>> {
        match self.json_key_flag_name() {
            Some(name) => self.flag_instance(name),
            None => Ok(None),
        }
    }

    /// A definition without flags serializes its value as a bare scalar
    fn is_simple(&self) -> bool {
        self.flag_instances().is_empty()
    }
}

/// Containers of field, assembly, and choice instances
pub trait ModelContainer {
    /// Model instances in declaration order
    fn model_instances(&self) -> &[ModelInstance];

    fn field_instances(&self) -> Vec<Arc<FieldInstance>> {
        self.model_instances()
            .iter()
            .filter_map(|m| match m {
                ModelInstance::Field(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    fn assembly_instances(&self) -> Vec<Arc<AssemblyInstance>> {
        self.model_instances()
            .iter()
            .filter_map(|m| match m {
                ModelInstance::Assembly(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    fn choice_instances(&self) -> Vec<Arc<ChoiceInstance>> {
        self.model_instances()
            .iter()
            .filter_map(|m| match m {
                ModelInstance::Choice(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// Look up a field instance by effective name, including choice members
    fn field_instance(&self, effective_name: &str) -> Result<Option<Arc<FieldInstance>>> {
        for model in self.model_instances() {
            match model {
                ModelInstance::Field(f) if f.effective_name()? == effective_name => {
                    return Ok(Some(f.clone()));
                }
                ModelInstance::Choice(c) => {
                    if let Some(f) = c.field_instance(effective_name)? {
                        return Ok(Some(f));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Look up an assembly instance by effective name, including choice members
    fn assembly_instance(&self, effective_name: &str) -> Result<Option<Arc<AssemblyInstance>>> {
        for model in self.model_instances() {
            match model {
                ModelInstance::Assembly(a) if a.effective_name()? == effective_name => {
                    return Ok(Some(a.clone()));
                }
                ModelInstance::Choice(c) => {
                    if let Some(a) = c.assembly_instance(effective_name)? {
                        return Ok(Some(a));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// A scalar definition, serialized as an XML attribute or JSON property
#[derive(Debug)]
pub struct FlagDefinition {
    pub(crate) info: DefinitionInfo,
    pub(crate) data_type: String,
    pub(crate) default_value: Option<String>,
    pub(crate) metaschema: Weak<Metaschema>,
    pub(crate) inline_host: Option<Weak<FlagInstance>>,
}

impl FlagDefinition {
    /// The instance declaring this definition inline, if any
    pub fn inline_instance(&self) -> Option<Arc<FlagInstance>> {
        self.inline_host.as_ref().and_then(Weak::upgrade)
    }
}

impl Definition for FlagDefinition {
    const KIND: DefinitionKind = DefinitionKind::Flag;

    fn info(&self) -> &DefinitionInfo {
        &self.info
    }

    fn metaschema_handle(&self) -> &Weak<Metaschema> {
        &self.metaschema
    }

    fn is_inline(&self) -> bool {
        self.inline_host.is_some()
    }

    fn table(metaschema: &Metaschema) -> &BTreeMap<String, Arc<Self>> {
        metaschema.flag_table()
    }
}

impl Valued for FlagDefinition {
    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// How a field with flags names the JSON property holding its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonValueKey {
    /// A fixed property name
    Name(String),
    /// The value of this flag (by effective name) names the property
    Flag(String),
}

/// A definition holding one value plus optional flags
#[derive(Debug)]
pub struct FieldDefinition {
    pub(crate) info: DefinitionInfo,
    pub(crate) data_type: String,
    pub(crate) default_value: Option<String>,
    pub(crate) flags: Vec<Arc<FlagInstance>>,
    pub(crate) json_key_flag: Option<String>,
    pub(crate) json_value_key: Option<JsonValueKey>,
    pub(crate) metaschema: Weak<Metaschema>,
    pub(crate) inline_host: Option<Weak<FieldInstance>>,
}

impl FieldDefinition {
    pub fn json_value_key(&self) -> Option<&JsonValueKey> {
        self.json_value_key.as_ref()
    }

    /// The flag instance supplying the value key, if configured
    pub fn json_value_key_flag_instance(&self) -> Result<Option<Arc<FlagInstance>>> {
        match &self.json_value_key {
            Some(JsonValueKey::Flag(name)) => self.flag_instance(name),
            _ => Ok(None),
        }
    }

    pub fn inline_instance(&self) -> Option<Arc<FieldInstance>> {
        self.inline_host.as_ref().and_then(Weak::upgrade)
    }
}

impl Definition for FieldDefinition {
    const KIND: DefinitionKind = DefinitionKind::Field;

    fn info(&self) -> &DefinitionInfo {
        &self.info
    }

    fn metaschema_handle(&self) -> &Weak<Metaschema> {
        &self.metaschema
    }

    fn is_inline(&self) -> bool {
        self.inline_host.is_some()
    }

    fn table(metaschema: &Metaschema) -> &BTreeMap<String, Arc<Self>> {
        metaschema.field_table()
    }
}

impl Valued for FieldDefinition {
    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

impl FlagContainer for FieldDefinition {
    fn flag_instances(&self) -> &[Arc<FlagInstance>] {
        &self.flags
    }

    fn json_key_flag_name(&self) -> Option<&str> {
        self.json_key_flag.as_deref()
    }
}

/// A structured definition containing a model of child instances
#[derive(Debug)]
pub struct AssemblyDefinition {
    pub(crate) info: DefinitionInfo,
    pub(crate) root_name: Option<String>,
    pub(crate) flags: Vec<Arc<FlagInstance>>,
    pub(crate) json_key_flag: Option<String>,
    pub(crate) model: Vec<ModelInstance>,
    pub(crate) metaschema: Weak<Metaschema>,
    pub(crate) inline_host: Option<Weak<AssemblyInstance>>,
}

impl AssemblyDefinition {
    /// Name of the top-level XML element / JSON key when used as a document root
    pub fn root_name(&self) -> Option<&str> {
        self.root_name.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.root_name.is_some()
    }

    pub fn inline_instance(&self) -> Option<Arc<AssemblyInstance>> {
        self.inline_host.as_ref().and_then(Weak::upgrade)
    }
}

impl Definition for AssemblyDefinition {
    const KIND: DefinitionKind = DefinitionKind::Assembly;

    fn info(&self) -> &DefinitionInfo {
        &self.info
    }

    fn metaschema_handle(&self) -> &Weak<Metaschema> {
        &self.metaschema
    }

    fn is_inline(&self) -> bool {
        self.inline_host.is_some()
    }

    fn table(metaschema: &Metaschema) -> &BTreeMap<String, Arc<Self>> {
        metaschema.assembly_table()
    }
}

impl FlagContainer for AssemblyDefinition {
    fn flag_instances(&self) -> &[Arc<FlagInstance>] {
        &self.flags
    }

    fn json_key_flag_name(&self) -> Option<&str> {
        self.json_key_flag.as_deref()
    }
}

impl ModelContainer for AssemblyDefinition {
    fn model_instances(&self) -> &[ModelInstance] {
        &self.model
    }
}

/// Any definition, for code that handles all kinds uniformly
#[derive(Debug, Clone)]
pub enum AnyDefinition {
    Flag(Arc<FlagDefinition>),
    Field(Arc<FieldDefinition>),
    Assembly(Arc<AssemblyDefinition>),
}

impl AnyDefinition {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Flag(_) => DefinitionKind::Flag,
            Self::Field(_) => DefinitionKind::Field,
            Self::Assembly(_) => DefinitionKind::Assembly,
        }
    }

    pub fn info(&self) -> &DefinitionInfo {
        match self {
            Self::Flag(d) => d.info(),
            Self::Field(d) => d.info(),
            Self::Assembly(d) => d.info(),
        }
    }

    pub fn effective_name(&self) -> &str {
        match self {
            Self::Flag(d) => d.effective_name(),
            Self::Field(d) => d.effective_name(),
            Self::Assembly(d) => d.effective_name(),
        }
    }

    /// Flag capability; `None` for flag definitions
    pub fn as_flag_container(&self) -> Option<&dyn FlagContainer> {
        match self {
            Self::Flag(_) => None,
            Self::Field(d) => Some(&**d),
            Self::Assembly(d) => Some(&**d),
        }
    }

    /// Model capability; only assemblies have one
    pub fn as_model_container(&self) -> Option<&dyn ModelContainer> {
        match self {
            Self::Assembly(d) => Some(&**d),
            _ => None,
        }
    }

    /// Value capability; assemblies have none
    pub fn as_valued(&self) -> Option<&dyn Valued> {
        match self {
            Self::Flag(d) => Some(&**d),
            Self::Field(d) => Some(&**d),
            Self::Assembly(_) => None,
        }
    }
}
