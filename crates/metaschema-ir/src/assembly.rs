//! Assembly items and their model

use crate::field::FieldItem;
use crate::flag::{FlagItem, FlagMap};
use crate::link::{AssemblySource, ParentItem, ParentLink, ParentRef, ensure_unlinked};
use crate::Result;
use metaschema_model::{AssemblyDefinition, AssemblyInstance};
use std::collections::BTreeMap;
use std::fmt;
use std::slice;
use std::sync::{Arc, Weak};

/// A child of an assembly
#[derive(Debug, Clone, PartialEq)]
pub enum ModelItem {
    Field(Arc<FieldItem>),
    Assembly(Arc<AssemblyItem>),
}

impl ModelItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => field.name(),
            Self::Assembly(assembly) => assembly.name(),
        }
    }

    pub fn as_field(&self) -> Option<&Arc<FieldItem>> {
        match self {
            Self::Field(field) => Some(field),
            Self::Assembly(_) => None,
        }
    }

    pub fn as_assembly(&self) -> Option<&Arc<AssemblyItem>> {
        match self {
            Self::Assembly(assembly) => Some(assembly),
            Self::Field(_) => None,
        }
    }

    pub fn parent(&self) -> Result<ParentItem> {
        match self {
            Self::Field(field) => field.parent(),
            Self::Assembly(assembly) => assembly.parent(),
        }
    }

    fn link(&self) -> &ParentLink {
        match self {
            Self::Field(field) => &field.parent,
            Self::Assembly(assembly) => &assembly.parent,
        }
    }
}

impl From<Arc<FieldItem>> for ModelItem {
    fn from(field: Arc<FieldItem>) -> Self {
        Self::Field(field)
    }
}

impl From<Arc<AssemblyItem>> for ModelItem {
    fn from(assembly: Arc<AssemblyItem>) -> Self {
        Self::Assembly(assembly)
    }
}

/// The values of one child instance: a single item or an ordered list
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValue {
    Single(ModelItem),
    List(Vec<ModelItem>),
}

impl ModelValue {
    /// Members in document order
    pub fn items(&self) -> &[ModelItem] {
        match self {
            Self::Single(item) => slice::from_ref(item),
            Self::List(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn first(&self) -> Option<&ModelItem> {
        self.items().first()
    }
}

/// Children of an assembly item, keyed by effective name
pub type ModelMap = BTreeMap<String, ModelValue>;

/// A structured item holding flags and a model of child items
pub struct AssemblyItem {
    definition: Arc<AssemblyDefinition>,
    instance: Option<Arc<AssemblyInstance>>,
    name: String,
    flags: FlagMap,
    model: ModelMap,
    pub(crate) parent: ParentLink,
}

impl AssemblyItem {
    /// Build an assembly item and link every flag and child to it
    pub fn new(
        source: impl Into<AssemblySource>,
        flags: impl IntoIterator<Item = Arc<FlagItem>>,
        model: ModelMap,
    ) -> Result<Arc<Self>> {
        let binding = source.into().bind_model()?;
        let flags: FlagMap = flags
            .into_iter()
            .map(|flag| (flag.name().to_string(), flag))
            .collect();
        ensure_unlinked(flags.values().map(|f| (&f.parent, f.name())))?;
        ensure_unlinked(
            model
                .values()
                .flat_map(ModelValue::items)
                .map(|m| (m.link(), m.name())),
        )?;

        let mut linked = Ok(());
        let item = Arc::new_cyclic(|this: &Weak<AssemblyItem>| {
            for flag in flags.values() {
                if let Err(e) = flag.parent.link(ParentRef::Assembly(this.clone()), flag.name()) {
                    linked = Err(e);
                }
            }
            for child in model.values().flat_map(ModelValue::items) {
                if let Err(e) = child.link().link(ParentRef::Assembly(this.clone()), child.name()) {
                    linked = Err(e);
                }
            }
            Self {
                definition: binding.definition,
                instance: binding.instance,
                name: binding.name,
                flags,
                model,
                parent: ParentLink::default(),
            }
        });
        linked.map(|()| item)
    }

    /// Effective name, the key of this item in its owner's model
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<AssemblyDefinition> {
        &self.definition
    }

    pub fn instance(&self) -> Option<&Arc<AssemblyInstance>> {
        self.instance.as_ref()
    }

    pub fn flags(&self) -> &FlagMap {
        &self.flags
    }

    pub fn flag(&self, name: &str) -> Option<&Arc<FlagItem>> {
        self.flags.get(name)
    }

    pub fn model(&self) -> &ModelMap {
        &self.model
    }

    /// Values of the child instance with this effective name
    pub fn child(&self, name: &str) -> Option<&ModelValue> {
        self.model.get(name)
    }

    /// All children in key order, lists flattened
    pub fn children(&self) -> impl Iterator<Item = &ModelItem> {
        self.model.values().flat_map(ModelValue::items)
    }

    /// The assembly or document owning this assembly
    pub fn parent(&self) -> Result<ParentItem> {
        self.parent.get(&self.name)
    }
}

impl PartialEq for AssemblyItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.flags == other.flags && self.model == other.model
    }
}

impl fmt::Debug for AssemblyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyItem")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("model", &self.model)
            .finish()
    }
}
