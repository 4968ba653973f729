//! Field items

use crate::flag::{FlagItem, FlagMap};
use crate::link::{FieldSource, ParentItem, ParentLink, ParentRef, ensure_unlinked};
use crate::value::Value;
use crate::Result;
use metaschema_model::{FieldDefinition, FieldInstance};
use std::fmt;
use std::sync::Arc;

/// A field value with its flags
pub struct FieldItem {
    definition: Arc<FieldDefinition>,
    instance: Option<Arc<FieldInstance>>,
    name: String,
    value: Value,
    flags: FlagMap,
    pub(crate) parent: ParentLink,
}

impl FieldItem {
    /// Build a field item and link each flag to it
    pub fn new(
        source: impl Into<FieldSource>,
        value: Value,
        flags: impl IntoIterator<Item = Arc<FlagItem>>,
    ) -> Result<Arc<Self>> {
        let binding = source.into().bind_model()?;
        let flags: FlagMap = flags
            .into_iter()
            .map(|flag| (flag.name().to_string(), flag))
            .collect();
        ensure_unlinked(flags.values().map(|f| (&f.parent, f.name())))?;

        let mut linked = Ok(());
        let item = Arc::new_cyclic(|this| {
            for flag in flags.values() {
                if let Err(e) = flag.parent.link(ParentRef::Field(this.clone()), flag.name()) {
                    linked = Err(e);
                }
            }
            Self {
                definition: binding.definition,
                instance: binding.instance,
                name: binding.name,
                value,
                flags,
                parent: ParentLink::default(),
            }
        });
        linked.map(|()| item)
    }

    /// Build a flagless field item
    pub fn simple(source: impl Into<FieldSource>, value: Value) -> Result<Arc<Self>> {
        Self::new(source, value, Vec::new())
    }

    /// Effective name, the key of this item in its owner's model
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<FieldDefinition> {
        &self.definition
    }

    pub fn instance(&self) -> Option<&Arc<FieldInstance>> {
        self.instance.as_ref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn flags(&self) -> &FlagMap {
        &self.flags
    }

    pub fn flag(&self, name: &str) -> Option<&Arc<FlagItem>> {
        self.flags.get(name)
    }

    /// The assembly owning this field
    pub fn parent(&self) -> Result<ParentItem> {
        self.parent.get(&self.name)
    }
}

impl PartialEq for FieldItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.flags == other.flags
    }
}

impl fmt::Debug for FieldItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldItem")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("flags", &self.flags)
            .finish()
    }
}
