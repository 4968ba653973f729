//! Flag items

use crate::link::{FlagSource, ParentItem, ParentLink};
use crate::value::Value;
use crate::Result;
use metaschema_model::{FlagDefinition, FlagInstance};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Flags of a field or assembly item, keyed by effective name
pub type FlagMap = BTreeMap<String, Arc<FlagItem>>;

/// An atomic value bound to a flag definition
pub struct FlagItem {
    definition: Arc<FlagDefinition>,
    instance: Option<Arc<FlagInstance>>,
    name: String,
    value: Value,
    pub(crate) parent: ParentLink,
}

impl FlagItem {
    pub fn new(source: impl Into<FlagSource>, value: Value) -> Result<Arc<Self>> {
        let binding = source.into().bind()?;
        Ok(Arc::new(Self {
            definition: binding.definition,
            instance: binding.instance,
            name: binding.name,
            value,
            parent: ParentLink::default(),
        }))
    }

    /// Effective name, the key of this item in its owner's flag map
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<FlagDefinition> {
        &self.definition
    }

    pub fn instance(&self) -> Option<&Arc<FlagInstance>> {
        self.instance.as_ref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The field or assembly owning this flag
    pub fn parent(&self) -> Result<ParentItem> {
        self.parent.get(&self.name)
    }
}

impl PartialEq for FlagItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl fmt::Debug for FlagItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagItem")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}
