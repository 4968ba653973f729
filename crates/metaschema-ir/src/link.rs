//! How items bind to the schema graph and to their parents

use crate::assembly::AssemblyItem;
use crate::document::DocumentItem;
use crate::field::FieldItem;
use crate::{Error, Result};
use metaschema_model::{
    AssemblyDefinition, AssemblyInstance, FieldDefinition, FieldInstance, FlagDefinition,
    FlagInstance, Named, NamedModelInstance,
};
use std::sync::{Arc, OnceLock, Weak};

/// What an item is built from: a bare definition, or the instance through
/// which the definition is used
#[derive(Debug)]
pub enum Source<D, I> {
    Definition(Arc<D>),
    Instance(Arc<I>),
}

// clones the handle, not the definition or instance
impl<D, I> Clone for Source<D, I> {
    fn clone(&self) -> Self {
        match self {
            Self::Definition(definition) => Self::Definition(definition.clone()),
            Self::Instance(instance) => Self::Instance(instance.clone()),
        }
    }
}

pub type FlagSource = Source<FlagDefinition, FlagInstance>;
pub type FieldSource = Source<FieldDefinition, FieldInstance>;
pub type AssemblySource = Source<AssemblyDefinition, AssemblyInstance>;

/// A resolved binding: the definition, the instance if any, and the name
/// the item is keyed by in its parent
pub(crate) struct Binding<D, I> {
    pub(crate) definition: Arc<D>,
    pub(crate) instance: Option<Arc<I>>,
    pub(crate) name: String,
}

impl FlagSource {
    pub(crate) fn bind(self) -> Result<Binding<FlagDefinition, FlagInstance>> {
        Ok(match self {
            Self::Definition(definition) => Binding {
                name: definition.effective_name().to_string(),
                definition,
                instance: None,
            },
            Self::Instance(instance) => Binding {
                definition: instance.definition()?,
                name: instance.effective_name()?,
                instance: Some(instance),
            },
        })
    }
}

impl<D, I> Source<D, I>
where
    D: Named,
    I: NamedModelInstance<Definition = D>,
{
    pub(crate) fn bind_model(self) -> Result<Binding<D, I>> {
        Ok(match self {
            Self::Definition(definition) => Binding {
                name: definition.effective_name().to_string(),
                definition,
                instance: None,
            },
            Self::Instance(instance) => Binding {
                definition: instance.definition()?,
                name: instance.effective_name()?,
                instance: Some(instance),
            },
        })
    }
}

macro_rules! source_from {
    ($alias:ident, $definition:ty, $instance:ty) => {
        impl From<Arc<$definition>> for $alias {
            fn from(definition: Arc<$definition>) -> Self {
                Source::Definition(definition)
            }
        }

        impl From<Arc<$instance>> for $alias {
            fn from(instance: Arc<$instance>) -> Self {
                Source::Instance(instance)
            }
        }
    };
}

source_from!(FlagSource, FlagDefinition, FlagInstance);
source_from!(FieldSource, FieldDefinition, FieldInstance);
source_from!(AssemblySource, AssemblyDefinition, AssemblyInstance);

/// Non-owning handle to the item that owns this one
#[derive(Debug, Clone)]
pub(crate) enum ParentRef {
    Field(Weak<FieldItem>),
    Assembly(Weak<AssemblyItem>),
    Document(Weak<DocumentItem>),
}

/// The owner of an item
#[derive(Debug, Clone)]
pub enum ParentItem {
    Field(Arc<FieldItem>),
    Assembly(Arc<AssemblyItem>),
    Document(Arc<DocumentItem>),
}

impl ParentItem {
    /// The owner's own parent; `None` at the document
    pub fn parent(&self) -> Result<Option<ParentItem>> {
        match self {
            Self::Field(field) => field.parent().map(Some),
            Self::Assembly(assembly) => assembly.parent().map(Some),
            Self::Document(_) => Ok(None),
        }
    }

    pub fn as_assembly(&self) -> Option<&Arc<AssemblyItem>> {
        match self {
            Self::Assembly(assembly) => Some(assembly),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Arc<DocumentItem>> {
        match self {
            Self::Document(document) => Some(document),
            _ => None,
        }
    }
}

/// Set-once parent slot
#[derive(Debug, Default)]
pub(crate) struct ParentLink(OnceLock<ParentRef>);

impl ParentLink {
    pub(crate) fn is_linked(&self) -> bool {
        self.0.get().is_some()
    }

    pub(crate) fn link(&self, parent: ParentRef, item: &str) -> Result<()> {
        self.0.set(parent).map_err(|_| Error::AlreadyLinked {
            item: item.to_string(),
        })
    }

    pub(crate) fn get(&self, item: &str) -> Result<ParentItem> {
        let parent = self.0.get().ok_or_else(|| Error::UnregisteredParent {
            item: item.to_string(),
        })?;
        let upgraded = match parent {
            ParentRef::Field(weak) => weak.upgrade().map(ParentItem::Field),
            ParentRef::Assembly(weak) => weak.upgrade().map(ParentItem::Assembly),
            ParentRef::Document(weak) => weak.upgrade().map(ParentItem::Document),
        };
        upgraded.ok_or_else(|| Error::ParentDropped {
            item: item.to_string(),
        })
    }
}

/// Fail if any child already belongs to another item
pub(crate) fn ensure_unlinked<'a>(
    children: impl IntoIterator<Item = (&'a ParentLink, &'a str)>,
) -> Result<()> {
    for (link, name) in children {
        if link.is_linked() {
            return Err(Error::AlreadyLinked {
                item: name.to_string(),
            });
        }
    }
    Ok(())
}
