//! Root document items

use crate::assembly::AssemblyItem;
use crate::link::{ParentRef, ensure_unlinked};
use crate::Result;
use metaschema_model::AssemblyDefinition;
use std::fmt;
use std::sync::{Arc, Weak};

/// The root of an item tree: one root assembly plus where it came from
pub struct DocumentItem {
    root: Arc<AssemblyItem>,
    location: Option<String>,
}

impl DocumentItem {
    /// Wrap a root assembly item and link it to the new document
    pub fn new(root: Arc<AssemblyItem>, location: Option<String>) -> Result<Arc<Self>> {
        ensure_unlinked([(&root.parent, root.name())])?;
        let mut linked = Ok(());
        let document = Arc::new_cyclic(|this: &Weak<DocumentItem>| {
            linked = root.parent.link(ParentRef::Document(this.clone()), root.name());
            Self { root, location }
        });
        linked.map(|()| document)
    }

    pub fn root(&self) -> &Arc<AssemblyItem> {
        &self.root
    }

    /// Definition of the root assembly
    pub fn root_definition(&self) -> &Arc<AssemblyDefinition> {
        self.root.definition()
    }

    /// Root name the document is keyed by in JSON and XML
    pub fn root_name(&self) -> &str {
        self.root_definition()
            .root_name()
            .unwrap_or_else(|| self.root.name())
    }

    /// Where the document was read from, if known
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl PartialEq for DocumentItem {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl fmt::Debug for DocumentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentItem")
            .field("location", &self.location)
            .field("root", &self.root)
            .finish()
    }
}
