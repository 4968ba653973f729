//! Traversal and cursor APIs for navigating item trees

use crate::assembly::{AssemblyItem, ModelItem};
use crate::document::DocumentItem;
use crate::field::FieldItem;
use crate::flag::FlagItem;
use crate::link::ParentItem;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::trace;

/// Trait for walking an item tree
pub trait Visitor {
    /// Visit a flag of the current field or assembly
    fn visit_flag(&mut self, _flag: &FlagItem, _path: &[String]) {}

    /// Visit a field item
    fn visit_field(&mut self, _field: &FieldItem, _path: &[String]) {}

    /// Called when entering an assembly, before its flags and children
    fn enter_assembly(&mut self, _assembly: &AssemblyItem, _path: &[String]) {}

    /// Called when leaving an assembly
    fn leave_assembly(&mut self, _assembly: &AssemblyItem, _path: &[String]) {}

    /// Returns true if traversal should continue
    fn should_continue(&self) -> bool {
        true
    }
}

/// Walk the tree below an assembly using a visitor
pub fn walk<V: Visitor>(root: &AssemblyItem, visitor: &mut V) {
    walk_assembly(root, visitor, &mut vec![root.name().to_string()]);
}

fn walk_assembly<V: Visitor>(assembly: &AssemblyItem, visitor: &mut V, path: &mut Vec<String>) {
    if !visitor.should_continue() {
        return;
    }
    visitor.enter_assembly(assembly, path);
    for flag in assembly.flags().values() {
        visitor.visit_flag(flag, path);
    }

    for (name, value) in assembly.model() {
        for (idx, child) in value.items().iter().enumerate() {
            if !visitor.should_continue() {
                return;
            }
            path.push(if value.len() > 1 {
                format!("{}[{}]", name, idx)
            } else {
                name.clone()
            });
            match child {
                ModelItem::Field(field) => {
                    visitor.visit_field(field, path);
                    for flag in field.flags().values() {
                        visitor.visit_flag(flag, path);
                    }
                }
                ModelItem::Assembly(child) => walk_assembly(child, visitor, path),
            }
            path.pop();
        }
    }
    visitor.leave_assembly(assembly, path);
}

/// A position in an item tree
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Current item
    item: ModelItem,

    /// Path to current item (for error reporting)
    path: Vec<String>,
}

impl Cursor {
    /// Create a new cursor at the given assembly
    pub fn new(root: Arc<AssemblyItem>) -> Self {
        Self {
            path: vec![root.name().to_string()],
            item: ModelItem::Assembly(root),
        }
    }

    /// Create a cursor at a document's root assembly
    pub fn from_document(document: &DocumentItem) -> Self {
        Self::new(document.root().clone())
    }

    pub fn item(&self) -> &ModelItem {
        &self.item
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Move to the first value of a child instance by effective name
    pub fn child(&self, name: &str) -> Result<Cursor> {
        self.child_at(name, 0).map(|mut cursor| {
            cursor.path.pop();
            cursor.path.push(name.to_string());
            cursor
        })
    }

    /// Move to a given value of a child instance
    pub fn child_at(&self, name: &str, index: usize) -> Result<Cursor> {
        let not_found = || Error::node_not_found(format!("{}/{}[{}]", self.path.join("/"), name, index));
        let assembly = self.item.as_assembly().ok_or_else(not_found)?;
        let child = assembly
            .child(name)
            .and_then(|value| value.items().get(index))
            .ok_or_else(not_found)?;
        let mut path = self.path.clone();
        path.push(format!("{}[{}]", name, index));
        Ok(Cursor {
            item: child.clone(),
            path,
        })
    }

    /// A flag of the current item by effective name
    pub fn flag(&self, name: &str) -> Result<Arc<FlagItem>> {
        let flag = match &self.item {
            ModelItem::Field(field) => field.flag(name),
            ModelItem::Assembly(assembly) => assembly.flag(name),
        };
        flag.cloned()
            .ok_or_else(|| Error::node_not_found(format!("{}/@{}", self.path.join("/"), name)))
    }

    /// Navigate using a path (e.g., "ports[1]/vendor")
    pub fn navigate(&self, path: &str) -> Result<Cursor> {
        trace!(from = %self.path.join("/"), path, "Navigating item tree");
        let mut cursor = self.clone();
        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }

            // Handle list indexing like "ports[1]"
            cursor = if let Some((name, rest)) = segment.split_once('[') {
                let index = rest
                    .strip_suffix(']')
                    .ok_or_else(|| Error::invalid_path(path, format!("unclosed bracket in '{}'", segment)))?;
                let index: usize = index
                    .parse()
                    .map_err(|_| Error::invalid_path(path, format!("invalid index in '{}'", segment)))?;
                if name.is_empty() || name.contains(']') {
                    return Err(Error::invalid_path(path, format!("invalid name in '{}'", segment)));
                }
                cursor.child_at(name, index)?
            } else if segment.contains(']') {
                return Err(Error::invalid_path(path, format!("unopened bracket in '{}'", segment)));
            } else {
                cursor.child(segment)?
            };
        }
        Ok(cursor)
    }
}

/// Follow parent links from an item's owner up to the document
pub fn owning_document(start: ParentItem) -> Result<Arc<DocumentItem>> {
    let mut current = start;
    while let Some(parent) = current.parent()? {
        current = parent;
    }
    current
        .as_document()
        .cloned()
        .ok_or_else(|| Error::node_not_found("document"))
}

/// Owners of an item from its parent up to and including the document
pub fn ancestors(start: ParentItem) -> Result<Vec<ParentItem>> {
    let mut chain = vec![start.clone()];
    let mut current = start;
    while let Some(parent) = current.parent()? {
        chain.push(parent.clone());
        current = parent;
    }
    Ok(chain)
}
