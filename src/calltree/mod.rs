//! Template call trees
//!
//! A call tree records the shape of every field path a template dereferences,
//! independently of any concrete type. Each node may be iterated (`list` facet)
//! and/or drilled into (`fields` facet). Construction is permissive: a node can
//! end up with both facets, and only validation decides whether that is a
//! conflict with the real type.
//!
//! ```text
//! {{range .Items}}{{.Name}}{{end}}{{.Count}}
//!
//! - count
//! - []items:
//!     - name
//! ```

pub mod builder;

pub use builder::{build_call_tree, TreeBuilder, MAX_TREE_DEPTH};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Sub-fields of a node, keyed by lower-cased field name.
pub type Fields = BTreeMap<String, CallTree>;

const SPACES_PER_DEPTH: usize = 4;

/// A node of the template call tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallTree {
    #[serde(skip_serializing_if = "Option::is_none")]
    list: Option<Box<CallTree>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Fields>,
}

/// Which facets a node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facets<'a> {
    /// Used as a value only.
    Leaf,
    /// Iterated or indexed.
    List(&'a CallTree),
    /// Drilled into.
    Struct(&'a Fields),
    /// Both iterated and drilled into; left for validation to report.
    Conflict {
        list: &'a CallTree,
        fields: &'a Fields,
    },
}

impl CallTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The element node, if this node is iterated.
    pub fn list(&self) -> Option<&CallTree> {
        self.list.as_deref()
    }

    /// The sub-fields, if this node is drilled into.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// The sub-fields if there is at least one of them.
    pub fn non_empty_fields(&self) -> Option<&Fields> {
        self.fields.as_ref().filter(|fields| !fields.is_empty())
    }

    pub fn facets(&self) -> Facets<'_> {
        match (self.list(), self.non_empty_fields()) {
            (None, None) => Facets::Leaf,
            (Some(list), None) => Facets::List(list),
            (None, Some(fields)) => Facets::Struct(fields),
            (Some(list), Some(fields)) => Facets::Conflict { list, fields },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.facets(), Facets::Leaf)
    }

    /// Whether no node in the tree carries both facets.
    pub fn is_consistent(&self) -> bool {
        match self.facets() {
            Facets::Leaf => true,
            Facets::List(list) => list.is_consistent(),
            Facets::Struct(fields) => fields.values().all(CallTree::is_consistent),
            Facets::Conflict { .. } => false,
        }
    }

    /// The element node, created on first use.
    pub fn list_mut(&mut self) -> &mut CallTree {
        self.list.get_or_insert_with(Box::default)
    }

    /// The child for `name`, created on first use.
    pub fn field_mut(&mut self, name: &str) -> &mut CallTree {
        self.fields
            .get_or_insert_with(Fields::new)
            .entry(name.to_lowercase())
            .or_default()
    }

    /// Walk down `idents`, creating missing nodes, and return the deepest one.
    pub fn field_path<S: AsRef<str>>(&mut self, idents: &[S]) -> &mut CallTree {
        let mut node = self;
        for ident in idents {
            node = node.field_mut(ident.as_ref());
        }
        node
    }

    /// Follow an existing path of field names.
    pub fn get(&self, path: &[&str]) -> Option<&CallTree> {
        let mut node = self;
        for ident in path {
            node = node.fields.as_ref()?.get(&ident.to_lowercase())?;
        }
        Some(node)
    }

    /// Union `other` into `self`. Never fails: conflicting facets are kept side by side.
    pub fn merge(&mut self, other: CallTree) {
        if let Some(list) = other.list {
            match self.list.as_mut() {
                Some(existing) => existing.merge(*list),
                None => self.list = Some(list),
            }
        }

        if let Some(fields) = other.fields {
            let existing = self.fields.get_or_insert_with(Fields::new);
            for (name, child) in fields {
                existing.entry(name).or_default().merge(child);
            }
        }
    }

    fn write_outline(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if let Some(list) = &self.list {
            indent(f, depth)?;
            writeln!(f, "- []:")?;
            list.write_outline(f, depth + 1)?;
        }
        if let Some(fields) = &self.fields {
            write_fields(f, fields, depth)?;
        }
        Ok(())
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * SPACES_PER_DEPTH)
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &Fields, depth: usize) -> fmt::Result {
    for (name, child) in fields {
        if let Some(list) = &child.list {
            indent(f, depth)?;
            writeln!(f, "- []{}:", name)?;
            if let Some(elem_fields) = &list.fields {
                write_fields(f, elem_fields, depth + 1)?;
            }
            if let Some(nested) = &list.list {
                indent(f, depth + 1)?;
                writeln!(f, "- []:")?;
                nested.write_outline(f, depth + 2)?;
            }
        }
        if let Some(sub) = &child.fields {
            indent(f, depth)?;
            writeln!(f, "- {}:", name)?;
            write_fields(f, sub, depth + 1)?;
        }
        if child.list.is_none() && child.fields.is_none() {
            indent(f, depth)?;
            writeln!(f, "- {}", name)?;
        }
    }
    Ok(())
}

impl fmt::Display for CallTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_outline(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_reuses_nodes() {
        let mut tree = CallTree::new();
        tree.field_path(&["A", "B"]);
        tree.field_path(&["a", "C"]);

        let a = tree.get(&["a"]).unwrap();
        assert_eq!(a.fields().unwrap().len(), 2);
        assert!(tree.get(&["a", "b"]).unwrap().is_leaf());
        assert!(tree.get(&["a", "c"]).unwrap().is_leaf());
    }

    #[test]
    fn test_facets() {
        let mut tree = CallTree::new();
        assert_eq!(tree.facets(), Facets::Leaf);

        tree.list_mut();
        assert!(matches!(tree.facets(), Facets::List(_)));

        tree.field_mut("x");
        assert!(matches!(tree.facets(), Facets::Conflict { .. }));
        assert!(!tree.is_consistent());
    }

    #[test]
    fn test_merge_unions_facets() {
        let mut left = CallTree::new();
        left.field_path(&["items"]).list_mut().field_mut("name");

        let mut right = CallTree::new();
        right.field_path(&["items"]).list_mut().field_mut("id");
        right.field_mut("count");

        left.merge(right);

        let items = left.get(&["items"]).unwrap();
        let elem = items.list().unwrap();
        assert_eq!(elem.fields().unwrap().len(), 2);
        assert!(left.get(&["count"]).is_some());
    }

    #[test]
    fn test_merge_keeps_conflicts() {
        let mut left = CallTree::new();
        left.field_mut("a").list_mut();

        let mut right = CallTree::new();
        right.field_path(&["a", "b"]);

        left.merge(right);
        let a = left.get(&["a"]).unwrap();
        assert!(matches!(a.facets(), Facets::Conflict { .. }));
    }

    #[test]
    fn test_outline() {
        let mut tree = CallTree::new();
        tree.field_path(&["items"]).list_mut().field_mut("name");
        tree.field_mut("count");

        assert_eq!(tree.to_string(), "- count\n- []items:\n    - name\n");
    }

    #[test]
    fn test_outline_root_list() {
        let mut tree = CallTree::new();
        tree.list_mut().field_mut("id");

        assert_eq!(tree.to_string(), "- []:\n    - id\n");
    }
}
