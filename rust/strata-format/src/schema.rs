//! Hierarchical table schema: named groups of typed leaves and nested groups.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use strata_common::{Result, error::Error};

use crate::{field_path::FieldPath, type_name::TypeName};

/// A node of a table schema tree.
///
/// The JSON form of a leaf is `{"name": ..., "type": ...}`, the JSON form of a group
/// is `{"name": ..., "children": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaNode {
    Leaf(LeafNode),
    Group(GroupNode),
}

/// A typed scalar field of the input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafNode {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: TypeName,
}

/// A named, ordered collection of leaves and nested groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub name: String,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn leaf(name: impl Into<String>, declared_type: impl Into<TypeName>) -> SchemaNode {
        SchemaNode::Leaf(LeafNode {
            name: name.into(),
            declared_type: declared_type.into(),
        })
    }

    pub fn group(name: impl Into<String>, children: Vec<SchemaNode>) -> SchemaNode {
        SchemaNode::Group(GroupNode {
            name: name.into(),
            children,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Group(group) => &group.name,
            SchemaNode::Leaf(leaf) => &leaf.name,
        }
    }

    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            SchemaNode::Group(group) => Some(group),
            SchemaNode::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            SchemaNode::Leaf(leaf) => Some(leaf),
            SchemaNode::Group(_) => None,
        }
    }

    /// Total number of leaves in the subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            SchemaNode::Leaf(_) => 1,
            SchemaNode::Group(group) => group.children.iter().map(SchemaNode::leaf_count).sum(),
        }
    }

    /// Checks the structural rules of the schema tree:
    /// - every node below the root has a non-empty name without the path separator,
    /// - sibling names are unique.
    ///
    /// The name of the node this is called on is not checked, since the root of a
    /// table schema is usually named after the table itself.
    pub fn validate(&self) -> Result<()> {
        match self {
            SchemaNode::Leaf(_) => Ok(()),
            SchemaNode::Group(group) => group.validate_children(&FieldPath::root()),
        }
    }
}

impl GroupNode {
    /// Returns the single leaf of a group that has exactly one child, that child being
    /// a leaf. Such a group is flattened into a plain field named after the group.
    pub fn scalar_leaf(&self) -> Option<&LeafNode> {
        match self.children.as_slice() {
            [SchemaNode::Leaf(leaf)] => Some(leaf),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_leaf().is_some()
    }

    pub fn find_child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|child| child.name() == name)
    }

    /// Finds the leaf addressed by a record field path, applying the flattening rule:
    /// a scalar group is addressed by its own name rather than by the name of its leaf.
    pub fn resolve_leaf(&self, path: &FieldPath) -> Option<&LeafNode> {
        let mut group = self;
        let mut components = path.as_str().split(FieldPath::SEPARATOR).peekable();
        while let Some(name) = components.next() {
            let child = group.find_child(name)?;
            let is_last = components.peek().is_none();
            match child {
                SchemaNode::Leaf(leaf) if is_last => return Some(leaf),
                SchemaNode::Group(inner) if is_last => return inner.scalar_leaf(),
                SchemaNode::Group(inner) if !inner.is_scalar() => group = inner,
                _ => return None,
            }
        }
        None
    }

    /// Returns the record field paths of all leaves below this group, in traversal
    /// order, with scalar groups flattened.
    pub fn leaf_paths(&self) -> Vec<FieldPath> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(&FieldPath::root(), &mut paths);
        paths
    }

    fn collect_leaf_paths(&self, path: &FieldPath, paths: &mut Vec<FieldPath>) {
        for child in &self.children {
            let child_path = path.child(child.name());
            match child {
                SchemaNode::Leaf(_) => paths.push(child_path),
                SchemaNode::Group(group) if group.is_scalar() => paths.push(child_path),
                SchemaNode::Group(group) => group.collect_leaf_paths(&child_path, paths),
            }
        }
    }

    fn validate_children(&self, path: &FieldPath) -> Result<()> {
        let mut names = AHashSet::with_capacity(self.children.len());
        for child in &self.children {
            let name = child.name();
            let child_path = path.child(name);
            if name.is_empty() {
                return Err(Error::invalid_arg(
                    "name",
                    format!("empty field name under '{path}'"),
                ));
            }
            if name.contains(FieldPath::SEPARATOR) {
                return Err(Error::invalid_arg(
                    "name",
                    format!("field name '{child_path}' contains the path separator"),
                ));
            }
            if !names.insert(name) {
                return Err(Error::duplicate_field(child_path.as_str()));
            }
            if let SchemaNode::Group(group) = child {
                group.validate_children(&child_path)?;
            }
        }
        Ok(())
    }
}
