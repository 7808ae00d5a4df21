use ahash::AHashMap;
use strata_common::{Result, error::Error};

use crate::{
    field_path::FieldPath,
    schema::{GroupNode, LeafNode, SchemaNode},
    type_name::TypeName,
};

/// A builder for a schema group, rejecting duplicate sibling names as they are added.
#[derive(Debug, Clone, Default)]
pub struct GroupBuilder {
    name: String,
    /// Child nodes, in insertion (and therefore traversal) order.
    children: Vec<ChildBuilder>,
    /// A map from child names to their indices in the `children` vector.
    child_map: AHashMap<String, usize>,
}

#[derive(Debug, Clone)]
enum ChildBuilder {
    Leaf(LeafNode),
    Group(GroupBuilder),
}

impl ChildBuilder {
    fn name(&self) -> &str {
        match self {
            ChildBuilder::Leaf(leaf) => &leaf.name,
            ChildBuilder::Group(group) => &group.name,
        }
    }

    fn finish(self) -> SchemaNode {
        match self {
            ChildBuilder::Leaf(leaf) => SchemaNode::Leaf(leaf),
            ChildBuilder::Group(group) => group.finish(),
        }
    }
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Adds a leaf with the given declared type.
    pub fn add_leaf(
        &mut self,
        name: impl Into<String>,
        declared_type: impl Into<TypeName>,
    ) -> Result<&mut Self> {
        let leaf = LeafNode {
            name: name.into(),
            declared_type: declared_type.into(),
        };
        self.push(ChildBuilder::Leaf(leaf))?;
        Ok(self)
    }

    /// Adds a nested group.
    pub fn add_group(&mut self, group: GroupBuilder) -> Result<&mut Self> {
        self.push(ChildBuilder::Group(group))?;
        Ok(self)
    }

    /// Chained form of [`add_leaf`](Self::add_leaf) for building literals.
    pub fn with_leaf(
        mut self,
        name: impl Into<String>,
        declared_type: impl Into<TypeName>,
    ) -> Result<Self> {
        self.add_leaf(name, declared_type)?;
        Ok(self)
    }

    /// Chained form of [`add_group`](Self::add_group) for building literals.
    pub fn with_group(mut self, group: GroupBuilder) -> Result<Self> {
        self.add_group(group)?;
        Ok(self)
    }

    /// Returns the nested group builder with the given name, if any.
    pub fn find_group_mut(&mut self, name: &str) -> Option<&mut GroupBuilder> {
        let index = *self.child_map.get(name)?;
        match &mut self.children[index] {
            ChildBuilder::Group(group) => Some(group),
            ChildBuilder::Leaf(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.child_map.contains_key(name)
    }

    /// Finishes building and returns the group as a schema node.
    pub fn finish(self) -> SchemaNode {
        SchemaNode::Group(GroupNode {
            name: self.name,
            children: self
                .children
                .into_iter()
                .map(ChildBuilder::finish)
                .collect(),
        })
    }

    fn push(&mut self, child: ChildBuilder) -> Result<()> {
        let name = child.name();
        if name.is_empty() || name.contains(FieldPath::SEPARATOR) {
            return Err(Error::invalid_arg(
                "name",
                format!("invalid field name '{name}' in group '{}'", self.name),
            ));
        }
        if self.child_map.contains_key(name) {
            return Err(Error::duplicate_field(
                FieldPath::root().child(&self.name).child(name).as_str(),
            ));
        }
        self.child_map.insert(name.to_string(), self.children.len());
        self.children.push(child);
        Ok(())
    }
}
