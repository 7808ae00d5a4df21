//! Depth-first traversal of a table schema.

use strata_common::{Result, error::Error};
use strata_format::{FieldPath, GroupNode, LeafNode, SchemaNode};

/// Callbacks invoked by [`walk`].
///
/// `path` is the record field path of the node: scalar groups are reported through
/// `leaf` under their own name, so a leaf path never names a flattened group's child.
pub trait SchemaVisitor {
    fn open_group(&mut self, path: &FieldPath, group: &GroupNode) -> Result<()>;

    fn leaf(&mut self, path: &FieldPath, leaf: &LeafNode) -> Result<()>;

    fn close_group(&mut self, path: &FieldPath, group: &GroupNode) -> Result<()>;
}

/// Walks the children of `root` depth-first, in stored order.
///
/// The root itself is not reported. A group with exactly one child, that child being
/// a leaf, only fires `leaf` for that child under the group's own path. Any other group
/// fires `open_group`, then its children, then `close_group`.
///
/// The first callback error aborts the walk and is returned as is; side effects of
/// callbacks that already ran are left to the caller.
pub fn walk<V: SchemaVisitor + ?Sized>(root: &GroupNode, visitor: &mut V) -> Result<()> {
    walk_children(root, &FieldPath::root(), visitor)
}

fn walk_children<V: SchemaVisitor + ?Sized>(
    group: &GroupNode,
    path: &FieldPath,
    visitor: &mut V,
) -> Result<()> {
    for child in &group.children {
        let child_path = path.child(child.name());
        match child {
            SchemaNode::Leaf(leaf) => visitor.leaf(&child_path, leaf)?,
            SchemaNode::Group(inner) => match inner.scalar_leaf() {
                Some(leaf) => visitor.leaf(&child_path, leaf)?,
                None => {
                    visitor.open_group(&child_path, inner)?;
                    walk_children(inner, &child_path, visitor)?;
                    visitor.close_group(&child_path, inner)?;
                }
            },
        }
    }
    Ok(())
}

/// Closure adapter for [`walk`].
pub fn walk_fn<O, L, C>(root: &GroupNode, on_open: O, on_leaf: L, on_close: C) -> Result<()>
where
    O: FnMut(&FieldPath, &GroupNode) -> Result<()>,
    L: FnMut(&FieldPath, &LeafNode) -> Result<()>,
    C: FnMut(&FieldPath, &GroupNode) -> Result<()>,
{
    let mut visitor = FnVisitor {
        on_open,
        on_leaf,
        on_close,
    };
    walk(root, &mut visitor)
}

struct FnVisitor<O, L, C> {
    on_open: O,
    on_leaf: L,
    on_close: C,
}

impl<O, L, C> SchemaVisitor for FnVisitor<O, L, C>
where
    O: FnMut(&FieldPath, &GroupNode) -> Result<()>,
    L: FnMut(&FieldPath, &LeafNode) -> Result<()>,
    C: FnMut(&FieldPath, &GroupNode) -> Result<()>,
{
    fn open_group(&mut self, path: &FieldPath, group: &GroupNode) -> Result<()> {
        (self.on_open)(path, group)
    }

    fn leaf(&mut self, path: &FieldPath, leaf: &LeafNode) -> Result<()> {
        (self.on_leaf)(path, leaf)
    }

    fn close_group(&mut self, path: &FieldPath, group: &GroupNode) -> Result<()> {
        (self.on_close)(path, group)
    }
}

/// Returns the root group of a table schema.
pub(crate) fn root_group(schema: &SchemaNode) -> Result<&GroupNode> {
    schema.as_group().ok_or_else(|| {
        Error::invalid_arg(
            "schema",
            format!("table schema root '{}' is not a group", schema.name()),
        )
    })
}
