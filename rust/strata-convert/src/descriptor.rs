//! Output compound type tree.

use strata_common::{Result, error::Error};
use strata_format::{FieldPath, GroupNode, LeafNode, SchemaNode};
use strata_io::{OutputSink, TypeHandle, TypeRef};

use crate::{
    planner::{LayoutEntry, LayoutPlan},
    strategy::StrategyRegistry,
    teardown::Teardown,
    walker::{self, SchemaVisitor},
};

/// The root compound type of a table's records, and the steps that release it and
/// everything it was built from.
#[derive(Debug)]
pub struct Descriptor {
    pub root: TypeHandle,
    pub size: usize,
    pub teardown: Teardown,
    leaf_paths: Vec<FieldPath>,
}

impl Descriptor {
    /// Paths of the leaves inserted into the tree, in insertion order.
    pub fn leaf_paths(&self) -> &[FieldPath] {
        &self.leaf_paths
    }
}

/// Builds the nested compound types describing a record, following a layout plan.
///
/// Every compound is created with the size of its layout entry, and its members are
/// inserted at offsets relative to the compound itself.
pub struct DescriptorBuilder<'a> {
    layout: &'a LayoutPlan,
    registry: &'a StrategyRegistry,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(layout: &'a LayoutPlan, registry: &'a StrategyRegistry) -> DescriptorBuilder<'a> {
        DescriptorBuilder { layout, registry }
    }

    /// Builds the compound type tree of `schema` in `sink`.
    ///
    /// On failure every handle created so far is released before the error is
    /// returned.
    pub fn build(&self, schema: &SchemaNode, sink: &mut dyn OutputSink) -> Result<Descriptor> {
        let root = walker::root_group(schema)?;
        let mut teardown = Teardown::new();
        match self.build_tree(root, sink, &mut teardown) {
            Ok((handle, leaf_paths)) => Ok(Descriptor {
                root: handle,
                size: self.layout.buffer_size(),
                teardown,
                leaf_paths,
            }),
            Err(e) => {
                if let Err(cleanup) = teardown.run(sink) {
                    log::warn!("cleanup after failed type build: {cleanup}");
                }
                Err(e)
            }
        }
    }

    fn build_tree(
        &self,
        root: &GroupNode,
        sink: &mut dyn OutputSink,
        teardown: &mut Teardown,
    ) -> Result<(TypeHandle, Vec<FieldPath>)> {
        let handle = sink.create_compound_type(self.layout.buffer_size())?;
        teardown.close_type(handle);

        let mut visitor = DescriptorVisitor {
            layout: self.layout,
            registry: self.registry,
            sink,
            teardown,
            stack: vec![(None, handle)],
            leaf_paths: Vec::new(),
        };
        walker::walk(root, &mut visitor)?;

        let size = visitor.sink.type_size(handle.into())?;
        if size != self.layout.buffer_size() {
            return Err(Error::layout_inconsistency(format!(
                "root compound of {size} bytes, buffer of {} bytes",
                self.layout.buffer_size()
            )));
        }
        Ok((handle, visitor.leaf_paths))
    }
}

struct DescriptorVisitor<'a, 's> {
    layout: &'a LayoutPlan,
    registry: &'a StrategyRegistry,
    sink: &'s mut dyn OutputSink,
    teardown: &'s mut Teardown,
    /// Open compounds with their layout entries; the root has none.
    stack: Vec<(Option<&'a LayoutEntry>, TypeHandle)>,
    leaf_paths: Vec<FieldPath>,
}

impl<'a> DescriptorVisitor<'a, '_> {
    fn top(&self) -> Result<(Option<&'a LayoutEntry>, TypeHandle)> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| Error::invalid_operation("unbalanced type walk"))
    }

    /// Inserts `entry` as a member of the innermost open compound.
    fn insert(&mut self, entry: &LayoutEntry, ty: TypeRef) -> Result<()> {
        let (parent, parent_handle) = self.top()?;
        let parent_offset = parent.map_or(0, |p| p.offset);
        let relative = entry
            .offset
            .checked_sub(parent_offset)
            .filter(|&offset| offset == entry.relative_offset)
            .ok_or_else(|| Error::layout_inconsistency(entry.path.as_str()))?;
        self.sink
            .insert_field(parent_handle, entry.path.name(), relative, ty)
    }
}

impl<'a> SchemaVisitor for DescriptorVisitor<'a, '_> {
    fn open_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        let Some(entry) = self.layout.mapped(path)? else {
            return Ok(());
        };
        let handle = self.sink.create_compound_type(entry.size)?;
        self.teardown.close_type(handle);
        self.stack.push((Some(entry), handle));
        Ok(())
    }

    fn leaf(&mut self, path: &FieldPath, leaf: &LeafNode) -> Result<()> {
        let Some(entry) = self.layout.mapped(path)? else {
            return Ok(());
        };
        let strategy = self
            .registry
            .find(&leaf.declared_type)
            .ok_or_else(|| Error::layout_inconsistency(path.as_str()))?;
        let output = strategy.output_type(&leaf.declared_type, &mut *self.sink)?;
        self.teardown.append(output.teardown);
        self.insert(entry, output.type_ref)?;
        self.leaf_paths.push(path.clone());
        Ok(())
    }

    fn close_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        if self.layout.mapped(path)?.is_none() {
            return Ok(());
        }
        let (entry, handle) = self
            .stack
            .pop()
            .ok_or_else(|| Error::invalid_operation("unbalanced type walk"))?;
        let entry = entry
            .filter(|e| &e.path == path)
            .ok_or_else(|| Error::layout_inconsistency(path.as_str()))?;
        self.insert(entry, handle.into())
    }
}
