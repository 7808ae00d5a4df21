//! Binding of schema leaves to record buffer locations.

use strata_common::{Result, error::Error};
use strata_format::{FieldPath, GroupNode, LeafNode, SchemaNode};
use strata_io::{RecordFrame, TableSource};

use crate::{
    planner::LayoutPlan,
    strategy::{Converter, DeallocAction, LeafBinding, StrategyRegistry},
    walker::{self, SchemaVisitor},
};

/// Per-record steps of all bound fields, in traversal order.
pub struct RowConverter {
    converters: Vec<Converter>,
    leaf_paths: Vec<FieldPath>,
}

impl RowConverter {
    /// Completes the current record after the source has loaded it.
    pub fn convert(&mut self, frame: &mut RecordFrame) -> Result<()> {
        self.converters
            .iter_mut()
            .try_for_each(|converter| converter(&mut *frame))
    }

    /// Number of fields needing a per-record step.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Paths of all bound leaves, in binding order.
    pub fn leaf_paths(&self) -> &[FieldPath] {
        &self.leaf_paths
    }
}

/// Release steps of all bound fields.
#[derive(Default)]
pub struct Deallocator {
    actions: Vec<DeallocAction>,
}

impl Deallocator {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every release step once, in reverse binding order.
    ///
    /// A failing step does not stop the remaining ones. The first error is returned.
    pub fn run(self, frame: &mut RecordFrame) -> Result<()> {
        let mut first_error = None;
        for action in self.actions.into_iter().rev() {
            if let Err(e) = action(frame) {
                log::warn!("field deallocation failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Binds the mapped leaves of a schema to their slots in a record frame.
pub struct RowBinder<'a> {
    layout: &'a LayoutPlan,
    registry: &'a StrategyRegistry,
}

impl<'a> RowBinder<'a> {
    pub fn new(layout: &'a LayoutPlan, registry: &'a StrategyRegistry) -> RowBinder<'a> {
        RowBinder { layout, registry }
    }

    /// Binds every mapped leaf of `schema`, returning the combined per-record converter
    /// and the combined deallocator.
    ///
    /// On failure the deallocation steps of the leaves bound so far run before the
    /// error is returned.
    pub fn bind(
        &self,
        schema: &SchemaNode,
        frame: &mut RecordFrame,
        source: &mut dyn TableSource,
    ) -> Result<(RowConverter, Deallocator)> {
        let root = walker::root_group(schema)?;
        if frame.size() != self.layout.buffer_size() {
            return Err(Error::invalid_arg(
                "frame",
                format!(
                    "frame of {} bytes for a layout of {} bytes",
                    frame.size(),
                    self.layout.buffer_size()
                ),
            ));
        }
        let mut visitor = BindVisitor {
            layout: self.layout,
            registry: self.registry,
            frame: &mut *frame,
            source,
            converters: Vec::new(),
            deallocator: Deallocator::default(),
            leaf_paths: Vec::new(),
        };
        match walker::walk(root, &mut visitor) {
            Ok(()) => Ok((
                RowConverter {
                    converters: visitor.converters,
                    leaf_paths: visitor.leaf_paths,
                },
                visitor.deallocator,
            )),
            Err(e) => {
                let deallocator = visitor.deallocator;
                if let Err(cleanup) = deallocator.run(frame) {
                    log::warn!("cleanup after failed binding: {cleanup}");
                }
                Err(e)
            }
        }
    }
}

struct BindVisitor<'a, 's> {
    layout: &'a LayoutPlan,
    registry: &'a StrategyRegistry,
    frame: &'s mut RecordFrame,
    source: &'s mut dyn TableSource,
    converters: Vec<Converter>,
    deallocator: Deallocator,
    leaf_paths: Vec<FieldPath>,
}

impl SchemaVisitor for BindVisitor<'_, '_> {
    fn open_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        self.layout.mapped(path).map(|_| ())
    }

    fn leaf(&mut self, path: &FieldPath, leaf: &LeafNode) -> Result<()> {
        let Some(entry) = self.layout.mapped(path)? else {
            return Ok(());
        };
        let strategy = self
            .registry
            .find(&leaf.declared_type)
            .ok_or_else(|| Error::layout_inconsistency(path.as_str()))?;
        let binding = LeafBinding {
            path,
            declared_type: &leaf.declared_type,
            offset: entry.offset,
            size: entry.size,
        };
        let conversion = strategy.bind(&binding, self.frame, &mut *self.source)?;
        if let Some(deallocator) = conversion.deallocator {
            self.deallocator.actions.push(deallocator);
        }
        if let Some(converter) = conversion.converter {
            self.converters.push(converter);
        }
        self.leaf_paths.push(path.clone());
        Ok(())
    }

    fn close_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        self.layout.mapped(path).map(|_| ())
    }
}
