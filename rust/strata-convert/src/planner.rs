//! Record buffer layout.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use strata_common::{Result, error::Error};
use strata_format::{FieldPath, GroupNode, LeafNode, SchemaNode, TypeName};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink},
    strategy::StrategyRegistry,
    walker::{self, SchemaVisitor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Leaf,
    Group,
}

/// Placement of one mapped schema node within the record buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutEntry {
    pub path: FieldPath,
    /// Offset from the start of the record buffer.
    pub offset: usize,
    /// Offset from the start of the immediately enclosing group (or of the buffer,
    /// for top-level entries).
    pub relative_offset: usize,
    pub size: usize,
    pub align: usize,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<TypeName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<&'static str>,
}

impl LayoutEntry {
    pub fn is_leaf(&self) -> bool {
        self.kind == EntryKind::Leaf
    }

    /// End of the entry's byte range, from the start of the record buffer.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// A leaf left out of the layout because no strategy supports its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedField {
    pub path: FieldPath,
    pub declared_type: TypeName,
}

/// The byte layout of a table's record buffer.
///
/// Members are laid out C-style in traversal order: each one starts at the next
/// multiple of its alignment, a group is aligned to its most aligned member, and its
/// size is rounded up to that alignment. Entries are listed in traversal order, each
/// group ahead of its members.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutPlan {
    buffer_size: usize,
    align: usize,
    entries: Vec<LayoutEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    omitted_groups: Vec<FieldPath>,
    #[serde(skip)]
    index: AHashMap<FieldPath, usize>,
}

impl LayoutPlan {
    /// Computes the layout of a table schema.
    ///
    /// # Arguments
    ///
    /// * `schema` - The table schema; must be a group, whose children form the
    ///   top level of the record.
    /// * `registry` - Strategies deciding the slot layout of each leaf.
    /// * `diagnostics` - Receives an `UnsupportedType` event for every leaf no strategy
    ///   supports, and an `EmptyGroup` event for every group left without members.
    ///
    /// # Errors
    ///
    /// `DuplicateField` when two walked nodes share the same path, `InvalidArgument` for
    /// an empty field name, a name containing the path separator, or a record size that
    /// does not fit in `usize`.
    pub fn plan(
        schema: &SchemaNode,
        registry: &StrategyRegistry,
        diagnostics: &dyn DiagnosticSink,
    ) -> Result<LayoutPlan> {
        schema.validate()?;
        let root = walker::root_group(schema)?;
        let mut planner = Planner {
            registry,
            diagnostics,
            stack: vec![Vec::new()],
            seen: AHashSet::new(),
            skipped: Vec::new(),
            omitted_groups: Vec::new(),
        };
        walker::walk(root, &mut planner)?;

        let mut members = planner
            .stack
            .pop()
            .ok_or_else(|| Error::invalid_operation("unbalanced layout walk"))?;
        let (buffer_size, align) = layout_members(&mut members)?;

        let mut plan = LayoutPlan {
            buffer_size,
            align,
            entries: Vec::new(),
            skipped: planner.skipped,
            omitted_groups: planner.omitted_groups,
            index: AHashMap::new(),
        };
        plan.flatten(members, 0);
        log::debug!(
            "layout of '{}': {} entries, {} bytes, {} skipped",
            schema.name(),
            plan.entries.len(),
            plan.buffer_size,
            plan.skipped.len()
        );
        Ok(plan)
    }

    /// Size of the record buffer, equal to the size of the root compound type.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// `true` when not a single field of the table could be mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn get(&self, path: &FieldPath) -> Option<&LayoutEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Returns the entry of a mapped path.
    ///
    /// # Errors
    ///
    /// `LayoutInconsistency` when the path has no entry.
    pub fn lookup(&self, path: &FieldPath) -> Result<&LayoutEntry> {
        self.get(path)
            .ok_or_else(|| Error::layout_inconsistency(path.as_str()))
    }

    /// Returns the entry of a walked path, or `None` when the path was deliberately
    /// left out (unsupported leaf, empty group, or anything below an empty group).
    ///
    /// # Errors
    ///
    /// `LayoutInconsistency` for a path the layout knows nothing about.
    pub fn mapped(&self, path: &FieldPath) -> Result<Option<&LayoutEntry>> {
        if let Some(entry) = self.get(path) {
            return Ok(Some(entry));
        }
        if self.is_dropped(path) {
            Ok(None)
        } else {
            Err(Error::layout_inconsistency(path.as_str()))
        }
    }

    /// Record field paths of all mapped leaves, in traversal order.
    pub fn leaf_paths(&self) -> Vec<FieldPath> {
        self.entries
            .iter()
            .filter(|e| e.is_leaf())
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_leaf()).count()
    }

    pub fn skipped(&self) -> &[SkippedField] {
        &self.skipped
    }

    pub fn omitted_groups(&self) -> &[FieldPath] {
        &self.omitted_groups
    }

    /// Mapped members directly under `parent` (the root path for the top level).
    pub fn children<'a>(
        &'a self,
        parent: &'a FieldPath,
    ) -> impl Iterator<Item = &'a LayoutEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.path.parent().as_ref() == Some(parent))
    }

    fn is_dropped(&self, path: &FieldPath) -> bool {
        self.skipped.iter().any(|s| &s.path == path)
            || self
                .omitted_groups
                .iter()
                .any(|group| group == path || is_descendant(path, group))
    }

    fn flatten(&mut self, members: Vec<PendingMember>, base: usize) {
        for member in members {
            let offset = base + member.relative_offset;
            self.index.insert(member.path.clone(), self.entries.len());
            self.entries.push(LayoutEntry {
                path: member.path,
                offset,
                relative_offset: member.relative_offset,
                size: member.size,
                align: member.align,
                kind: member.kind,
                declared_type: member.declared_type,
                strategy: member.strategy,
            });
            self.flatten(member.children, offset);
        }
    }
}

fn is_descendant(path: &FieldPath, ancestor: &FieldPath) -> bool {
    path.as_str()
        .strip_prefix(ancestor.as_str())
        .is_some_and(|rest| rest.starts_with(FieldPath::SEPARATOR))
}

/// A member whose offset within its parent is not known until the parent closes.
struct PendingMember {
    path: FieldPath,
    kind: EntryKind,
    size: usize,
    align: usize,
    relative_offset: usize,
    declared_type: Option<TypeName>,
    strategy: Option<&'static str>,
    children: Vec<PendingMember>,
}

/// Assigns relative offsets to `members` and returns the size and alignment of the
/// group holding them.
fn layout_members(members: &mut [PendingMember]) -> Result<(usize, usize)> {
    let mut cursor = 0usize;
    let mut align = 1usize;
    for member in members.iter_mut() {
        let member_align = member.align.max(1);
        let offset = cursor
            .checked_next_multiple_of(member_align)
            .ok_or_else(|| size_overflow(&member.path))?;
        member.relative_offset = offset;
        cursor = offset
            .checked_add(member.size)
            .ok_or_else(|| size_overflow(&member.path))?;
        align = align.max(member_align);
    }
    let size = cursor
        .checked_next_multiple_of(align)
        .ok_or_else(|| Error::invalid_arg("schema", "record size overflows"))?;
    Ok((size, align))
}

fn size_overflow(path: &FieldPath) -> Error {
    Error::invalid_arg("schema", format!("record size overflows at '{path}'"))
}

struct Planner<'a> {
    registry: &'a StrategyRegistry,
    diagnostics: &'a dyn DiagnosticSink,
    stack: Vec<Vec<PendingMember>>,
    seen: AHashSet<FieldPath>,
    skipped: Vec<SkippedField>,
    omitted_groups: Vec<FieldPath>,
}

impl Planner<'_> {
    fn mark_seen(&mut self, path: &FieldPath) -> Result<()> {
        if self.seen.insert(path.clone()) {
            Ok(())
        } else {
            Err(Error::duplicate_field(path.as_str()))
        }
    }

    fn current(&mut self) -> Result<&mut Vec<PendingMember>> {
        self.stack
            .last_mut()
            .ok_or_else(|| Error::invalid_operation("unbalanced layout walk"))
    }
}

impl SchemaVisitor for Planner<'_> {
    fn open_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        self.mark_seen(path)?;
        self.stack.push(Vec::new());
        Ok(())
    }

    fn leaf(&mut self, path: &FieldPath, leaf: &LeafNode) -> Result<()> {
        self.mark_seen(path)?;
        let ty = &leaf.declared_type;
        let mapped = self
            .registry
            .find(ty)
            .and_then(|strategy| Some((strategy.name(), strategy.member_layout(ty)?)));
        match mapped {
            Some((strategy, layout)) => {
                log::trace!("'{path}': {ty} via {strategy}, {} bytes", layout.size);
                self.current()?.push(PendingMember {
                    path: path.clone(),
                    kind: EntryKind::Leaf,
                    size: layout.size,
                    align: layout.align,
                    relative_offset: 0,
                    declared_type: Some(ty.clone()),
                    strategy: Some(strategy),
                    children: Vec::new(),
                });
            }
            None => {
                self.diagnostics.report(Diagnostic::UnsupportedType {
                    path: path.clone(),
                    declared_type: ty.clone(),
                });
                self.skipped.push(SkippedField {
                    path: path.clone(),
                    declared_type: ty.clone(),
                });
            }
        }
        Ok(())
    }

    fn close_group(&mut self, path: &FieldPath, _group: &GroupNode) -> Result<()> {
        let mut members = self
            .stack
            .pop()
            .ok_or_else(|| Error::invalid_operation("unbalanced layout walk"))?;
        if members.is_empty() {
            self.diagnostics
                .report(Diagnostic::EmptyGroup { path: path.clone() });
            self.omitted_groups.push(path.clone());
            return Ok(());
        }
        let (size, align) = layout_members(&mut members)?;
        self.current()?.push(PendingMember {
            path: path.clone(),
            kind: EntryKind::Group,
            size,
            align,
            relative_offset: 0,
            declared_type: None,
            strategy: None,
            children: members,
        });
        Ok(())
    }
}
