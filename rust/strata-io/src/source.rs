//! The input-side capability boundary.

use std::fmt;

use strata_common::Result;
use strata_format::{FieldPath, SchemaNode};

use crate::frame::{HoldingId, RecordFrame};

/// Where a source field must deposit its value for every loaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    /// Write the native bytes of the value directly into the record buffer.
    Slot { offset: usize, size: usize },
    /// Store the value into the holding buffer of a sequence field; a converter
    /// encodes it into the record afterwards.
    Holding(HoldingId),
}

/// A table of records described by a hierarchical schema.
pub trait TableSource {
    fn name(&self) -> &str;

    /// The schema of the table. The returned node is the root group; its children
    /// form the top level of each record.
    fn schema(&self) -> &SchemaNode;

    fn record_count(&self) -> usize;

    /// Binds the field at `path` (record field path, scalar groups flattened) to a
    /// location in the record frame.
    fn bind_field(&mut self, path: &FieldPath, target: BindTarget) -> Result<()>;

    /// Loads record `index`, refreshing every bound location in `frame`.
    fn load_record(&mut self, index: usize, frame: &mut RecordFrame) -> Result<()>;
}

/// An entry of an input namespace.
pub enum SourceEntry {
    Table(Box<dyn TableSource + Send>),
    Namespace(SourceNamespace),
}

/// An ordered, hierarchical collection of tables, mirroring directories of the
/// input container.
pub struct SourceNamespace {
    name: String,
    entries: Vec<SourceEntry>,
}

impl SourceEntry {
    /// Name of the table or namespace.
    pub fn name(&self) -> &str {
        match self {
            SourceEntry::Table(table) => table.name(),
            SourceEntry::Namespace(namespace) => namespace.name(),
        }
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEntry::Table(table) => f
                .debug_struct("Table")
                .field("name", &table.name())
                .field("record_count", &table.record_count())
                .finish(),
            SourceEntry::Namespace(namespace) => namespace.fmt(f),
        }
    }
}

impl fmt::Debug for SourceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceNamespace")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .finish()
    }
}

impl SourceNamespace {
    pub fn new(name: impl Into<String>) -> SourceNamespace {
        SourceNamespace {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_table(&mut self, table: impl TableSource + Send + 'static) {
        self.entries.push(SourceEntry::Table(Box::new(table)));
    }

    pub fn add_namespace(&mut self, namespace: SourceNamespace) {
        self.entries.push(SourceEntry::Namespace(namespace));
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [SourceEntry] {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<SourceEntry> {
        self.entries
    }

    /// Total number of tables in this namespace and all nested ones.
    pub fn table_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                SourceEntry::Table(_) => 1,
                SourceEntry::Namespace(ns) => ns.table_count(),
            })
            .sum()
    }
}
